//! Display updates on day/night transitions.
//!
//! The panel is white while the sun is up. At night it shows the
//! configured night color, or the stock image for the phase of the night
//! in progress when no color is configured. One frame is pushed per
//! transition, from a fire-and-forget worker; frames are shown in order.
//! The panel call itself runs on the blocking pool.

use std::sync::Arc;

use lunar_core::position::Position;
use lunar_core::schedule::Schedule;
use lunar_types::{DisplayFrame, LunarPhase, Rgb, SkyState};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::hardware::DisplayPanel;

/// Day or night, as far as the display is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// The sun is up.
    Day,
    /// The sun is down, with or without a moon.
    Night,
}

impl Regime {
    /// Regime for a resolved sky state.
    pub const fn of(sky: SkyState) -> Self {
        match sky {
            SkyState::Daylight => Self::Day,
            SkyState::Moon(_) | SkyState::MoonAbsent => Self::Night,
        }
    }
}

/// Pushes frames to the display when the regime changes.
pub struct DisplayUpdater {
    panel: Arc<dyn DisplayPanel>,
    night_color: Option<Rgb>,
    regime: Option<Regime>,
    worker: Option<JoinHandle<()>>,
}

impl DisplayUpdater {
    /// Create an updater that has not shown anything yet.
    pub fn new(panel: Arc<dyn DisplayPanel>, night_color: Option<Rgb>) -> Self {
        Self {
            panel,
            night_color,
            regime: None,
            worker: None,
        }
    }

    /// The frame for `position`, independent of transitions.
    pub fn frame_for(&self, position: &Position, schedule: &Schedule) -> DisplayFrame {
        match Regime::of(position.sky) {
            Regime::Day => DisplayFrame::Solid(Rgb::WHITE),
            Regime::Night => self.night_color.map_or_else(
                || DisplayFrame::Phase(night_phase(position, schedule)),
                DisplayFrame::Solid,
            ),
        }
    }

    /// Push a frame if `position` is in a different regime from the last
    /// call. Returns the frame pushed, if any.
    pub fn update(&mut self, position: &Position, schedule: &Schedule) -> Option<DisplayFrame> {
        let regime = Regime::of(position.sky);
        if self.regime == Some(regime) {
            return None;
        }
        self.regime = Some(regime);

        let frame = self.frame_for(position, schedule);
        info!(regime = ?regime, frame = ?frame, "Display transition");

        let panel = Arc::clone(&self.panel);
        let previous = self.worker.take();
        self.worker = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(error = %e, "Display worker ended abnormally");
                }
            }
            match tokio::task::spawn_blocking(move || panel.show(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, frame = ?frame, "Display fault"),
                Err(e) => warn!(error = %e, frame = ?frame, "Display call did not complete"),
            }
        }));
        Some(frame)
    }

    /// Wait for pending frames to be shown.
    pub async fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Display worker ended abnormally");
            }
        }
    }
}

impl core::fmt::Debug for DisplayUpdater {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DisplayUpdater")
            .field("night_color", &self.night_color)
            .field("regime", &self.regime)
            .finish_non_exhaustive()
    }
}

/// Phase of the night in progress: the visible moon, else the schedule
/// entry for tonight, else New Moon.
fn night_phase(position: &Position, schedule: &Schedule) -> LunarPhase {
    position
        .sky
        .phase()
        .or_else(|| {
            position
                .night_of
                .and_then(|day| schedule.entry_for_day(day))
                .map(|entry| entry.phase)
        })
        .unwrap_or(LunarPhase::NewMoon)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::hardware::HardwareError;

    #[derive(Default)]
    struct RecordingPanel {
        frames: Mutex<Vec<DisplayFrame>>,
    }

    impl DisplayPanel for RecordingPanel {
        fn show(&self, frame: DisplayFrame) -> Result<(), HardwareError> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    /// Panics on the first frame, records the rest.
    #[derive(Default)]
    struct FlakyPanel {
        calls: Mutex<u32>,
        frames: Mutex<Vec<DisplayFrame>>,
    }

    impl DisplayPanel for FlakyPanel {
        fn show(&self, frame: DisplayFrame) -> Result<(), HardwareError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                *calls = calls.saturating_add(1);
                *calls == 1
            };
            if first {
                panic!("panel driver crashed");
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn position(sky: SkyState, night_of: Option<u32>) -> Position {
        Position {
            sky,
            altitude: 0.0,
            arm_angle: 0.0,
            phase_angle: 0.0,
            night_of,
        }
    }

    #[tokio::test]
    async fn one_frame_per_transition() {
        let schedule = Schedule::build(28.0, None).unwrap();
        let panel = Arc::new(RecordingPanel::default());
        let red = Rgb { r: 255, g: 0, b: 0 };
        let mut display = DisplayUpdater::new(panel.clone(), Some(red));

        let night = position(SkyState::Moon(LunarPhase::FullMoon), Some(0));
        let absent = position(SkyState::MoonAbsent, Some(0));
        let day = position(SkyState::Daylight, None);

        assert!(display.update(&night, &schedule).is_some());
        assert!(display.update(&absent, &schedule).is_none());
        assert!(display.update(&night, &schedule).is_none());
        assert!(display.update(&day, &schedule).is_some());
        assert!(display.update(&day, &schedule).is_none());
        display.join().await;

        assert_eq!(
            *panel.frames.lock().unwrap(),
            vec![DisplayFrame::Solid(red), DisplayFrame::Solid(Rgb::WHITE)]
        );
    }

    #[tokio::test]
    async fn phase_image_without_night_color() {
        let schedule = Schedule::build(28.0, None).unwrap();
        let panel = Arc::new(RecordingPanel::default());
        let display = DisplayUpdater::new(panel, None);

        // Moon not up yet, but tonight is a Waning Gibbous night.
        let absent = position(SkyState::MoonAbsent, Some(3));
        assert_eq!(
            display.frame_for(&absent, &schedule),
            DisplayFrame::Phase(LunarPhase::WaningGibbous)
        );

        let outside = position(SkyState::MoonAbsent, None);
        assert_eq!(
            display.frame_for(&outside, &schedule),
            DisplayFrame::Phase(LunarPhase::NewMoon)
        );
    }

    #[tokio::test]
    async fn crashed_frame_does_not_block_later_frames() {
        let schedule = Schedule::build(28.0, None).unwrap();
        let panel = Arc::new(FlakyPanel::default());
        let mut display = DisplayUpdater::new(panel.clone(), None);

        let night = position(SkyState::Moon(LunarPhase::FullMoon), Some(0));
        let day = position(SkyState::Daylight, None);
        assert!(display.update(&night, &schedule).is_some());
        assert!(display.update(&day, &schedule).is_some());
        display.join().await;

        assert_eq!(*panel.calls.lock().unwrap(), 2);
        assert_eq!(
            *panel.frames.lock().unwrap(),
            vec![DisplayFrame::Solid(Rgb::WHITE)]
        );
    }
}
