//! Shared-state sink read by the dashboard.
//!
//! [`StatusHandle`] wraps a [`SharedStatus`] in an `Arc<RwLock<_>>`. The
//! scheduler writes once per tick with `try_write`, so a reader holding
//! the lock makes the tick skip its update instead of blocking; the next
//! tick catches up. Start/stop transitions use a blocking write so they
//! are never lost.

use std::sync::Arc;

use lunar_types::SharedStatus;
use tokio::sync::RwLock;

/// Cloneable handle to the live status record.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<SharedStatus>>,
}

impl StatusHandle {
    /// Create a handle holding the default (idle) status.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current status.
    pub async fn snapshot(&self) -> SharedStatus {
        self.inner.read().await.clone()
    }

    /// Apply `f` if the lock is free. Returns whether it was applied.
    pub fn try_update(&self, f: impl FnOnce(&mut SharedStatus)) -> bool {
        self.inner.try_write().map_or(false, |mut status| {
            f(&mut status);
            true
        })
    }

    /// Apply `f`, waiting for the lock.
    pub async fn update(&self, f: impl FnOnce(&mut SharedStatus)) {
        let mut status = self.inner.write().await;
        f(&mut status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_update_skips_while_read_locked() {
        let handle = StatusHandle::new();
        {
            let _reader = handle.inner.read().await;
            assert!(!handle.try_update(|s| s.tick = 7));
        }
        assert!(handle.try_update(|s| s.tick = 8));
        assert_eq!(handle.snapshot().await.tick, 8);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let handle = StatusHandle::new();
        let reader = handle.clone();
        handle.update(|s| s.running = true).await;
        assert!(reader.snapshot().await.running);
    }
}
