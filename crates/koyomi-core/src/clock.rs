//! Playback clock stream and session epoch tracking
//!
//! The session owns the clock; overlays and the boundary monitor subscribe
//! and read time from the broadcast, never from a cached copy. The epoch
//! guard is how in-flight async work learns that its session was superseded.

use crate::types::ClockSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Broadcast channel for [`ClockSnapshot`] readings.
pub struct PlaybackClock {
    tx: watch::Sender<ClockSnapshot>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ClockSnapshot::default());
        Self { tx }
    }

    /// Publish a new clock reading to all subscribers.
    pub fn publish(&self, snapshot: ClockSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Subscribe to clock readings.
    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.tx.subscribe()
    }

    /// Latest published reading.
    pub fn snapshot(&self) -> ClockSnapshot {
        *self.tx.borrow()
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic counter bumped on every session open and close.
///
/// Async work belonging to a session captures an [`EpochGuard`] up front and
/// checks it after every suspension point; a stale guard means the result
/// belongs to a superseded session and must be discarded, never applied.
#[derive(Debug, Default)]
pub struct SessionEpoch(Arc<AtomicU64>);

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate all outstanding guards.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Capture a guard pinned to the current epoch.
    pub fn guard(&self) -> EpochGuard {
        EpochGuard {
            epoch: Arc::clone(&self.0),
            seen: self.0.load(Ordering::Acquire),
        }
    }
}

/// Snapshot of a [`SessionEpoch`] at capture time.
#[derive(Debug, Clone)]
pub struct EpochGuard {
    epoch: Arc<AtomicU64>,
    seen: u64,
}

impl EpochGuard {
    /// True while the session that issued this guard is still the live one.
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::Acquire) == self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_broadcast() {
        let clock = PlaybackClock::new();
        let rx = clock.subscribe();

        clock.publish(ClockSnapshot {
            position: 42.0,
            duration: 1440.0,
            playing: true,
        });

        assert_eq!(rx.borrow().position, 42.0);
        assert_eq!(clock.snapshot().duration, 1440.0);
    }

    #[test]
    fn test_epoch_guard_expires_on_bump() {
        let epoch = SessionEpoch::new();
        let guard = epoch.guard();
        assert!(guard.is_current());

        epoch.bump();
        assert!(!guard.is_current());

        // A fresh guard tracks the new epoch
        assert!(epoch.guard().is_current());
    }
}
