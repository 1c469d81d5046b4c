//! Episode boundary monitoring
//!
//! Watches the playback clock and raises a single "approaching end" signal
//! the host can use to offer the next episode. The monitor takes no action
//! of its own; navigation stays with the host page.

use crate::types::ClockSnapshot;
use tokio::sync::watch;
use tracing::debug;

/// Seconds before the end at which the signal raises
pub const DEFAULT_NEAR_END_THRESHOLD: f64 = 30.0;

/// Raises `true` while `duration - position <= threshold`.
pub struct EpisodeBoundaryMonitor {
    threshold: f64,
    tx: watch::Sender<bool>,
}

impl EpisodeBoundaryMonitor {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_NEAR_END_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        let (tx, _) = watch::channel(false);
        Self { threshold, tx }
    }

    /// Recompute the signal for a clock reading.
    ///
    /// Runs on every tick; a seek backward past the threshold clears the
    /// signal on the next reading. An unknown duration never signals.
    pub fn observe(&self, snapshot: &ClockSnapshot) {
        let near_end =
            snapshot.duration > 0.0 && snapshot.duration - snapshot.position <= self.threshold;

        if *self.tx.borrow() != near_end {
            debug!(near_end, position = snapshot.position, "Episode boundary signal");
            self.tx.send_replace(near_end);
        }
    }

    /// Subscribe to signal changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Latest signal value.
    pub fn is_near_end(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for EpisodeBoundaryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(position: f64, duration: f64) -> ClockSnapshot {
        ClockSnapshot {
            position,
            duration,
            playing: true,
        }
    }

    #[test]
    fn test_signal_raises_inside_threshold() {
        let monitor = EpisodeBoundaryMonitor::new();

        monitor.observe(&snapshot(100.0, 1440.0));
        assert!(!monitor.is_near_end());

        // Exactly at the threshold counts
        monitor.observe(&snapshot(1410.0, 1440.0));
        assert!(monitor.is_near_end());

        monitor.observe(&snapshot(1409.9, 1440.0));
        assert!(!monitor.is_near_end());
    }

    #[test]
    fn test_backward_seek_clears_stale_signal() {
        let monitor = EpisodeBoundaryMonitor::new();

        monitor.observe(&snapshot(1420.0, 1440.0));
        assert!(monitor.is_near_end());

        monitor.observe(&snapshot(200.0, 1440.0));
        assert!(!monitor.is_near_end());
    }

    #[test]
    fn test_unknown_duration_never_signals() {
        let monitor = EpisodeBoundaryMonitor::new();
        monitor.observe(&snapshot(10.0, 0.0));
        assert!(!monitor.is_near_end());
    }

    #[test]
    fn test_subscribers_see_transitions() {
        let monitor = EpisodeBoundaryMonitor::new();
        let rx = monitor.subscribe();

        monitor.observe(&snapshot(1439.0, 1440.0));
        assert!(*rx.borrow());

        monitor.observe(&snapshot(10.0, 1440.0));
        assert!(!*rx.borrow());
    }
}
