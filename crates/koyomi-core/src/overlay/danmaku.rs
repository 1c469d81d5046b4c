//! Danmaku scheduling and lane placement
//!
//! Comments spawn when the clock reaches their timestamp, stay on screen
//! for a fixed duration per lane mode, and retire afterwards. Lane
//! allocation keeps simultaneous comments apart vertically: a lane is busy
//! until its current occupant retires, so two comments with the same
//! timestamp always land on different lanes.

use crate::types::{DanmakuEvent, DanmakuMode};
use tracing::trace;

/// Danmaku track tuning
#[derive(Debug, Clone)]
pub struct DanmakuConfig {
    /// Display lanes available to each mode band
    pub lanes: usize,
    /// On-screen seconds for scrolling comments
    pub scroll_duration: f64,
    /// On-screen seconds for top/bottom pinned comments
    pub pinned_duration: f64,
}

impl Default for DanmakuConfig {
    fn default() -> Self {
        Self {
            lanes: 12,
            scroll_duration: 8.0,
            pinned_duration: 5.0,
        }
    }
}

/// A comment currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct LiveComment {
    pub text: String,
    pub color: String,
    pub mode: DanmakuMode,
    /// Timestamp the comment spawned at
    pub spawned_at: f64,
    /// Clock time at which the comment leaves the screen
    pub retire_at: f64,
    /// Vertical lane assigned by the anti-overlap rule
    pub lane: usize,
}

/// Lane occupancy for one mode band.
///
/// Scroll and top bands fill top-down; the bottom band fills bottom-up so
/// pinned comments hug their edge.
#[derive(Debug)]
struct LaneAllocator {
    busy_until: Vec<f64>,
    bottom_up: bool,
}

impl LaneAllocator {
    fn new(lanes: usize, bottom_up: bool) -> Self {
        Self {
            busy_until: vec![f64::NEG_INFINITY; lanes.max(1)],
            bottom_up,
        }
    }

    fn clear(&mut self) {
        self.busy_until.fill(f64::NEG_INFINITY);
    }

    /// Assign a lane for a comment spawning at `at` and lasting `duration`.
    ///
    /// Picks the first free lane in band order; when every lane is busy the
    /// one that frees soonest is reused (overlap within a lane is then
    /// unavoidable, but simultaneous spawns still spread out first).
    fn allocate(&mut self, at: f64, duration: f64) -> usize {
        let order: Vec<usize> = if self.bottom_up {
            (0..self.busy_until.len()).rev().collect()
        } else {
            (0..self.busy_until.len()).collect()
        };

        let lane = order
            .iter()
            .copied()
            .find(|&i| self.busy_until[i] <= at)
            .unwrap_or_else(|| {
                let crowded = order
                    .iter()
                    .copied()
                    .min_by(|&a, &b| self.busy_until[a].total_cmp(&self.busy_until[b]))
                    .unwrap_or(0);
                trace!(lane = crowded, "All danmaku lanes busy; doubling up");
                crowded
            });

        self.busy_until[lane] = at + duration;
        lane
    }
}

/// Time-ordered comment schedule plus what is currently on screen.
#[derive(Debug)]
pub struct DanmakuTrack {
    events: Vec<DanmakuEvent>,
    config: DanmakuConfig,
    /// Host-controlled visibility; scheduling continues while hidden
    pub visible: bool,
    /// Render offset in seconds; positive delays the track
    pub offset: f64,
    cursor: usize,
    live: Vec<LiveComment>,
    scroll: LaneAllocator,
    top: LaneAllocator,
    bottom: LaneAllocator,
    last_time: f64,
}

impl DanmakuTrack {
    pub fn new(config: DanmakuConfig) -> Self {
        let lanes = config.lanes;
        Self {
            events: Vec::new(),
            config,
            visible: true,
            offset: 0.0,
            cursor: 0,
            live: Vec::new(),
            scroll: LaneAllocator::new(lanes, false),
            top: LaneAllocator::new(lanes, false),
            bottom: LaneAllocator::new(lanes, true),
            last_time: 0.0,
        }
    }

    /// Install the pre-fetched comment feed, replacing any previous one.
    pub fn set_events(&mut self, mut events: Vec<DanmakuEvent>) {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.events = events;
        self.resync(self.last_time);
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.resync(0.0);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Advance the track to clock `position`.
    ///
    /// A backwards jump means the clock was sought; the track rebuilds from
    /// scratch so it matches a continuous playthrough at the new position.
    pub fn advance(&mut self, position: f64) {
        let t = position - self.offset;
        if t < self.last_time {
            self.resync(position);
            return;
        }

        self.spawn_until(t);
        self.live.retain(|c| c.retire_at > t);
        self.last_time = t;
    }

    /// Rebuild on-screen state for clock `position`, as a continuous
    /// playthrough would have it: no replay of retired comments, no skipped
    /// upcoming ones.
    pub fn resync(&mut self, position: f64) {
        let t = position - self.offset;

        self.live.clear();
        self.scroll.clear();
        self.top.clear();
        self.bottom.clear();
        self.cursor = 0;

        self.spawn_until(t);
        self.live.retain(|c| c.retire_at > t);
        self.last_time = t;
    }

    /// Spawn every event with `time <= t`, skipping those whose on-screen
    /// window has already passed. Skipped events leave no lane residue,
    /// which is exactly the state a continuous playthrough would be in.
    fn spawn_until(&mut self, t: f64) {
        while let Some(event) = self.events.get(self.cursor) {
            if event.time > t {
                break;
            }

            let duration = self.duration_for(event.mode);
            if event.time + duration > t {
                let lane = match event.mode {
                    DanmakuMode::Scroll => self.scroll.allocate(event.time, duration),
                    DanmakuMode::Top => self.top.allocate(event.time, duration),
                    DanmakuMode::Bottom => self.bottom.allocate(event.time, duration),
                };

                self.live.push(LiveComment {
                    text: event.text.clone(),
                    color: event.color.clone(),
                    mode: event.mode,
                    spawned_at: event.time,
                    retire_at: event.time + duration,
                    lane,
                });
            }

            self.cursor += 1;
        }
    }

    fn duration_for(&self, mode: DanmakuMode) -> f64 {
        match mode {
            DanmakuMode::Scroll => self.config.scroll_duration,
            DanmakuMode::Top | DanmakuMode::Bottom => self.config.pinned_duration,
        }
    }

    /// Comments currently on screen.
    pub fn live(&self) -> &[LiveComment] {
        &self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(time: f64, text: &str, mode: DanmakuMode) -> DanmakuEvent {
        DanmakuEvent {
            time,
            text: text.to_string(),
            color: "#ffffff".to_string(),
            mode,
        }
    }

    fn track_with(events: Vec<DanmakuEvent>) -> DanmakuTrack {
        let mut track = DanmakuTrack::new(DanmakuConfig::default());
        track.set_events(events);
        track
    }

    #[test]
    fn test_comments_spawn_and_retire() {
        let mut track = track_with(vec![event(5.0, "hi", DanmakuMode::Scroll)]);

        track.advance(4.9);
        assert!(track.live().is_empty());

        track.advance(5.0);
        assert_eq!(track.live().len(), 1);
        assert_eq!(track.live()[0].text, "hi");

        // Default scroll duration is 8 seconds
        track.advance(12.9);
        assert_eq!(track.live().len(), 1);
        track.advance(13.1);
        assert!(track.live().is_empty());
    }

    #[test]
    fn test_simultaneous_comments_take_distinct_lanes() {
        let mut track = track_with(vec![
            event(5.0, "first", DanmakuMode::Scroll),
            event(5.0, "second", DanmakuMode::Scroll),
        ]);

        track.advance(5.0);
        let live = track.live();
        assert_eq!(live.len(), 2);
        assert_ne!(live[0].lane, live[1].lane);
    }

    #[test]
    fn test_bottom_band_fills_from_the_edge() {
        let mut track = track_with(vec![
            event(1.0, "a", DanmakuMode::Bottom),
            event(1.0, "b", DanmakuMode::Bottom),
        ]);

        track.advance(1.0);
        let live = track.live();
        assert_eq!(live[0].lane, 11);
        assert_eq!(live[1].lane, 10);
    }

    #[test]
    fn test_seek_backward_resyncs() {
        let mut track = track_with(vec![
            event(5.0, "early", DanmakuMode::Scroll),
            event(60.0, "late", DanmakuMode::Scroll),
        ]);

        track.advance(61.0);
        assert_eq!(track.live().len(), 1);
        assert_eq!(track.live()[0].text, "late");

        // Back before the first comment's window
        track.advance(2.0);
        assert!(track.live().is_empty());

        // Reaching it again replays it exactly once
        track.advance(6.0);
        assert_eq!(track.live().len(), 1);
        assert_eq!(track.live()[0].text, "early");
    }

    #[test]
    fn test_forward_seek_skips_passed_events() {
        let mut track = track_with(vec![
            event(1.0, "gone", DanmakuMode::Scroll),
            event(58.0, "still up", DanmakuMode::Scroll),
        ]);

        // Jump lands inside the second comment's window only
        track.resync(60.0);
        let live = track.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].text, "still up");
    }

    #[test]
    fn test_lane_frees_after_retirement() {
        let mut track = track_with(vec![
            event(0.0, "a", DanmakuMode::Scroll),
            event(10.0, "b", DanmakuMode::Scroll),
        ]);

        track.advance(0.0);
        let first_lane = track.live()[0].lane;

        // First comment retired at t=8; its lane is free again
        track.advance(10.0);
        assert_eq!(track.live().len(), 1);
        assert_eq!(track.live()[0].lane, first_lane);
    }

    #[test]
    fn test_all_lanes_busy_doubles_up_on_soonest_free() {
        let config = DanmakuConfig {
            lanes: 2,
            ..DanmakuConfig::default()
        };
        let mut track = DanmakuTrack::new(config);

        track.set_events(vec![
            event(1.0, "a", DanmakuMode::Scroll),
            event(1.0, "b", DanmakuMode::Scroll),
            event(2.0, "c", DanmakuMode::Scroll),
        ]);

        track.advance(2.0);
        assert_eq!(track.live().len(), 3);
        // Two of the three share a lane; the simultaneous pair does not
        let (a, b, c) = (&track.live()[0], &track.live()[1], &track.live()[2]);
        assert_ne!(a.lane, b.lane);
        assert!(c.lane == a.lane || c.lane == b.lane);
    }

    #[test]
    fn test_offset_delays_the_track() {
        let mut track = track_with(vec![event(5.0, "hi", DanmakuMode::Scroll)]);
        track.offset = 2.0;
        track.resync(6.0);
        assert!(track.live().is_empty());

        track.advance(7.0);
        assert_eq!(track.live().len(), 1);
    }
}
