//! Time-synchronized overlay rendering
//!
//! The compositor keeps the subtitle and danmaku tracks in lockstep with
//! the session's playback clock. It is a pure observer: it reads clock
//! snapshots, never touches the surface, and never blocks the clock.

pub mod danmaku;
pub mod subtitle;

use crate::backend::Backend;
use crate::clock::EpochGuard;
use crate::session::PlaybackSession;
use crate::types::{ClockSnapshot, DanmakuEvent, SubtitleCue};
use danmaku::{DanmakuConfig, DanmakuTrack, LiveComment};
use tracing::{debug, instrument, warn};
use url::Url;

/// Subtitle cue intervals plus the host-facing track controls.
#[derive(Debug)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
    /// Host-controlled visibility
    pub visible: bool,
    /// Render offset in seconds; positive delays the track
    pub offset: f64,
}

impl SubtitleTrack {
    fn new() -> Self {
        Self {
            cues: Vec::new(),
            visible: true,
            offset: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Cues a continuous playthrough would display at clock `position`.
    pub fn active_at(&self, position: f64) -> Vec<&SubtitleCue> {
        subtitle::active_cues(&self.cues, position - self.offset)
    }
}

/// What the overlay layers should render for one clock reading.
#[derive(Debug, Clone, Default)]
pub struct OverlayFrame {
    pub cues: Vec<SubtitleCue>,
    pub comments: Vec<LiveComment>,
}

/// Renders subtitle text and scrolling comments in sync with the clock.
pub struct OverlayCompositor {
    subtitles: SubtitleTrack,
    danmaku: DanmakuTrack,
    guard: Option<EpochGuard>,
    position: f64,
}

impl OverlayCompositor {
    pub fn new() -> Self {
        Self::with_config(DanmakuConfig::default())
    }

    pub fn with_config(config: DanmakuConfig) -> Self {
        Self {
            subtitles: SubtitleTrack::new(),
            danmaku: DanmakuTrack::new(config),
            guard: None,
            position: 0.0,
        }
    }

    /// Bind the compositor to a session's lifetime.
    ///
    /// Both tracks reset; async loads started before a later re-attach (or
    /// before the session closes) are discarded when they land.
    pub fn attach(&mut self, session: &PlaybackSession) {
        self.guard = Some(session.epoch_guard());
        self.subtitles = SubtitleTrack::new();
        self.danmaku.visible = true;
        self.danmaku.offset = 0.0;
        self.danmaku.clear();
        self.position = 0.0;
    }

    /// Fetch and install the subtitle track for the current session.
    ///
    /// No URL means no subtitles: the track stays empty and that is not an
    /// error. Fetch and parse failures are absorbed the same way; playback
    /// never depends on overlays. A result arriving after the session was
    /// superseded is dropped without touching any state.
    #[instrument(skip(self, backend, url))]
    pub async fn load_subtitles(&mut self, backend: &dyn Backend, url: Option<&Url>) {
        let Some(url) = url else {
            debug!("No subtitle reference; empty track");
            return;
        };
        let guard = self.guard.clone();

        let cues = match backend.fetch_subtitle(url).await {
            Ok(payload) => match subtitle::parse(&payload) {
                Ok(cues) => cues,
                Err(err) => {
                    warn!(error = %err, "Subtitle payload unparseable; empty track");
                    Vec::new()
                }
            },
            Err(err) => {
                warn!(error = %err, "Subtitle fetch failed; empty track");
                Vec::new()
            }
        };

        if let Some(guard) = guard {
            if !guard.is_current() {
                debug!("Subtitle load landed after session was superseded; discarded");
                return;
            }
        }

        debug!(cues = cues.len(), "Subtitle track installed");
        self.subtitles.cues = cues;
    }

    /// Install the pre-fetched danmaku feed.
    pub fn set_danmaku(&mut self, events: Vec<DanmakuEvent>) {
        debug!(count = events.len(), "Danmaku track installed");
        self.danmaku.set_events(events);
    }

    /// Advance both tracks to a new clock reading.
    pub fn on_tick(&mut self, snapshot: &ClockSnapshot) {
        self.position = snapshot.position;
        self.danmaku.advance(snapshot.position);
    }

    /// Re-synchronize after a seek, before the next frame is acted on.
    pub fn on_seek(&mut self, position: f64) {
        self.position = position;
        self.danmaku.resync(position);
    }

    /// What to render for the latest clock reading.
    pub fn frame(&self) -> OverlayFrame {
        let cues = if self.subtitles.visible {
            self.subtitles
                .active_at(self.position)
                .into_iter()
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let comments = if self.danmaku.visible {
            self.danmaku.live().to_vec()
        } else {
            Vec::new()
        };

        OverlayFrame { cues, comments }
    }

    pub fn subtitles(&self) -> &SubtitleTrack {
        &self.subtitles
    }

    pub fn set_subtitle_visible(&mut self, visible: bool) {
        self.subtitles.visible = visible;
    }

    pub fn set_danmaku_visible(&mut self, visible: bool) {
        self.danmaku.visible = visible;
    }

    /// Shift the subtitle track relative to the clock.
    pub fn set_subtitle_offset(&mut self, offset: f64) {
        self.subtitles.offset = offset;
    }

    pub fn set_danmaku_offset(&mut self, offset: f64) {
        self.danmaku.offset = offset;
        self.danmaku.resync(self.position);
    }
}

impl Default for OverlayCompositor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DanmakuMode;

    fn snapshot(position: f64) -> ClockSnapshot {
        ClockSnapshot {
            position,
            duration: 1440.0,
            playing: true,
        }
    }

    #[test]
    fn test_empty_compositor_renders_nothing() {
        let mut compositor = OverlayCompositor::new();
        compositor.on_tick(&snapshot(10.0));

        let frame = compositor.frame();
        assert!(frame.cues.is_empty());
        assert!(frame.comments.is_empty());
    }

    #[test]
    fn test_frame_tracks_the_clock() {
        let mut compositor = OverlayCompositor::new();
        compositor.subtitles.cues = vec![
            SubtitleCue::new(5.0, 8.0, "first"),
            SubtitleCue::new(10.0, 12.0, "second"),
        ];
        compositor.set_danmaku(vec![DanmakuEvent {
            time: 6.0,
            text: "wow".to_string(),
            color: "#fff".to_string(),
            mode: DanmakuMode::Scroll,
        }]);

        compositor.on_tick(&snapshot(6.0));
        let frame = compositor.frame();
        assert_eq!(frame.cues.len(), 1);
        assert_eq!(frame.cues[0].text, "first");
        assert_eq!(frame.comments.len(), 1);

        compositor.on_tick(&snapshot(9.0));
        assert!(compositor.frame().cues.is_empty());
    }

    #[test]
    fn test_seek_resync_matches_continuous_playthrough() {
        let mut compositor = OverlayCompositor::new();
        compositor.subtitles.cues = vec![SubtitleCue::new(100.0, 104.0, "late cue")];
        compositor.set_danmaku(vec![
            DanmakuEvent {
                time: 20.0,
                text: "early".to_string(),
                color: "#fff".to_string(),
                mode: DanmakuMode::Scroll,
            },
            DanmakuEvent {
                time: 99.0,
                text: "recent".to_string(),
                color: "#fff".to_string(),
                mode: DanmakuMode::Scroll,
            },
        ]);

        compositor.on_tick(&snapshot(30.0));
        compositor.on_seek(101.0);

        let frame = compositor.frame();
        // The cue under the playhead is up, the long-retired comment is
        // not, the one still inside its window is.
        assert_eq!(frame.cues.len(), 1);
        assert_eq!(frame.comments.len(), 1);
        assert_eq!(frame.comments[0].text, "recent");
    }

    #[test]
    fn test_visibility_flags() {
        let mut compositor = OverlayCompositor::new();
        compositor.subtitles.cues = vec![SubtitleCue::new(0.0, 10.0, "cue")];
        compositor.on_tick(&snapshot(5.0));

        compositor.set_subtitle_visible(false);
        assert!(compositor.frame().cues.is_empty());

        compositor.set_subtitle_visible(true);
        assert_eq!(compositor.frame().cues.len(), 1);
    }

    #[test]
    fn test_subtitle_offset_shifts_sampling() {
        let mut compositor = OverlayCompositor::new();
        compositor.subtitles.cues = vec![SubtitleCue::new(5.0, 8.0, "cue")];

        compositor.set_subtitle_offset(2.0);
        compositor.on_tick(&snapshot(6.0));
        assert!(compositor.frame().cues.is_empty());

        compositor.on_tick(&snapshot(7.5));
        assert_eq!(compositor.frame().cues.len(), 1);
    }
}
