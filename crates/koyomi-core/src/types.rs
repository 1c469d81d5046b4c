//! Core types for the playback orchestration core

use serde::{Deserialize, Serialize};
use url::Url;

/// Identifier of the episode a session is bound to.
///
/// The catalog hands these out; the session adopts the episode id as its own
/// identifier for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId(pub String);

impl EpisodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EpisodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Session mount states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No player instance attached
    Unmounted,
    /// Player instance is being acquired and the source is loading
    Mounting,
    /// Player instance attached, source bound, operations accepted
    Ready,
    /// Session torn down; terminal for this instance
    Destroyed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// `Ready` never re-enters `Mounting` directly; a new mount goes through
    /// `Destroyed` first. Any state may be closed into `Destroyed`.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Unmounted, Mounting)
                | (Mounting, Ready)
                | (Mounting, Unmounted)
                | (Destroyed, Mounting)
                | (Unmounted, Destroyed)
                | (Mounting, Destroyed)
                | (Ready, Destroyed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Unmounted => write!(f, "unmounted"),
            SessionState::Mounting => write!(f, "mounting"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Transport mode for a stream source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Direct file playback; the surface handles the whole container
    Progressive,
    /// Segmented HLS playback through the adaptive client
    Adaptive,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Progressive => write!(f, "progressive"),
            TransportMode::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Discrete resolution tiers selectable by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionTier {
    P480,
    P720,
    P1080,
}

impl ResolutionTier {
    /// Vertical resolution in pixels
    pub fn height(&self) -> u32 {
        match self {
            ResolutionTier::P480 => 480,
            ResolutionTier::P720 => 720,
            ResolutionTier::P1080 => 1080,
        }
    }

    /// Human label shown in the quality selector
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionTier::P480 => "480P",
            ResolutionTier::P720 => "720P",
            ResolutionTier::P1080 => "1080P",
        }
    }

    pub fn from_height(height: u32) -> Option<Self> {
        match height {
            480 => Some(ResolutionTier::P480),
            720 => Some(ResolutionTier::P720),
            1080 => Some(ResolutionTier::P1080),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One entry in the static quality selector catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionOption {
    pub tier: ResolutionTier,
    pub label: &'static str,
    pub default_selected: bool,
}

/// The resolution catalog offered to the viewer, highest first.
pub fn resolution_catalog() -> [ResolutionOption; 3] {
    [
        ResolutionOption {
            tier: ResolutionTier::P1080,
            label: ResolutionTier::P1080.label(),
            default_selected: true,
        },
        ResolutionOption {
            tier: ResolutionTier::P720,
            label: ResolutionTier::P720.label(),
            default_selected: false,
        },
        ResolutionOption {
            tier: ResolutionTier::P480,
            label: ResolutionTier::P480.label(),
            default_selected: false,
        },
    ]
}

/// Bounded recovery budget for transport faults on an adaptive source.
///
/// Each budget applies per descriptor load: the counters reset when a new
/// descriptor is bound, not when a retry succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Manifest reloads allowed per fault occurrence
    pub max_manifest_reloads: u32,
    /// In-place media pipeline recoveries allowed
    pub max_media_recoveries: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_manifest_reloads: 1,
            max_media_recoveries: 1,
        }
    }
}

/// Immutable description of a bound stream source.
///
/// A resolution or mode change never mutates a descriptor; it constructs a
/// new one via [`StreamDescriptor::with_tier`] or the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub mode: TransportMode,
    pub url: Url,
    pub tier: ResolutionTier,
    pub recovery: RecoveryPolicy,
}

impl StreamDescriptor {
    pub fn progressive(url: Url, tier: ResolutionTier) -> Self {
        Self {
            mode: TransportMode::Progressive,
            url,
            tier,
            recovery: RecoveryPolicy::default(),
        }
    }

    pub fn adaptive(url: Url, tier: ResolutionTier) -> Self {
        Self {
            mode: TransportMode::Adaptive,
            url,
            tier,
            recovery: RecoveryPolicy::default(),
        }
    }

    /// New descriptor for a different tier. The URL changes with the tier
    /// because playlist locations embed the resolution.
    pub fn with_tier(&self, tier: ResolutionTier, url: Url) -> Self {
        Self {
            mode: self.mode,
            url,
            tier,
            recovery: self.recovery,
        }
    }
}

/// A discrete transport fault reported against a descriptor
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub category: FaultCategory,
    pub fatal: bool,
    pub descriptor: Option<StreamDescriptor>,
}

impl ErrorEvent {
    pub fn fatal(category: FaultCategory, descriptor: Option<StreamDescriptor>) -> Self {
        Self {
            category,
            fatal: true,
            descriptor,
        }
    }

    pub fn transient(category: FaultCategory) -> Self {
        Self {
            category,
            fatal: false,
            descriptor: None,
        }
    }
}

/// Fault categories used by the recovery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultCategory {
    Network,
    Media,
    Unknown,
}

impl std::fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCategory::Network => write!(f, "network"),
            FaultCategory::Media => write!(f, "media"),
            FaultCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// One reading of the session's playback clock.
///
/// Broadcast to overlays and the boundary monitor; consumers read time from
/// here and never own it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockSnapshot {
    /// Current playback position in seconds
    pub position: f64,
    /// Content duration in seconds; 0.0 while unknown
    pub duration: f64,
    /// Whether playback is advancing
    pub playing: bool,
}

/// Episode info as served by the catalog API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub subtitles: Vec<String>,
    #[serde(default)]
    pub season_id: Option<String>,
}

/// Resolved media descriptor the host hands to [`PlaybackSession::open`].
///
/// [`PlaybackSession::open`]: crate::session::PlaybackSession::open
#[derive(Debug, Clone)]
pub struct EpisodeMedia {
    pub title: String,
    pub video_url: Url,
    pub poster_url: Option<Url>,
    pub subtitle_url: Option<Url>,
    pub danmaku: Vec<DanmakuEvent>,
    /// Streaming-mode flag: adaptive HLS when set, progressive otherwise
    pub adaptive: bool,
}

impl EpisodeMedia {
    /// Resolve catalog episode info into playable locations.
    ///
    /// Mirrors the backend's URL layout: progressive files under `/videos`,
    /// regenerated playlists under `/stream`, posters under `/images` and
    /// subtitle payloads under `/subtitles`. Only the first listed subtitle
    /// is selected; a session without one renders an empty track.
    pub fn from_info(
        base: &Url,
        info: &EpisodeInfo,
        adaptive: bool,
        tier: ResolutionTier,
        danmaku: Vec<DanmakuEvent>,
    ) -> crate::Result<Self> {
        let video_url = if adaptive {
            base.join(&format!("stream/playlist_{}.m3u8", tier.height()))?
        } else {
            base.join(&format!(
                "videos{}/{}",
                info.file_path.trim_end_matches('/'),
                info.file_name
            ))?
        };

        let poster_url = match &info.poster_path {
            Some(path) => Some(base.join(&format!("images{path}"))?),
            None => None,
        };

        let subtitle_url = match info.subtitles.first() {
            Some(name) => Some(base.join(&format!(
                "subtitles{}/{}",
                info.file_path.trim_end_matches('/'),
                name
            ))?),
            None => None,
        };

        Ok(Self {
            title: info.title.clone().unwrap_or_else(|| "Unknown Title".into()),
            video_url,
            poster_url,
            subtitle_url,
            danmaku,
            adaptive,
        })
    }
}

/// Lane mode of a danmaku comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DanmakuMode {
    /// Scrolls right-to-left across the surface
    Scroll,
    /// Pinned to the top band
    Top,
    /// Pinned to the bottom band
    Bottom,
}

impl Default for DanmakuMode {
    fn default() -> Self {
        DanmakuMode::Scroll
    }
}

/// One timed comment from the danmaku feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DanmakuEvent {
    /// Timestamp in seconds at which the comment appears
    pub time: f64,
    pub text: String,
    #[serde(default = "default_danmaku_color")]
    pub color: String,
    #[serde(default, alias = "type")]
    pub mode: DanmakuMode,
}

fn default_danmaku_color() -> String {
    "#ffffff".to_string()
}

/// A subtitle cue interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Display text; markup already stripped
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Check if the cue should be displayed at the given time
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Tier selected before the viewer touches the quality selector
    pub default_tier: ResolutionTier,
    /// Recovery budget applied to every descriptor this session builds
    pub recovery: RecoveryPolicy,
    /// Request timeout for playlist and backend fetches, in milliseconds
    pub request_timeout_ms: u64,
    /// User recorded by the fire-and-forget last-watched call
    pub user_id: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_tier: ResolutionTier::P1080,
            recovery: RecoveryPolicy::default(),
            request_timeout_ms: 10_000,
            user_id: "1".to_string(),
        }
    }
}
