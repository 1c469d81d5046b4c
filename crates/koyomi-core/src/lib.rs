//! Koyomi Core - Media Playback Orchestration
//!
//! This crate owns a single video surface across its lifetime and
//! coordinates everything around it:
//! - Session lifecycle with at-most-one mounted player instance
//! - Adaptive (HLS) and progressive source binding with bounded fault
//!   recovery
//! - Subtitle and danmaku overlays in lockstep with the playback clock
//! - Resolution switching that preserves playback position
//! - End-of-episode transition signaling
//!
//! Decoding, page routing and the catalog API live outside; the surface is
//! a trait the host implements, and all backend access goes through one
//! client seam.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Koyomi Core                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │  │    Stream    │   │   Overlay    │   │  Resolution  │      │
//! │  │    Source    │   │  Compositor  │   │    Switch    │      │
//! │  │  Controller  │   │ (sub/danmaku)│   │ Coordinator  │      │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘      │
//! │         │                  │ clock            │              │
//! │         └──────────────────┼──────────────────┘              │
//! │                            │                                 │
//! │                     ┌──────┴──────┐      ┌──────────────┐    │
//! │                     │  Playback   │──────│   Episode    │    │
//! │                     │   Session   │clock │   Boundary   │    │
//! │                     └──────┬──────┘      │   Monitor    │    │
//! │                            │             └──────────────┘    │
//! │              ┌─────────────┴─────────────┐                   │
//! │       ┌──────┴───────┐            ┌──────┴───────┐           │
//! │       │    Media     │            │   Backend    │           │
//! │       │   Surface    │            │    Client    │           │
//! │       └──────────────┘            └──────────────┘           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The host page drives the session (`open`, `close`, `seek`,
//! `set_playing`), feeds renderer ticks into `update_clock`, and wires the
//! compositor and boundary monitor to the session's clock stream:
//!
//! ```text
//! while clock_rx.changed().await.is_ok() {
//!     let snapshot = *clock_rx.borrow();
//!     compositor.on_tick(&snapshot);
//!     monitor.observe(&snapshot);
//! }
//! ```

pub mod adaptive;
pub mod backend;
pub mod boundary;
pub mod clock;
pub mod error;
pub mod overlay;
pub mod session;
pub mod source;
pub mod surface;
pub mod switcher;
pub mod testing;
pub mod types;

pub use adaptive::{AdaptiveStream, HttpFetcher, PlaylistFetcher};
pub use backend::{Backend, HttpBackend};
pub use boundary::EpisodeBoundaryMonitor;
pub use clock::{EpochGuard, PlaybackClock};
pub use error::{Error, Result};
pub use overlay::danmaku::{DanmakuConfig, LiveComment};
pub use overlay::{OverlayCompositor, OverlayFrame};
pub use session::{PlaybackSession, SessionHandle};
pub use source::{RecoveryAction, StreamSourceController};
pub use surface::MediaSurface;
pub use switcher::ResolutionSwitchCoordinator;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the playback core with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Koyomi Core initialized");
}
