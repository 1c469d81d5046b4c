//! Platform media surface seam
//!
//! The core never decodes video. Everything the platform's media element
//! does for us sits behind [`MediaSurface`]; the session is the only
//! component allowed to drive it.

use crate::Result;
use async_trait::async_trait;
use url::Url;

/// One rendering surface with a platform decoder behind it.
///
/// Implementations wrap whatever the host runtime provides (a DOM media
/// element, a GStreamer sink, a test double). The contract the core relies
/// on:
///
/// - `attach` binds a source URL and begins loading; at most one source is
///   bound at a time, and `detach` must fully release it before the next
///   `attach`.
/// - `wait_until_ready` resolves once the bound source reports it can play;
///   a resolution switch restores position only after this resolves.
/// - `recover_media` asks the decoder to rebuild its pipeline in place
///   without losing the bound source. Used at most once per media fault.
#[async_trait]
pub trait MediaSurface: Send + Sync {
    /// Whether the surface can accept a mount right now.
    fn is_available(&self) -> bool;

    /// Bind a source URL to the surface and start loading it.
    fn attach(&self, url: &Url) -> Result<()>;

    /// Release the bound source. Idempotent.
    fn detach(&self);

    /// Move the playhead, in seconds.
    fn seek(&self, position: f64);

    /// Start or stop playback.
    fn set_playing(&self, playing: bool);

    /// Resolve once the bound source reports ready-to-play.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Rebuild the media pipeline in place after a decode fault.
    fn recover_media(&self) -> Result<()>;
}
