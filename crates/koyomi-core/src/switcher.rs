//! Resolution switching with playback continuity
//!
//! A switch regenerates the backend playlist for the requested tier, binds
//! a fresh descriptor through the session, and restores position and play
//! state once the new source reports ready. A switch issued while another
//! is in flight wins: the older one is cancelled before its restore step so
//! only the most recently requested tier ends up active.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::session::PlaybackSession;
use crate::types::ResolutionTier;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Changes the active resolution tier while preserving position.
pub struct ResolutionSwitchCoordinator {
    session: Arc<PlaybackSession>,
    backend: Arc<dyn Backend>,
    generation: AtomicU64,
}

impl ResolutionSwitchCoordinator {
    pub fn new(session: Arc<PlaybackSession>, backend: Arc<dyn Backend>) -> Self {
        Self {
            session,
            backend,
            generation: AtomicU64::new(0),
        }
    }

    /// Switch the session to `tier`, resuming at the captured position.
    ///
    /// On success the acknowledged tier is returned for the host's quality
    /// selector. Playlist regeneration failure aborts the switch and the
    /// previous descriptor stays active ([`Error::SwitchAborted`]); a newer
    /// concurrent switch supersedes this one ([`Error::SwitchSuperseded`]).
    #[instrument(skip(self), fields(%tier))]
    pub async fn switch_to(&self, tier: ResolutionTier) -> Result<ResolutionTier> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let episode = self.session.episode().await.ok_or(Error::NotReady)?;
        let current = self.session.descriptor().await.ok_or(Error::NotReady)?;
        let prior_tier = current.tier;

        if tier == prior_tier {
            debug!("Requested tier already active");
            return Ok(tier);
        }

        // Capture before anything disturbs the pipeline
        let position = self.session.position().await;
        let was_playing = self.session.is_playing().await;

        let url = match self.backend.regenerate_playlist(&episode, tier).await {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "Playlist regeneration failed; switch aborted");
                return Err(Error::SwitchAborted {
                    requested: tier,
                    prior: prior_tier,
                });
            }
        };

        if self.superseded(generation) {
            debug!("Switch superseded before load");
            return Err(Error::SwitchSuperseded { requested: tier });
        }

        let descriptor = current.with_tier(tier, url);
        self.session.reload_with(descriptor).await?;
        self.session.await_ready().await?;

        // A newer switch owns the pipeline now; leave the restore to it
        if self.superseded(generation) {
            debug!("Switch superseded before restore");
            return Err(Error::SwitchSuperseded { requested: tier });
        }

        self.session.seek(position).await?;
        if was_playing {
            self.session.set_playing(true).await?;
        }

        info!(from = %prior_tier, to = %tier, resumed_at = position, "Resolution switched");
        Ok(tier)
    }

    fn superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
    }
}
