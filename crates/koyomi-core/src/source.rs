//! Stream source binding and fault recovery
//!
//! [`StreamSourceController`] binds a [`StreamDescriptor`] to the live
//! surface and owns the adaptive client while one exists. Fault recovery is
//! bounded by the descriptor's recovery policy: one manifest reload per
//! network fault occurrence, one in-place media recovery per media fault,
//! and anything past the budget surfaces as a `StreamFault` with playback
//! left stopped.

use crate::adaptive::{AdaptiveStream, PlaylistFetcher};
use crate::error::{Error, Result};
use crate::surface::MediaSurface;
use crate::types::{ErrorEvent, FaultCategory, StreamDescriptor, TransportMode};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// What the recovery policy did with a fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    /// Non-fatal fault; logged and ignored, playback untouched
    Ignored,
    /// Playlist reloaded and the surface re-attached at the last position
    ManifestReloaded { resumed_at: f64 },
    /// Media pipeline rebuilt in place
    MediaRecovered,
}

#[derive(Debug, Default)]
struct RetryBudget {
    manifest_reloads: u32,
    media_recoveries: u32,
}

/// Binds descriptors to the surface; at most one live adaptive client.
pub struct StreamSourceController {
    surface: Arc<dyn MediaSurface>,
    fetcher: Arc<dyn PlaylistFetcher>,
    stream: RwLock<Option<AdaptiveStream>>,
    descriptor: RwLock<Option<StreamDescriptor>>,
    last_position: RwLock<f64>,
    budget: RwLock<RetryBudget>,
}

impl StreamSourceController {
    pub fn new(surface: Arc<dyn MediaSurface>, fetcher: Arc<dyn PlaylistFetcher>) -> Self {
        Self {
            surface,
            fetcher,
            stream: RwLock::new(None),
            descriptor: RwLock::new(None),
            last_position: RwLock::new(0.0),
            budget: RwLock::new(RetryBudget::default()),
        }
    }

    /// Bind `descriptor` to the surface and start loading.
    ///
    /// Callers release any previous source with [`teardown`] first; a
    /// leftover client here is released before the new one is built so the
    /// at-most-one-client invariant holds regardless.
    ///
    /// A fatal network fault while opening an adaptive source consumes one
    /// manifest reload from the budget before failing; the second identical
    /// fault surfaces a `StreamFault`.
    ///
    /// [`teardown`]: StreamSourceController::teardown
    #[instrument(skip(self, descriptor), fields(mode = %descriptor.mode, tier = %descriptor.tier))]
    pub async fn load(&self, descriptor: &StreamDescriptor) -> Result<()> {
        if self.stream.read().await.is_some() {
            warn!("Previous streaming client still live at load; releasing it");
            self.teardown().await;
        }

        *self.budget.write().await = RetryBudget::default();

        match descriptor.mode {
            TransportMode::Progressive => {
                self.surface.attach(&descriptor.url)?;
            }
            TransportMode::Adaptive => {
                let stream = self.open_with_retry(descriptor).await?;
                self.surface.attach(stream.active_url())?;
                *self.stream.write().await = Some(stream);
            }
        }

        *self.descriptor.write().await = Some(descriptor.clone());
        info!(url = %descriptor.url, "Source bound");
        Ok(())
    }

    /// Open the adaptive client, spending the manifest-reload budget on a
    /// first fatal network fault.
    async fn open_with_retry(&self, descriptor: &StreamDescriptor) -> Result<AdaptiveStream> {
        match AdaptiveStream::open(self.fetcher.as_ref(), descriptor).await {
            Ok(stream) => Ok(stream),
            Err(err) if err.fault_category() == FaultCategory::Network => {
                if !self.take_manifest_reload(descriptor).await {
                    warn!(error = %err, "Manifest load failed with retry budget exhausted");
                    return Err(Error::StreamFault {
                        category: FaultCategory::Network,
                    });
                }

                let resume_at = *self.last_position.read().await;
                warn!(error = %err, resume_at, "Manifest load failed; retrying once");

                AdaptiveStream::open(self.fetcher.as_ref(), descriptor)
                    .await
                    .map_err(|second| {
                        warn!(error = %second, "Manifest retry failed");
                        Error::StreamFault {
                            category: FaultCategory::Network,
                        }
                    })
            }
            Err(err) => {
                warn!(error = %err, "Manifest load failed");
                Err(Error::StreamFault {
                    category: err.fault_category(),
                })
            }
        }
    }

    /// Apply the recovery policy to a transport fault reported against the
    /// bound source.
    ///
    /// Non-fatal faults never interrupt playback. The policy only covers
    /// adaptive sources; a fatal fault on a progressive source is
    /// unrecoverable here.
    #[instrument(skip(self, event), fields(category = %event.category, fatal = event.fatal))]
    pub async fn on_error(&self, event: &ErrorEvent) -> Result<RecoveryAction> {
        if !event.fatal {
            debug!("Non-fatal stream fault ignored");
            return Ok(RecoveryAction::Ignored);
        }

        let descriptor = match self.descriptor.read().await.clone() {
            Some(d) => d,
            None => {
                return Err(Error::StreamFault {
                    category: event.category,
                })
            }
        };

        if descriptor.mode != TransportMode::Adaptive {
            return Err(Error::StreamFault {
                category: event.category,
            });
        }

        match event.category {
            FaultCategory::Network => {
                if !self.take_manifest_reload(&descriptor).await {
                    warn!("Network fault past recovery budget; surfacing stream fault");
                    return Err(Error::StreamFault {
                        category: FaultCategory::Network,
                    });
                }
                self.reload_manifest(&descriptor).await
            }
            FaultCategory::Media => {
                if !self.take_media_recovery(&descriptor).await {
                    warn!("Media fault past recovery budget; surfacing stream fault");
                    return Err(Error::StreamFault {
                        category: FaultCategory::Media,
                    });
                }
                self.surface.recover_media().map_err(|err| {
                    warn!(error = %err, "In-place media recovery failed");
                    Error::StreamFault {
                        category: FaultCategory::Media,
                    }
                })?;
                info!("Media pipeline recovered in place");
                Ok(RecoveryAction::MediaRecovered)
            }
            FaultCategory::Unknown => {
                warn!("Unrecoverable stream fault");
                Err(Error::StreamFault {
                    category: FaultCategory::Unknown,
                })
            }
        }
    }

    /// Reload the current playlist and re-attach at the last known position.
    async fn reload_manifest(&self, descriptor: &StreamDescriptor) -> Result<RecoveryAction> {
        let resume_at = *self.last_position.read().await;
        info!(resume_at, "Reloading manifest after network fault");

        let stream = AdaptiveStream::open(self.fetcher.as_ref(), descriptor)
            .await
            .map_err(|err| {
                warn!(error = %err, "Manifest reload failed");
                Error::StreamFault {
                    category: FaultCategory::Network,
                }
            })?;

        self.surface.detach();
        self.surface.attach(stream.active_url())?;
        self.surface.seek(resume_at);
        *self.stream.write().await = Some(stream);

        Ok(RecoveryAction::ManifestReloaded { resumed_at: resume_at })
    }

    async fn take_manifest_reload(&self, descriptor: &StreamDescriptor) -> bool {
        let mut budget = self.budget.write().await;
        if budget.manifest_reloads < descriptor.recovery.max_manifest_reloads {
            budget.manifest_reloads += 1;
            true
        } else {
            false
        }
    }

    async fn take_media_recovery(&self, descriptor: &StreamDescriptor) -> bool {
        let mut budget = self.budget.write().await;
        if budget.media_recoveries < descriptor.recovery.max_media_recoveries {
            budget.media_recoveries += 1;
            true
        } else {
            false
        }
    }

    /// Release the streaming client. Idempotent; must precede a new
    /// [`load`] so no two clients are ever live together.
    ///
    /// [`load`]: StreamSourceController::load
    pub async fn teardown(&self) {
        if self.stream.write().await.take().is_some() {
            debug!("Streaming client released");
        }
    }

    /// Feed the last known playback position, used as the resume point when
    /// a manifest reload recovers a network fault.
    pub async fn note_position(&self, position: f64) {
        *self.last_position.write().await = position;
    }

    /// Duration reported by the bound playlist, when VOD.
    pub async fn duration(&self) -> Option<f64> {
        self.stream.read().await.as_ref().and_then(|s| s.duration())
    }

    /// Descriptor currently bound, if any.
    pub async fn descriptor(&self) -> Option<StreamDescriptor> {
        self.descriptor.read().await.clone()
    }
}
