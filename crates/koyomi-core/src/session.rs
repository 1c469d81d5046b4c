//! Playback session - single owner of the mounted player surface
//!
//! Coordinates:
//! - Surface mount/teardown lifecycle and the session state machine
//! - Source binding through the stream source controller
//! - Clock ingest and broadcast to overlays and the boundary monitor
//! - Cancellation of superseded async work via the session epoch

use crate::adaptive::HttpFetcher;
use crate::backend::Backend;
use crate::clock::{EpochGuard, PlaybackClock, SessionEpoch};
use crate::error::{Error, Result};
use crate::source::{RecoveryAction, StreamSourceController};
use crate::surface::MediaSurface;
use crate::types::{
    ClockSnapshot, EpisodeId, EpisodeMedia, ErrorEvent, PlayerConfig, SessionState,
    StreamDescriptor, TransportMode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

/// Handle returned by [`PlaybackSession::open`]: the episode the session is
/// bound to plus its observable streams.
#[derive(Debug)]
pub struct SessionHandle {
    pub episode: EpisodeId,
    pub state: watch::Receiver<SessionState>,
    pub clock: watch::Receiver<ClockSnapshot>,
}

/// Single authoritative owner of one mounted player instance.
///
/// At most one player instance is attached per session; `open` fully
/// destroys the previous instance before acquiring a new one, and all
/// surface mutation is routed through this type's operations.
pub struct PlaybackSession {
    config: PlayerConfig,
    surface: Arc<dyn MediaSurface>,
    backend: Arc<dyn Backend>,
    source: StreamSourceController,
    episode: RwLock<Option<EpisodeId>>,
    media: RwLock<Option<EpisodeMedia>>,
    descriptor: RwLock<Option<StreamDescriptor>>,
    state: RwLock<SessionState>,
    state_tx: watch::Sender<SessionState>,
    clock: PlaybackClock,
    position: RwLock<f64>,
    duration: RwLock<f64>,
    playing: RwLock<bool>,
    epoch: SessionEpoch,
}

impl PlaybackSession {
    /// Create a session driving `surface`, with playlists fetched over HTTP.
    pub fn new(
        surface: Arc<dyn MediaSurface>,
        backend: Arc<dyn Backend>,
        config: PlayerConfig,
    ) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(Duration::from_millis(
            config.request_timeout_ms,
        )));
        Self::with_fetcher(surface, backend, fetcher, config)
    }

    /// Create a session with an explicit playlist fetcher.
    pub fn with_fetcher(
        surface: Arc<dyn MediaSurface>,
        backend: Arc<dyn Backend>,
        fetcher: Arc<dyn crate::adaptive::PlaylistFetcher>,
        config: PlayerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unmounted);

        Self {
            config,
            surface: Arc::clone(&surface),
            backend,
            source: StreamSourceController::new(surface, fetcher),
            episode: RwLock::new(None),
            media: RwLock::new(None),
            descriptor: RwLock::new(None),
            state: RwLock::new(SessionState::Unmounted),
            state_tx,
            clock: PlaybackClock::new(),
            position: RwLock::new(0.0),
            duration: RwLock::new(0.0),
            playing: RwLock::new(false),
            epoch: SessionEpoch::new(),
        }
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to the playback clock
    pub fn subscribe_clock(&self) -> watch::Receiver<ClockSnapshot> {
        self.clock.subscribe()
    }

    /// Latest clock reading
    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    /// Guard for async work that must be discarded once this session is
    /// closed or superseded.
    pub fn epoch_guard(&self) -> EpochGuard {
        self.epoch.guard()
    }

    /// Transition to a new state, enforcing the session state machine.
    async fn set_state(&self, new_state: SessionState) -> Result<()> {
        let current = *self.state.read().await;

        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current,
                to: new_state,
            });
        }

        *self.state.write().await = new_state;
        self.state_tx.send_replace(new_state);
        info!(from = %current, to = %new_state, "Session state transition");
        Ok(())
    }

    /// Mount a player instance for `episode` bound to `media`.
    ///
    /// Any previous instance is fully destroyed first; in-flight async work
    /// of the superseded session is invalidated before the new mount
    /// begins. Position resets to zero. Fails with [`Error::Mount`] when
    /// the rendering surface is unavailable.
    #[instrument(skip(self, media), fields(%episode, adaptive = media.adaptive))]
    pub async fn open(&self, episode: EpisodeId, media: EpisodeMedia) -> Result<SessionHandle> {
        // Guaranteed release before new acquisition
        let current = self.state().await;
        if matches!(current, SessionState::Mounting | SessionState::Ready) {
            self.close().await?;
        }
        self.epoch.bump();

        self.set_state(SessionState::Mounting).await?;

        if !self.surface.is_available() {
            self.set_state(SessionState::Unmounted).await?;
            return Err(Error::Mount("rendering surface unavailable".to_string()));
        }

        *self.episode.write().await = Some(episode.clone());
        *self.media.write().await = Some(media.clone());
        *self.position.write().await = 0.0;
        *self.duration.write().await = 0.0;
        *self.playing.write().await = false;
        self.clock.publish(ClockSnapshot::default());

        let descriptor = StreamDescriptor {
            mode: if media.adaptive {
                TransportMode::Adaptive
            } else {
                TransportMode::Progressive
            },
            url: media.video_url.clone(),
            tier: self.config.default_tier,
            recovery: self.config.recovery,
        };

        if let Err(err) = self.source.load(&descriptor).await {
            warn!(error = %err, "Source load failed during mount");
            self.source.teardown().await;
            self.surface.detach();
            self.set_state(SessionState::Unmounted).await?;
            return Err(err);
        }

        if let Some(duration) = self.source.duration().await {
            *self.duration.write().await = duration;
            self.publish_clock().await;
        }

        *self.descriptor.write().await = Some(descriptor);
        self.set_state(SessionState::Ready).await?;

        // Fire-and-forget bookkeeping; never gates playback
        let backend = Arc::clone(&self.backend);
        let user = self.config.user_id.clone();
        let watched = episode.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.touch_last_watched(&user, &watched).await {
                debug!(error = %err, "Last-watched update failed");
            }
        });

        Ok(SessionHandle {
            episode,
            state: self.subscribe_state(),
            clock: self.subscribe_clock(),
        })
    }

    /// Destroy the player instance and release streaming resources.
    ///
    /// Idempotent: closing a closed session is a no-op. Overlay loads still
    /// in flight are invalidated through the epoch.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        if self.state().await == SessionState::Destroyed {
            return Ok(());
        }

        self.epoch.bump();
        self.source.teardown().await;
        self.surface.set_playing(false);
        self.surface.detach();

        *self.playing.write().await = false;
        *self.media.write().await = None;
        self.publish_clock().await;
        self.set_state(SessionState::Destroyed).await?;

        Ok(())
    }

    /// Move the playhead. No-op unless the session is ready.
    pub async fn seek(&self, position: f64) -> Result<()> {
        if self.state().await != SessionState::Ready {
            debug!(position, "Seek ignored; session not ready");
            return Ok(());
        }

        let duration = *self.duration.read().await;
        let clamped = if duration > 0.0 {
            position.clamp(0.0, duration)
        } else {
            position.max(0.0)
        };

        self.surface.seek(clamped);
        *self.position.write().await = clamped;
        self.source.note_position(clamped).await;
        self.publish_clock().await;

        debug!(to = clamped, "Seeked");
        Ok(())
    }

    /// Start or stop playback. No-op unless the session is ready.
    pub async fn set_playing(&self, playing: bool) -> Result<()> {
        if self.state().await != SessionState::Ready {
            debug!(playing, "Play state change ignored; session not ready");
            return Ok(());
        }

        self.surface.set_playing(playing);
        *self.playing.write().await = playing;
        self.publish_clock().await;
        Ok(())
    }

    /// Ingest a clock tick from the renderer and re-broadcast it.
    pub async fn update_clock(&self, position: f64, duration: f64) {
        *self.position.write().await = position;
        if duration > 0.0 {
            *self.duration.write().await = duration;
        }
        self.source.note_position(position).await;
        self.publish_clock().await;
    }

    /// Apply the recovery policy to a transport fault.
    ///
    /// Recoverable faults are absorbed. A fault past the budget stops
    /// playback, leaves the frame mounted, and surfaces exactly once as the
    /// returned error.
    pub async fn handle_fault(&self, event: &ErrorEvent) -> Result<RecoveryAction> {
        match self.source.on_error(event).await {
            Ok(action) => Ok(action),
            Err(err) => {
                self.surface.set_playing(false);
                *self.playing.write().await = false;
                self.publish_clock().await;
                warn!(error = %err, "Stream fault surfaced; playback halted");
                Err(err)
            }
        }
    }

    /// Swap the bound descriptor in place, preserving the mounted surface.
    ///
    /// Used by the resolution switch coordinator; the streaming client of
    /// the old descriptor is released before the new one is built.
    pub async fn reload_with(&self, descriptor: StreamDescriptor) -> Result<()> {
        if self.state().await != SessionState::Ready {
            return Err(Error::NotReady);
        }

        self.source.teardown().await;
        self.surface.detach();
        self.source.load(&descriptor).await?;

        if let Some(duration) = self.source.duration().await {
            *self.duration.write().await = duration;
        }
        *self.descriptor.write().await = Some(descriptor);
        Ok(())
    }

    /// Resolve once the surface reports the bound source can play.
    pub async fn await_ready(&self) -> Result<()> {
        self.surface.wait_until_ready().await
    }

    pub async fn episode(&self) -> Option<EpisodeId> {
        self.episode.read().await.clone()
    }

    /// Media descriptor this session was opened with. Overlay inputs
    /// (subtitle URL, danmaku feed) come from here.
    pub async fn media(&self) -> Option<EpisodeMedia> {
        self.media.read().await.clone()
    }

    pub async fn descriptor(&self) -> Option<StreamDescriptor> {
        self.descriptor.read().await.clone()
    }

    pub async fn position(&self) -> f64 {
        *self.position.read().await
    }

    pub async fn duration(&self) -> f64 {
        *self.duration.read().await
    }

    pub async fn is_playing(&self) -> bool {
        *self.playing.read().await
    }

    async fn publish_clock(&self) {
        self.clock.publish(ClockSnapshot {
            position: *self.position.read().await,
            duration: *self.duration.read().await,
            playing: *self.playing.read().await,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{progressive_media, StubBackend, StubFetcher, StubSurface};

    fn session_with(surface: Arc<StubSurface>, backend: Arc<StubBackend>) -> PlaybackSession {
        PlaybackSession::with_fetcher(
            surface,
            backend,
            Arc::new(StubFetcher::default()),
            PlayerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_open_reaches_ready() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface.clone(), Arc::new(StubBackend::default()));

        let handle = session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap();

        assert_eq!(handle.episode, EpisodeId::from("e1"));
        assert_eq!(session.state().await, SessionState::Ready);
        assert_eq!(session.position().await, 0.0);
        assert!(surface.attached().is_some());
    }

    #[tokio::test]
    async fn test_open_fails_without_surface() {
        let surface = Arc::new(StubSurface::new());
        surface.set_available(false);
        let session = session_with(surface.clone(), Arc::new(StubBackend::default()));

        let err = session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Mount(_)));
        assert_eq!(session.state().await, SessionState::Unmounted);
        assert!(surface.attached().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface.clone(), Arc::new(StubBackend::default()));

        session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap();

        session.close().await.unwrap();
        assert_eq!(session.state().await, SessionState::Destroyed);
        assert!(surface.attached().is_none());

        // Second close is a no-op, not an error
        session.close().await.unwrap();
        assert_eq!(surface.detach_count(), 1);
    }

    #[tokio::test]
    async fn test_reopen_destroys_previous_instance_first() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface.clone(), Arc::new(StubBackend::default()));

        session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap();
        session
            .open(EpisodeId::from("e2"), progressive_media())
            .await
            .unwrap();

        assert!(!surface.overlap_detected());
        assert_eq!(surface.attach_count(), 2);
        assert_eq!(session.episode().await, Some(EpisodeId::from("e2")));
    }

    #[tokio::test]
    async fn test_seek_and_play_are_noops_until_ready() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface.clone(), Arc::new(StubBackend::default()));

        session.seek(42.0).await.unwrap();
        session.set_playing(true).await.unwrap();

        assert_eq!(surface.last_seek(), None);
        assert!(!surface.playing());
    }

    #[tokio::test]
    async fn test_seek_clamps_to_duration() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface.clone(), Arc::new(StubBackend::default()));

        session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap();
        session.update_clock(0.0, 100.0).await;

        session.seek(500.0).await.unwrap();
        assert_eq!(session.position().await, 100.0);

        session.seek(-3.0).await.unwrap();
        assert_eq!(session.position().await, 0.0);
    }

    #[tokio::test]
    async fn test_clock_broadcast_follows_updates() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface, Arc::new(StubBackend::default()));

        session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap();

        let rx = session.subscribe_clock();
        session.update_clock(12.5, 1440.0).await;

        let snap = *rx.borrow();
        assert_eq!(snap.position, 12.5);
        assert_eq!(snap.duration, 1440.0);
    }

    #[tokio::test]
    async fn test_epoch_guard_expires_across_sessions() {
        let surface = Arc::new(StubSurface::new());
        let session = session_with(surface, Arc::new(StubBackend::default()));

        session
            .open(EpisodeId::from("e1"), progressive_media())
            .await
            .unwrap();
        let guard = session.epoch_guard();
        assert!(guard.is_current());

        session
            .open(EpisodeId::from("e2"), progressive_media())
            .await
            .unwrap();
        assert!(!guard.is_current());
    }
}
