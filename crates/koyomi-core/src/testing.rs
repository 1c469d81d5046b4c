//! Test doubles for the trait seams
//!
//! Scripted stand-ins for the platform surface, the backend API and the
//! playlist fetcher. Used by this crate's own tests and exported so hosts
//! can exercise their wiring without a decoder or a network.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::surface::MediaSurface;
use crate::types::{DanmakuEvent, EpisodeId, EpisodeInfo, EpisodeMedia, ResolutionTier};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

/// Progressive-mode media for a plain test episode: no subtitles, no
/// danmaku.
pub fn progressive_media() -> EpisodeMedia {
    EpisodeMedia {
        title: "Test Episode".to_string(),
        video_url: Url::parse("http://media.local/videos/shows/ep1/ep1.mp4").unwrap(),
        poster_url: None,
        subtitle_url: None,
        danmaku: Vec::new(),
        adaptive: false,
    }
}

/// Adaptive-mode media pointing at the regenerated 1080p playlist.
pub fn adaptive_media() -> EpisodeMedia {
    EpisodeMedia {
        title: "Test Episode".to_string(),
        video_url: Url::parse("http://media.local/stream/playlist_1080.m3u8").unwrap(),
        poster_url: None,
        subtitle_url: None,
        danmaku: Vec::new(),
        adaptive: true,
    }
}

/// Scripted [`MediaSurface`] that accounts for every instance it is asked
/// to hold.
pub struct StubSurface {
    available: AtomicBool,
    attached: Mutex<Option<Url>>,
    attach_count: AtomicUsize,
    detach_count: AtomicUsize,
    overlap: AtomicBool,
    last_seek: Mutex<Option<f64>>,
    playing: AtomicBool,
    ready: AtomicBool,
    ready_notify: Notify,
    fail_attach: AtomicBool,
    media_recoveries: AtomicUsize,
    fail_media_recovery: AtomicBool,
}

impl StubSurface {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            attached: Mutex::new(None),
            attach_count: AtomicUsize::new(0),
            detach_count: AtomicUsize::new(0),
            overlap: AtomicBool::new(false),
            last_seek: Mutex::new(None),
            playing: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            ready_notify: Notify::new(),
            fail_attach: AtomicBool::new(false),
            media_recoveries: AtomicUsize::new(0),
            fail_media_recovery: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn set_fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::Release);
    }

    pub fn set_fail_media_recovery(&self, fail: bool) {
        self.fail_media_recovery.store(fail, Ordering::Release);
    }

    /// Gate `wait_until_ready` until [`report_ready`] is called.
    ///
    /// [`report_ready`]: StubSurface::report_ready
    pub fn defer_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn report_ready(&self) {
        self.ready.store(true, Ordering::Release);
        self.ready_notify.notify_waiters();
    }

    pub fn attached(&self) -> Option<Url> {
        self.attached.lock().unwrap().clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::Acquire)
    }

    pub fn detach_count(&self) -> usize {
        self.detach_count.load(Ordering::Acquire)
    }

    /// True if a second source was ever attached without a detach between.
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::Acquire)
    }

    pub fn last_seek(&self) -> Option<f64> {
        *self.last_seek.lock().unwrap()
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn media_recoveries(&self) -> usize {
        self.media_recoveries.load(Ordering::Acquire)
    }
}

impl Default for StubSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSurface for StubSurface {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn attach(&self, url: &Url) -> Result<()> {
        if self.fail_attach.load(Ordering::Acquire) {
            return Err(Error::Mount("scripted attach failure".to_string()));
        }

        let mut attached = self.attached.lock().unwrap();
        if attached.is_some() {
            self.overlap.store(true, Ordering::Release);
        }
        *attached = Some(url.clone());
        self.attach_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn detach(&self) {
        if self.attached.lock().unwrap().take().is_some() {
            self.detach_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn seek(&self, position: f64) {
        *self.last_seek.lock().unwrap() = Some(position);
    }

    fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    async fn wait_until_ready(&self) -> Result<()> {
        while !self.ready.load(Ordering::Acquire) {
            self.ready_notify.notified().await;
        }
        Ok(())
    }

    fn recover_media(&self) -> Result<()> {
        if self.fail_media_recovery.load(Ordering::Acquire) {
            return Err(Error::StreamFault {
                category: crate::types::FaultCategory::Media,
            });
        }
        self.media_recoveries.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Scripted [`Backend`] with per-call gates for supersession tests.
pub struct StubBackend {
    base: Url,
    episode: Mutex<Option<EpisodeInfo>>,
    hls: AtomicBool,
    subtitle_payload: Mutex<Option<String>>,
    subtitle_gate: Mutex<Option<Arc<Notify>>>,
    subtitle_release: Mutex<Option<Arc<Notify>>>,
    subtitle_calls: AtomicUsize,
    danmaku: Mutex<Vec<DanmakuEvent>>,
    fail_regen: AtomicBool,
    regen_gate: Mutex<Option<Arc<Notify>>>,
    regen_release: Mutex<Option<Arc<Notify>>>,
    regen_calls: AtomicUsize,
    last_watched: Mutex<Vec<(String, EpisodeId)>>,
}

impl StubBackend {
    pub fn set_episode_info(&self, info: EpisodeInfo) {
        *self.episode.lock().unwrap() = Some(info);
    }

    pub fn set_hls_enabled(&self, enabled: bool) {
        self.hls.store(enabled, Ordering::Release);
    }

    pub fn set_subtitle(&self, payload: impl Into<String>) {
        *self.subtitle_payload.lock().unwrap() = Some(payload.into());
    }

    pub fn set_danmaku(&self, events: Vec<DanmakuEvent>) {
        *self.danmaku.lock().unwrap() = events;
    }

    pub fn fail_regenerate(&self) {
        self.fail_regen.store(true, Ordering::Release);
    }

    /// Gate the next `regenerate_playlist` call until released.
    pub fn hold_regenerate(&self) {
        let gate = Arc::new(Notify::new());
        *self.regen_gate.lock().unwrap() = Some(Arc::clone(&gate));
        *self.regen_release.lock().unwrap() = Some(gate);
    }

    pub fn release_regenerate(&self) {
        if let Some(gate) = self.regen_release.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    pub async fn wait_for_regen_call(&self) {
        while self.regen_calls.load(Ordering::Acquire) == 0 {
            tokio::task::yield_now().await;
        }
    }

    pub fn regen_calls(&self) -> usize {
        self.regen_calls.load(Ordering::Acquire)
    }

    /// Gate the next `fetch_subtitle` call until released.
    pub fn hold_subtitle(&self) {
        let gate = Arc::new(Notify::new());
        *self.subtitle_gate.lock().unwrap() = Some(Arc::clone(&gate));
        *self.subtitle_release.lock().unwrap() = Some(gate);
    }

    pub fn release_subtitle(&self) {
        if let Some(gate) = self.subtitle_release.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    pub async fn wait_for_subtitle_call(&self) {
        while self.subtitle_calls.load(Ordering::Acquire) == 0 {
            tokio::task::yield_now().await;
        }
    }

    pub fn last_watched(&self) -> Vec<(String, EpisodeId)> {
        self.last_watched.lock().unwrap().clone()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self {
            base: Url::parse("http://media.local/").unwrap(),
            episode: Mutex::new(None),
            hls: AtomicBool::new(false),
            subtitle_payload: Mutex::new(None),
            subtitle_gate: Mutex::new(None),
            subtitle_release: Mutex::new(None),
            subtitle_calls: AtomicUsize::new(0),
            danmaku: Mutex::new(Vec::new()),
            fail_regen: AtomicBool::new(false),
            regen_gate: Mutex::new(None),
            regen_release: Mutex::new(None),
            regen_calls: AtomicUsize::new(0),
            last_watched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn episode_info(&self, _episode: &EpisodeId) -> Result<EpisodeInfo> {
        self.episode.lock().unwrap().clone().ok_or(Error::Backend {
            status: 404,
            url: "stub://episode".to_string(),
        })
    }

    async fn hls_enabled(&self) -> Result<bool> {
        Ok(self.hls.load(Ordering::Acquire))
    }

    async fn regenerate_playlist(
        &self,
        _episode: &EpisodeId,
        tier: ResolutionTier,
    ) -> Result<Url> {
        self.regen_calls.fetch_add(1, Ordering::AcqRel);

        let gate = self.regen_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_regen.load(Ordering::Acquire) {
            return Err(Error::Backend {
                status: 500,
                url: "stub://playlist".to_string(),
            });
        }

        Ok(self
            .base
            .join(&format!("stream/playlist_{}.m3u8", tier.height()))?)
    }

    async fn fetch_subtitle(&self, _url: &Url) -> Result<String> {
        self.subtitle_calls.fetch_add(1, Ordering::AcqRel);

        let gate = self.subtitle_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.subtitle_payload.lock().unwrap().clone().ok_or(Error::Backend {
            status: 404,
            url: "stub://subtitle".to_string(),
        })
    }

    async fn fetch_danmaku(&self, _episode: &EpisodeId) -> Result<Vec<DanmakuEvent>> {
        Ok(self.danmaku.lock().unwrap().clone())
    }

    async fn touch_last_watched(&self, user_id: &str, episode: &EpisodeId) -> Result<()> {
        self.last_watched
            .lock()
            .unwrap()
            .push((user_id.to_string(), episode.clone()));
        Ok(())
    }
}

/// Scripted playlist fetcher: responses are served in push order.
#[derive(Default)]
pub struct StubFetcher {
    queue: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn push(&self, response: Result<String>) {
        self.queue.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl crate::adaptive::PlaylistFetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::PlaylistFetch(format!("no scripted response for {url}"))))
    }
}
