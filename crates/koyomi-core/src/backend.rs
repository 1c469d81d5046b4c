//! Backend catalog/streaming API client
//!
//! Everything the core consumes from the surrounding application's backend
//! goes through the [`Backend`] trait: episode metadata, the streaming-mode
//! flag, playlist regeneration, overlay payloads and the last-watched
//! bookkeeping call. [`HttpBackend`] is the reqwest implementation against
//! the real API; tests substitute their own.

use crate::error::{Error, Result};
use crate::types::{DanmakuEvent, EpisodeId, EpisodeInfo, ResolutionTier};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Backend API consumed by the playback core.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch episode metadata from the catalog.
    async fn episode_info(&self, episode: &EpisodeId) -> Result<EpisodeInfo>;

    /// Whether the backend serves adaptive HLS for this deployment.
    async fn hls_enabled(&self) -> Result<bool>;

    /// Regenerate the playlist for an episode at a tier.
    ///
    /// Idempotent on the backend side. The returned URL is loadable only
    /// after this call completes.
    async fn regenerate_playlist(&self, episode: &EpisodeId, tier: ResolutionTier) -> Result<Url>;

    /// Fetch a raw subtitle payload.
    async fn fetch_subtitle(&self, url: &Url) -> Result<String>;

    /// Fetch the ordered danmaku feed for an episode.
    async fn fetch_danmaku(&self, episode: &EpisodeId) -> Result<Vec<DanmakuEvent>>;

    /// Record the viewer's last-watched episode. Bookkeeping only; callers
    /// treat failures as non-events.
    async fn touch_last_watched(&self, user_id: &str, episode: &EpisodeId) -> Result<()>;
}

#[derive(Deserialize)]
struct HlsEnabledResponse {
    hls_enabled: bool,
}

#[derive(Deserialize)]
struct DanmakuResponse {
    danmakus: Vec<DanmakuEvent>,
}

/// HTTP implementation of [`Backend`] against the catalog API.
pub struct HttpBackend {
    base: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self {
            base,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn with_client(base: Url, client: reqwest::Client) -> Self {
        Self { base, client }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get_checked(&self, url: Url) -> Result<reqwest::Response> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Backend {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self))]
    async fn episode_info(&self, episode: &EpisodeId) -> Result<EpisodeInfo> {
        let url = self.endpoint(&format!("api/bangumi/episode/{episode}"))?;
        let info = self.get_checked(url).await?.json::<EpisodeInfo>().await?;
        debug!(file = %info.file_name, subtitles = info.subtitles.len(), "Episode info fetched");
        Ok(info)
    }

    #[instrument(skip(self))]
    async fn hls_enabled(&self) -> Result<bool> {
        let url = self.endpoint("api/hls/enabled")?;
        let body = self
            .get_checked(url)
            .await?
            .json::<HlsEnabledResponse>()
            .await?;
        Ok(body.hls_enabled)
    }

    #[instrument(skip(self))]
    async fn regenerate_playlist(
        &self,
        episode: &EpisodeId,
        tier: ResolutionTier,
    ) -> Result<Url> {
        let url = self.endpoint(&format!("api/playlist/{episode}"))?;
        let response = self.client.post(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Backend {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        debug!(%episode, %tier, "Playlist regenerated");
        self.endpoint(&format!("stream/playlist_{}.m3u8", tier.height()))
    }

    #[instrument(skip(self))]
    async fn fetch_subtitle(&self, url: &Url) -> Result<String> {
        Ok(self.get_checked(url.clone()).await?.text().await?)
    }

    #[instrument(skip(self))]
    async fn fetch_danmaku(&self, episode: &EpisodeId) -> Result<Vec<DanmakuEvent>> {
        let url = self.endpoint(&format!("api/bangumi/danmaku/{episode}"))?;
        let body = self
            .get_checked(url)
            .await?
            .json::<DanmakuResponse>()
            .await?;
        debug!(%episode, count = body.danmakus.len(), "Danmaku feed fetched");
        Ok(body.danmakus)
    }

    #[instrument(skip(self))]
    async fn touch_last_watched(&self, user_id: &str, episode: &EpisodeId) -> Result<()> {
        let url = self.endpoint("api/last_watched")?;
        let response = self
            .client
            .put(url.clone())
            .json(&serde_json::json!({
                "user_id": user_id,
                "last_watched_episode_id": episode,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Backend {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}
