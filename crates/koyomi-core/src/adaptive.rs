//! HLS playlist client for adaptive sources
//!
//! Fetches and parses the playlist behind an adaptive [`StreamDescriptor`],
//! picks the variant matching the descriptor's resolution tier, and reports
//! content duration for VOD playlists. Segment scheduling and decoding stay
//! with the platform surface; this module only decides which playlist URL
//! the surface should be attached to.

use crate::error::{Error, Result};
use crate::types::{ResolutionTier, StreamDescriptor};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Fetches raw playlist text.
///
/// Split from the parsing so fault handling can be exercised without a
/// network; [`HttpFetcher`] is the production implementation.
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// reqwest-backed playlist fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlaylistFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::PlaylistFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PlaylistFetch(format!("status {status} for {url}")));
        }

        response
            .text()
            .await
            .map_err(|e| Error::PlaylistFetch(e.to_string()))
    }
}

/// One variant advertised by a master playlist
#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub url: Url,
    pub bandwidth: u64,
    pub height: Option<u32>,
}

/// A live adaptive source: the parsed playlist plus the variant the surface
/// is attached to.
#[derive(Debug)]
pub struct AdaptiveStream {
    playlist_url: Url,
    active: VariantInfo,
    variants: Vec<VariantInfo>,
    duration: Option<f64>,
}

impl AdaptiveStream {
    /// Fetch and resolve the playlist behind `descriptor`.
    ///
    /// A master playlist is resolved to the variant matching the
    /// descriptor's tier (then to its media playlist for duration); a media
    /// playlist entry point is its own single variant.
    #[instrument(skip(fetcher, descriptor), fields(url = %descriptor.url, tier = %descriptor.tier))]
    pub async fn open(
        fetcher: &dyn PlaylistFetcher,
        descriptor: &StreamDescriptor,
    ) -> Result<Self> {
        let content = fetcher.fetch(&descriptor.url).await?;

        if content.contains("#EXT-X-STREAM-INF") {
            let variants = parse_master(&content, &descriptor.url)?;
            let active = select_variant(&variants, descriptor.tier)?.clone();

            let media = fetcher.fetch(&active.url).await?;
            let duration = parse_media_duration(&media)?;

            debug!(
                variants = variants.len(),
                active = %active.url,
                ?duration,
                "Master playlist resolved"
            );

            Ok(Self {
                playlist_url: descriptor.url.clone(),
                active,
                variants,
                duration,
            })
        } else {
            let duration = parse_media_duration(&content)?;

            Ok(Self {
                playlist_url: descriptor.url.clone(),
                active: VariantInfo {
                    url: descriptor.url.clone(),
                    bandwidth: 0,
                    height: Some(descriptor.tier.height()),
                },
                variants: Vec::new(),
                duration,
            })
        }
    }

    /// URL the surface should be attached to.
    pub fn active_url(&self) -> &Url {
        &self.active.url
    }

    /// Entry-point playlist URL.
    pub fn playlist_url(&self) -> &Url {
        &self.playlist_url
    }

    /// Content duration for VOD playlists; `None` while live or unknown.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Variants advertised by the master playlist, lowest bandwidth first.
    pub fn variants(&self) -> &[VariantInfo] {
        &self.variants
    }
}

/// Extract variants from a master playlist, sorted by bandwidth.
fn parse_master(content: &str, base: &Url) -> Result<Vec<VariantInfo>> {
    let parsed = m3u8_rs::parse_master_playlist_res(content.as_bytes())
        .map_err(|e| Error::PlaylistParse(format!("master playlist: {e:?}")))?;

    let mut variants = Vec::with_capacity(parsed.variants.len());
    for variant in &parsed.variants {
        let url = base
            .join(&variant.uri)
            .map_err(|e| Error::PlaylistParse(format!("variant uri '{}': {e}", variant.uri)))?;

        variants.push(VariantInfo {
            url,
            bandwidth: variant.bandwidth,
            height: variant.resolution.map(|r| r.height as u32),
        });
    }

    variants.sort_by_key(|v| v.bandwidth);
    Ok(variants)
}

/// Sum segment durations for VOD media playlists.
fn parse_media_duration(content: &str) -> Result<Option<f64>> {
    let parsed = m3u8_rs::parse_media_playlist_res(content.as_bytes())
        .map_err(|e| Error::PlaylistParse(format!("media playlist: {e:?}")))?;

    if parsed.end_list {
        let total: f32 = parsed.segments.iter().map(|s| s.duration).sum();
        Ok(Some(f64::from(total)))
    } else {
        Ok(None)
    }
}

/// Pick the variant for a tier: exact height match, else the highest
/// variant not above the tier, else the lowest one available.
fn select_variant(variants: &[VariantInfo], tier: ResolutionTier) -> Result<&VariantInfo> {
    if variants.is_empty() {
        return Err(Error::NoVariantForTier(tier));
    }

    if let Some(exact) = variants
        .iter()
        .find(|v| v.height == Some(tier.height()))
    {
        return Ok(exact);
    }

    variants
        .iter()
        .filter(|v| v.height.is_some_and(|h| h <= tier.height()))
        .max_by_key(|v| (v.height, v.bandwidth))
        .or_else(|| variants.iter().min_by_key(|v| (v.height, v.bandwidth)))
        .ok_or(Error::NoVariantForTier(tier))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=854x480\n\
playlist_480.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n\
playlist_720.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
playlist_1080.m3u8\n";

    const MEDIA_VOD: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:6\n\
#EXTINF:6.0,\n\
seg0.ts\n\
#EXTINF:6.0,\n\
seg1.ts\n\
#EXTINF:4.5,\n\
seg2.ts\n\
#EXT-X-ENDLIST\n";

    fn base() -> Url {
        Url::parse("http://media.local/stream/").unwrap()
    }

    #[test]
    fn test_parse_master_variants() {
        let variants = parse_master(MASTER, &base()).unwrap();
        assert_eq!(variants.len(), 3);
        // Sorted by bandwidth
        assert_eq!(variants[0].height, Some(480));
        assert_eq!(variants[2].height, Some(1080));
        assert_eq!(
            variants[1].url.as_str(),
            "http://media.local/stream/playlist_720.m3u8"
        );
    }

    #[test]
    fn test_select_variant_exact() {
        let variants = parse_master(MASTER, &base()).unwrap();
        let picked = select_variant(&variants, ResolutionTier::P720).unwrap();
        assert_eq!(picked.height, Some(720));
    }

    #[test]
    fn test_select_variant_caps_at_tier() {
        let variants = vec![
            VariantInfo {
                url: base().join("a.m3u8").unwrap(),
                bandwidth: 800_000,
                height: Some(360),
            },
            VariantInfo {
                url: base().join("b.m3u8").unwrap(),
                bandwidth: 5_000_000,
                height: Some(1080),
            },
        ];

        // No 720 variant: the highest one not above the tier wins
        let picked = select_variant(&variants, ResolutionTier::P720).unwrap();
        assert_eq!(picked.height, Some(360));
    }

    #[test]
    fn test_select_variant_empty() {
        let err = select_variant(&[], ResolutionTier::P480).unwrap_err();
        assert!(matches!(err, Error::NoVariantForTier(ResolutionTier::P480)));
    }

    #[test]
    fn test_media_playlist_duration() {
        let duration = parse_media_duration(MEDIA_VOD).unwrap();
        assert_eq!(duration, Some(16.5));
    }

    #[test]
    fn test_live_playlist_has_no_duration() {
        let live = MEDIA_VOD.replace("#EXT-X-ENDLIST\n", "");
        assert_eq!(parse_media_duration(&live).unwrap(), None);
    }
}
