/// On-device collection of page data and video frames
///
/// The collector obtains whatever a live video page exposes without
/// depending on the remote service being reachable: it drives a hidden
/// page renderer, races the renderer's extraction messages against a
/// platform-specific timeout, and independently samples still frames from
/// the playable media.
pub mod frames;
pub mod page;

use crate::config::CollectorConfig;
use crate::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use frames::{ExtractedFrame, FrameExtractor};

/// Client-observed snapshot of a video page.
///
/// Created fresh per import attempt, sent once, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedPageData {
    /// Platform hydration payload item detail, when present
    pub video_detail: Option<serde_json::Value>,

    /// Legacy item-map entry (older TikTok page versions)
    pub legacy_item: Option<serde_json::Value>,

    /// Free-text caption/description
    pub caption: Option<String>,

    /// Cover image URL
    pub cover_url: Option<String>,

    /// Playable media URL
    pub media_url: Option<String>,

    /// Media duration in seconds
    pub duration_seconds: Option<f64>,

    /// Whether anything usable was found
    pub has_data: bool,
}

impl CollectedPageData {
    /// Recompute has_data from the populated fields
    pub fn finalize(mut self) -> Self {
        self.has_data = self.video_detail.is_some()
            || self.legacy_item.is_some()
            || self.caption.as_deref().map_or(false, |c| !c.trim().is_empty())
            || self.cover_url.is_some()
            || self.media_url.is_some();
        self
    }

    /// Richness score used by the best-partial accumulator: a structured
    /// payload outweighs everything, then caption, then media hints
    pub fn richness(&self) -> u32 {
        let mut score = 0;
        if self.video_detail.is_some() {
            score += 100;
        }
        if self.legacy_item.is_some() {
            score += 60;
        }
        if self.caption.as_deref().map_or(false, |c| c.len() >= page::MIN_CAPTION_LEN) {
            score += 30;
        } else if self.caption.is_some() {
            score += 5;
        }
        if self.media_url.is_some() {
            score += 10;
        }
        if self.cover_url.is_some() {
            score += 5;
        }
        if self.duration_seconds.is_some() {
            score += 5;
        }
        score
    }
}

/// Boundary to the sandboxed, non-interactive page renderer.
///
/// A renderer loads the URL and posts one CollectedPageData message per
/// extraction attempt on the returned channel; platforms that render
/// asynchronously may post several partial snapshots before the channel
/// closes. Dropping the receiver cancels the render.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, platform: Platform) -> Result<mpsc::Receiver<CollectedPageData>>;
}

/// Production renderer: fetches the page with a browser user agent and
/// runs the platform extraction script against the served document.
///
/// TikTok pages ship a hydration payload in the initial response, so one
/// attempt suffices. Instagram renders asynchronously and is polled at a
/// fixed interval, resolving early once a caption-length text block shows
/// up.
pub struct HttpRenderer {
    client: reqwest::Client,
    config: CollectorConfig,
}

impl HttpRenderer {
    pub fn new(config: CollectorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str, platform: Platform) -> Result<mpsc::Receiver<CollectedPageData>> {
        let (tx, rx) = mpsc::channel(4);
        let client = self.client.clone();
        let config = self.config.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let renderer = HttpRenderer { client, config };

            match platform {
                Platform::TikTok => match renderer.fetch(&url).await {
                    Ok(html) => {
                        let data = page::extract_tiktok(&html);
                        let _ = tx.send(data).await;
                    }
                    Err(e) => {
                        warn!("⚠️ TikTok page load failed: {}", e);
                    }
                },
                Platform::Instagram => {
                    for attempt in 0..renderer.config.poll_attempts {
                        match renderer.fetch(&url).await {
                            Ok(html) => {
                                let data = page::extract_instagram(&html);
                                let resolved = data
                                    .caption
                                    .as_deref()
                                    .map_or(false, |c| c.len() >= page::MIN_CAPTION_LEN);

                                if tx.send(data).await.is_err() {
                                    // Receiver gone: collector resolved already
                                    return;
                                }

                                if resolved {
                                    debug!("Instagram caption found on attempt {}", attempt + 1);
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!("⚠️ Instagram page load failed: {}", e);
                                return;
                            }
                        }

                        tokio::time::sleep(Duration::from_millis(renderer.config.poll_interval_ms))
                            .await;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Drives a renderer and keeps the best partial payload seen so far.
pub struct Collector {
    renderer: Arc<dyn PageRenderer>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            renderer: Arc::new(HttpRenderer::new(config.clone())),
            config,
        }
    }

    pub fn with_renderer(renderer: Arc<dyn PageRenderer>, config: CollectorConfig) -> Self {
        Self { renderer, config }
    }

    /// Collect page data for a URL, racing renderer messages against the
    /// platform timeout.
    ///
    /// Whichever of {message stream end, timeout, load error} fires first
    /// wins; the best partial payload tracked along the way is returned in
    /// every case rather than failing outright. Total absence of data is
    /// reported through `has_data = false`, never swallowed.
    pub async fn collect(&self, url: &str) -> CollectedPageData {
        let platform = Platform::detect(url);
        let timeout = match platform {
            Platform::TikTok => Duration::from_secs(self.config.tiktok_timeout_seconds),
            Platform::Instagram => Duration::from_secs(self.config.instagram_timeout_seconds),
        };

        info!("🔍 Collecting page data for {} ({})", url, platform.name());

        let mut best = CollectedPageData::default();

        let mut rx = match self.renderer.render(url, platform).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("⚠️ Renderer failed to start: {}", e);
                return best;
            }
        };

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(data) => {
                            // Running-max accumulator: every attempt updates
                            // the best partial, not only the final one
                            if data.richness() > best.richness() {
                                best = data;
                            }
                            // A structured payload is as good as it gets
                            if best.video_detail.is_some() || best.legacy_item.is_some() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut deadline => {
                    warn!("⏰ Collection timed out after {:?}, returning best partial", timeout);
                    break;
                }
            }
        }
        // Dropping rx here cancels any still-running render attempt, so a
        // late message can never double-resolve the race

        if best.has_data {
            info!("✅ Collected page data (richness {})", best.richness());
        } else {
            warn!("⚠️ No extractable data found for {}", url);
        }

        best
    }

    /// Collect page data and, when a playable media URL with a positive
    /// duration was observed, sample still frames from it
    pub async fn collect_with_frames(
        &self,
        url: &str,
        frame_config: &crate::config::FramesConfig,
    ) -> (CollectedPageData, Vec<ExtractedFrame>) {
        let data = self.collect(url).await;

        let frames = match (&data.media_url, data.duration_seconds) {
            (Some(media_url), Some(duration)) if duration > 0.0 => {
                let extractor = FrameExtractor::new(frame_config.clone());
                match extractor.extract_frames(media_url, duration).await {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!("⚠️ Frame extraction failed: {}", e);
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        (data, frames)
    }
}
