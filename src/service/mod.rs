/// Remote scrape-and-parse service
///
/// One entry point, `ProcessService::process`, takes an extraction request
/// and drives the whole server-side pipeline: URL validation, short-link
/// resolution, result-cache lookup, scraping, signal merging, inference
/// path routing, and result caching. Every internal failure is caught at
/// the top so a client always receives a well-formed response.
pub mod cache;
pub mod router;
pub mod scrape;

use crate::config::Config;
use crate::inference::{InferredExercise, VisionModel};
use crate::platform::{self, Platform};
use crate::request::ProcessRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub use cache::TtlCache;
pub use router::{InferencePath, PathRouter};
pub use scrape::{ScrapedData, Scraper, StickerText};

/// Pipeline failure taxonomy. Only the variant decides what the client
/// sees; internal detail stays in the logs.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("short link resolution failed: {0}")]
    ShortLink(String),

    #[error("no usable content found on the video page")]
    NoSignal,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Signals from client collection and server scraping, merged with client
/// data taking precedence field by field
#[derive(Debug, Clone, Default)]
pub struct MergedSignals {
    pub caption: Option<String>,
    pub cover_urls: Vec<String>,
    pub media_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub stickers: Vec<StickerText>,
}

impl MergedSignals {
    /// Nothing here for the model to work with
    pub fn is_empty(&self) -> bool {
        self.caption.as_deref().map_or(true, |c| c.trim().is_empty())
            && self.cover_urls.is_empty()
            && self.stickers.is_empty()
    }
}

/// Merge client-collected page data over scraped data.
///
/// The client saw the logged-in, fully rendered page, so its fields win;
/// scraped values only fill the holes. Stickers come from whichever item
/// struct is available, client first.
pub fn merge_signals(client: Option<&crate::collector::CollectedPageData>, scraped: &ScrapedData) -> MergedSignals {
    let mut merged = MergedSignals {
        caption: scraped.caption.clone(),
        cover_urls: scraped.cover_urls.clone(),
        media_url: scraped.media_url.clone(),
        duration_seconds: scraped.duration_seconds,
        stickers: scraped.stickers.clone(),
    };

    if let Some(client) = client {
        if client.caption.as_deref().map_or(false, |c| !c.trim().is_empty()) {
            merged.caption = client.caption.clone();
        }
        if let Some(cover) = &client.cover_url {
            if !merged.cover_urls.contains(cover) {
                merged.cover_urls.insert(0, cover.clone());
            }
        }
        if client.media_url.is_some() {
            merged.media_url = client.media_url.clone();
        }
        if client.duration_seconds.is_some() {
            merged.duration_seconds = client.duration_seconds;
        }

        if let Some(item) = client.video_detail.as_ref().or(client.legacy_item.as_ref()) {
            let client_stickers = scrape::extract_stickers(item);
            if !client_stickers.is_empty() {
                merged.stickers = client_stickers;
            }
        }
    }

    merged
}

/// Final pipeline outcome returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub success: bool,
    pub workout_name: Option<String>,
    pub exercises: Vec<InferredExercise>,
    pub error: Option<String>,
    pub path: Option<InferencePath>,
    pub cached: bool,

    /// Model-reported extraction confidence in [0, 1]; 0.0 on failure,
    /// 0.5 when the model omitted it
    pub confidence: f32,

    /// When the pipeline actually ran; a cache hit keeps the original
    pub processed_at: DateTime<Utc>,
}

impl ProcessResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            workout_name: None,
            exercises: Vec::new(),
            error: Some(message.into()),
            path: None,
            cached: false,
            confidence: 0.0,
            processed_at: Utc::now(),
        }
    }
}

/// The scrape-and-parse pipeline with its two process-lifetime caches
pub struct ProcessService {
    config: Config,
    client: reqwest::Client,
    scraper: Scraper,
    path_router: PathRouter,
    model: Arc<dyn VisionModel>,
    result_cache: Mutex<TtlCache<String, ProcessResult>>,
}

impl ProcessService {
    pub fn new(config: Config, model: Arc<dyn VisionModel>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scraping.request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let html_cache = Arc::new(Mutex::new(TtlCache::new(Duration::from_secs(
            config.scraping.html_cache_ttl_seconds,
        ))));
        let result_cache = Mutex::new(TtlCache::new(Duration::from_secs(
            config.scraping.result_cache_ttl_seconds,
        )));

        Self {
            scraper: Scraper::new(config.scraping.clone(), html_cache),
            path_router: PathRouter::new(config.router.clone()),
            client,
            model,
            result_cache,
            config,
        }
    }

    /// Process one extraction request.
    ///
    /// This is the single top-level catch: any error below maps to a
    /// well-formed failure result. No-signal failures keep their specific
    /// message; everything else collapses to a generic, retryable one so
    /// internals never leak to clients.
    pub async fn process(&self, request: ProcessRequest) -> ProcessResult {
        match self.process_inner(&request).await {
            Ok(result) => result,
            Err(ProcessError::NoSignal) => {
                warn!("⚠️ No usable signals for {}", request.video_url);
                ProcessResult::failure(
                    "We couldn't find any workout content on that video page.",
                )
            }
            Err(ProcessError::InvalidUrl(detail)) => {
                warn!("⚠️ Rejected URL {}: {}", request.video_url, detail);
                ProcessResult::failure("That link doesn't look like a supported video URL.")
            }
            Err(e) => {
                error!("❌ Processing failed for {}: {}", request.video_url, e);
                ProcessResult::failure(
                    "Something went wrong while processing the video. Please try again.",
                )
            }
        }
    }

    async fn process_inner(&self, request: &ProcessRequest) -> Result<ProcessResult, ProcessError> {
        let url = self.validate_url(&request.video_url)?;

        // Short links redirect to the canonical URL; all caching and
        // content-ID logic runs on the resolved form
        let url = if platform::is_short_link(&url) {
            let resolved = self.resolve_short_link(&url).await?;
            info!("🔍 Resolved short link to {}", resolved);
            resolved
        } else {
            url
        };

        let detected = request.platform.unwrap_or_else(|| Platform::detect(&url));
        let cache_key = match platform::content_id(&url, detected) {
            Some(id) => format!("{}:{}", detected.name(), id),
            None => url.clone(),
        };

        if let Some(mut hit) = self.cached_result(&cache_key) {
            info!("💾 Result cache hit for {}", cache_key);
            hit.cached = true;
            return Ok(hit);
        }

        // A usable client payload means the page walk already happened on
        // the fully rendered, logged-in page; the server scrapes only when
        // the client came up empty
        let client_data = request.client_extracted_data.as_ref();
        let client_has_data = client_data.map_or(false, |d| d.has_data);

        let scraped = if client_has_data {
            ScrapedData::default()
        } else {
            self.scrape_page(&url, detected).await
        };

        let mut signals = merge_signals(client_data, &scraped);

        // A client payload that parsed to nothing usable still gets the
        // live scrape before the request is declared hopeless
        if signals.is_empty() && client_has_data {
            let scraped = self.scrape_page(&url, detected).await;
            signals = merge_signals(client_data, &scraped);
        }

        let frames = request.decoded_frames();

        // Refuse to burn an inference call on nothing
        if signals.is_empty() && frames.is_empty() {
            return Err(ProcessError::NoSignal);
        }

        let path = router::select_path(
            &signals,
            frames.len(),
            &self.config.router,
            &self.config.relevance,
        );

        let workout = self
            .path_router
            .run(self.model.as_ref(), &signals, &frames, path)
            .await
            .map_err(|e| ProcessError::Inference(e.to_string()))?;

        let result = ProcessResult {
            success: true,
            workout_name: workout.workout_name,
            exercises: workout.exercises,
            error: None,
            path: Some(path),
            cached: false,
            confidence: workout
                .confidence
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(0.5),
            processed_at: Utc::now(),
        };

        if let Ok(mut cache) = self.result_cache.lock() {
            cache.insert(cache_key, result.clone());
        }

        info!(
            "✅ Processed {} via {} path ({} exercises)",
            url,
            path.name(),
            result.exercises.len()
        );
        Ok(result)
    }

    /// Scrape a page, degrading to empty data on failure; the merger and
    /// the no-signal guard decide what that means for the request
    async fn scrape_page(&self, url: &str, platform: Platform) -> ScrapedData {
        match self.scraper.scrape(url, platform).await {
            Ok(scraped) => scraped,
            Err(e) => {
                warn!("⚠️ Scrape failed for {}: {}", url, e);
                ScrapedData::default()
            }
        }
    }

    fn validate_url(&self, raw: &str) -> Result<String, ProcessError> {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| ProcessError::InvalidUrl(e.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed.to_string()),
            other => Err(ProcessError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }

    /// Follow redirects with a HEAD request and take the final URL
    async fn resolve_short_link(&self, url: &str) -> Result<String, ProcessError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ProcessError::ShortLink(e.to_string()))?;

        Ok(response.url().to_string())
    }

    /// Whether the configured vision model answers its availability probe
    pub async fn model_available(&self) -> bool {
        self.model.is_available().await
    }

    fn cached_result(&self, key: &str) -> Option<ProcessResult> {
        self.result_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectedPageData;

    fn scraped_with(caption: Option<&str>, covers: &[&str]) -> ScrapedData {
        ScrapedData {
            caption: caption.map(String::from),
            cover_urls: covers.iter().map(|c| c.to_string()).collect(),
            media_url: None,
            duration_seconds: None,
            stickers: Vec::new(),
        }
    }

    #[test]
    fn test_merge_client_fields_win() {
        let client = CollectedPageData {
            caption: Some("client caption".to_string()),
            cover_url: Some("https://cdn.example/client.jpg".to_string()),
            duration_seconds: Some(42.0),
            ..Default::default()
        }
        .finalize();

        let scraped = scraped_with(Some("scraped caption"), &["https://cdn.example/scraped.jpg"]);
        let merged = merge_signals(Some(&client), &scraped);

        assert_eq!(merged.caption.as_deref(), Some("client caption"));
        assert_eq!(merged.cover_urls[0], "https://cdn.example/client.jpg");
        assert_eq!(merged.cover_urls.len(), 2);
        assert_eq!(merged.duration_seconds, Some(42.0));
    }

    #[test]
    fn test_merge_scraped_fills_holes() {
        let client = CollectedPageData {
            cover_url: Some("https://cdn.example/client.jpg".to_string()),
            ..Default::default()
        }
        .finalize();

        let scraped = scraped_with(Some("scraped caption"), &[]);
        let merged = merge_signals(Some(&client), &scraped);

        assert_eq!(merged.caption.as_deref(), Some("scraped caption"));
        assert!(!merged.is_empty());
    }

    #[test]
    fn test_merge_client_stickers_replace_scraped() {
        let client = CollectedPageData {
            video_detail: Some(serde_json::json!({
                "stickersOnItem": [{"stickerText": ["Squat 5x5"]}]
            })),
            ..Default::default()
        }
        .finalize();

        let mut scraped = scraped_with(None, &[]);
        scraped.stickers.push(StickerText {
            text: "old overlay".to_string(),
            start_seconds: None,
            end_seconds: None,
        });

        let merged = merge_signals(Some(&client), &scraped);
        assert_eq!(merged.stickers.len(), 1);
        assert_eq!(merged.stickers[0].text, "Squat 5x5");
    }

    #[test]
    fn test_empty_merge_detected() {
        let merged = merge_signals(None, &ScrapedData::default());
        assert!(merged.is_empty());

        let merged = merge_signals(None, &scraped_with(Some("  "), &[]));
        assert!(merged.is_empty());
    }
}
