/// Inference path routing
///
/// Three ways to feed the vision model, in strict priority order: sticker
/// text alone when the overlays already read like a workout (fast), client
/// frames when enough arrived (frames), and cover-image downloads as the
/// last resort (fallback). Selection is a pure function of the merged
/// signals so the same input always routes the same way.
use super::MergedSignals;
use crate::config::{RelevanceConfig, RouterConfig};
use crate::inference::{InferenceImage, InferredWorkout, VisionModel};
use crate::service::scrape::is_workout_relevant;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which evidence reaches the vision model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferencePath {
    /// Sticker text only, no images
    Fast,
    /// Client-sampled video frames
    Frames,
    /// Server-downloaded cover images
    Fallback,
}

impl InferencePath {
    pub fn name(&self) -> &'static str {
        match self {
            InferencePath::Fast => "fast",
            InferencePath::Frames => "frames",
            InferencePath::Fallback => "fallback",
        }
    }
}

/// Pick the inference path for a merged signal set.
///
/// Fast wins when the sticker count clears the bar AND the combined
/// overlay text is workout-relevant; a pile of irrelevant overlays must
/// not starve the model of images.
pub fn select_path(
    signals: &MergedSignals,
    frame_count: usize,
    router: &RouterConfig,
    relevance: &RelevanceConfig,
) -> InferencePath {
    if signals.stickers.len() >= router.fast_path_min_stickers {
        let combined = signals
            .stickers
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if is_workout_relevant(&combined, relevance) {
            return InferencePath::Fast;
        }
        debug!(
            "{} stickers present but not workout-relevant, skipping fast path",
            signals.stickers.len()
        );
    }

    if frame_count >= router.frames_path_min_frames {
        return InferencePath::Frames;
    }

    InferencePath::Fallback
}

/// Flatten the merged signals into the prompt text: caption first, then
/// each overlay with its display window when one is known
pub fn compose_prompt_text(signals: &MergedSignals) -> String {
    let mut parts = Vec::new();

    if let Some(caption) = &signals.caption {
        if !caption.trim().is_empty() {
            parts.push(format!("Caption: {}", caption.trim()));
        }
    }

    if !signals.stickers.is_empty() {
        parts.push("On-screen text:".to_string());
        for sticker in &signals.stickers {
            match (sticker.start_seconds, sticker.end_seconds) {
                (Some(start), Some(end)) => {
                    parts.push(format!("[{:.0}s-{:.0}s] {}", start, end, sticker.text));
                }
                _ => parts.push(sticker.text.clone()),
            }
        }
    }

    parts.join("\n")
}

/// Executes the selected path against a vision model
pub struct PathRouter {
    client: reqwest::Client,
    config: RouterConfig,
}

impl PathRouter {
    pub fn new(config: RouterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    /// Run inference over the chosen evidence set
    pub async fn run(
        &self,
        model: &dyn VisionModel,
        signals: &MergedSignals,
        frames: &[Vec<u8>],
        path: InferencePath,
    ) -> Result<InferredWorkout> {
        let text = compose_prompt_text(signals);

        let images = match path {
            InferencePath::Fast => Vec::new(),
            InferencePath::Frames => frames
                .iter()
                .map(|data| InferenceImage {
                    data: data.clone(),
                    media_type: "image/jpeg".to_string(),
                })
                .collect(),
            InferencePath::Fallback => self.download_covers(&signals.cover_urls).await,
        };

        info!(
            "🔍 Inference via {} path ({} images, {} chars of text)",
            path.name(),
            images.len(),
            text.len()
        );

        model.infer_workout(&text, &images).await
    }

    /// Download cover images concurrently, deduplicated and bounded.
    ///
    /// A single failed or oversized download is logged and dropped; it
    /// never fails the batch. Inference proceeds with whatever survives,
    /// text-only included.
    async fn download_covers(&self, urls: &[String]) -> Vec<InferenceImage> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = urls
            .iter()
            .filter(|url| seen.insert(url.as_str()))
            .take(self.config.max_cover_images)
            .collect();

        let downloads = unique.iter().map(|url| self.download_cover(url));
        let results = futures::future::join_all(downloads).await;

        let mut images = Vec::new();
        for (url, result) in unique.iter().zip(results) {
            match result {
                Ok(image) => images.push(image),
                Err(e) => warn!("⚠️ Cover download failed for {}: {}", url, e),
            }
        }

        info!("Downloaded {}/{} cover images", images.len(), unique.len());
        images
    }

    async fn download_cover(&self, url: &str) -> Result<InferenceImage> {
        let response = self
            .client
            .get(url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
            )
            .header("Accept", "image/avif,image/webp,image/*,*/*;q=0.8")
            .header("Referer", "https://www.tiktok.com/")
            .send()
            .await?
            .error_for_status()?;

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let data = response.bytes().await?.to_vec();
        if data.len() > self.config.max_image_bytes {
            anyhow::bail!(
                "cover image {} bytes exceeds ceiling {}",
                data.len(),
                self.config.max_image_bytes
            );
        }

        Ok(InferenceImage { data, media_type })
    }
}
