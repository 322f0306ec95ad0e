/// Still-frame sampling from the playable video media
///
/// Frames are decoded sequentially (not in parallel) to bound peak memory,
/// and every temporary artifact is deleted immediately after read-back on
/// every exit path via tempfile's scoped cleanup.
use crate::config::FramesConfig;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single still image sampled from the source video
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub data: Vec<u8>,
    pub media_type: String,
}

/// Compute evenly spaced sample timestamps for a clip.
///
/// The count is clamp(ceil(duration / seconds_per_frame), min, max);
/// timestamps divide the clip into count+1 intervals so no sample lands
/// on the very first or very last instant.
pub fn sample_timestamps(duration_seconds: f64, config: &FramesConfig) -> Vec<f64> {
    if duration_seconds <= 0.0 {
        return Vec::new();
    }

    let wanted = (duration_seconds / config.seconds_per_frame as f64).ceil() as u32;
    let count = wanted.clamp(config.min_frames, config.max_frames);

    let step = duration_seconds / (count + 1) as f64;
    (1..=count).map(|i| step * i as f64).collect()
}

/// Extracts size-bounded stills from a video URL via ffmpeg
pub struct FrameExtractor {
    client: reqwest::Client,
    config: FramesConfig,
}

impl FrameExtractor {
    pub fn new(config: FramesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    /// Download the media and sample stills at the computed timestamps.
    ///
    /// A single frame failure is logged and skipped; it never aborts the
    /// batch. Frames exceeding the size ceiling are dropped, not retried.
    pub async fn extract_frames(
        &self,
        media_url: &str,
        duration_seconds: f64,
    ) -> Result<Vec<ExtractedFrame>> {
        let timestamps = sample_timestamps(duration_seconds, &self.config);
        if timestamps.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "🎞️ Sampling {} frames across {:.1}s of video",
            timestamps.len(),
            duration_seconds
        );

        // The downloaded media lives in a named temp file that is removed
        // when this function returns, success or not
        let media_file = tempfile::Builder::new()
            .prefix("import-media-")
            .suffix(".mp4")
            .tempfile()?;

        let bytes = self
            .client
            .get(media_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(media_file.path(), &bytes).await?;
        debug!("Downloaded {} bytes of media", bytes.len());

        let mut frames = Vec::new();
        for (i, timestamp) in timestamps.iter().enumerate() {
            match self.extract_still(media_file.path(), *timestamp).await {
                Ok(data) => {
                    frames.extend(self.accept_frame(i, *timestamp, data));
                }
                Err(e) => {
                    warn!("⚠️ Frame {} at {:.1}s failed: {}", i, timestamp, e);
                }
            }
        }

        info!("✅ Extracted {}/{} frames", frames.len(), timestamps.len());
        Ok(frames)
    }

    /// Admit a decoded still into the batch, or drop it when its encoded
    /// size exceeds the ceiling. Oversized frames are never retried.
    fn accept_frame(&self, index: usize, timestamp: f64, data: Vec<u8>) -> Option<ExtractedFrame> {
        if data.len() > self.config.max_frame_bytes {
            warn!(
                "⚠️ Dropping frame {} at {:.1}s: {} bytes exceeds ceiling {}",
                index,
                timestamp,
                data.len(),
                self.config.max_frame_bytes
            );
            return None;
        }

        Some(ExtractedFrame {
            data,
            media_type: "image/jpeg".to_string(),
        })
    }

    /// Decode one still at a timestamp; the decoded artifact is deleted
    /// immediately after read-back regardless of outcome
    async fn extract_still(&self, media_path: &Path, timestamp: f64) -> Result<Vec<u8>> {
        let still_file = tempfile::Builder::new()
            .prefix("import-frame-")
            .suffix(".jpg")
            .tempfile()?;

        let timestamp_str = format!("{:.2}", timestamp);
        let media_arg = media_path
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 media path"))?;
        let still_arg = still_file
            .path()
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 frame path"))?;

        let output = tokio::process::Command::new("ffmpeg")
            .args([
                "-ss", &timestamp_str,
                "-i", media_arg,
                "-frames:v", "1",
                "-q:v", "2",
                "-y",
                still_arg,
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(anyhow!("ffmpeg exited with {}", output.status));
        }

        let data = tokio::fs::read(still_file.path()).await?;
        if data.is_empty() {
            return Err(anyhow!("ffmpeg produced an empty frame"));
        }

        Ok(data)
        // still_file drops here, deleting the decoded artifact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FramesConfig {
        FramesConfig {
            seconds_per_frame: 5,
            min_frames: 4,
            max_frames: 10,
            max_frame_bytes: 900_000,
        }
    }

    #[test]
    fn test_sample_count_clamped() {
        // ceil(45/5) = 9 -> within bounds
        assert_eq!(sample_timestamps(45.0, &config()).len(), 9);
        // ceil(8/5) = 2 -> clamped up to 4
        assert_eq!(sample_timestamps(8.0, &config()).len(), 4);
        // ceil(600/5) = 120 -> clamped down to 10
        assert_eq!(sample_timestamps(600.0, &config()).len(), 10);
        // Non-positive durations yield nothing
        assert!(sample_timestamps(0.0, &config()).is_empty());
        assert!(sample_timestamps(-3.0, &config()).is_empty());
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let extractor = FrameExtractor::new(FramesConfig {
            max_frame_bytes: 1_000,
            ..config()
        });

        assert!(extractor
            .accept_frame(0, 2.5, vec![0xFF; 1_001])
            .is_none());

        let kept = extractor.accept_frame(1, 5.0, vec![0xFF; 1_000]).unwrap();
        assert_eq!(kept.data.len(), 1_000);
        assert_eq!(kept.media_type, "image/jpeg");
    }

    #[test]
    fn test_samples_evenly_spaced_within_clip() {
        let duration = 50.0;
        let timestamps = sample_timestamps(duration, &config());

        assert!(timestamps.first().copied().unwrap() > 0.0);
        assert!(timestamps.last().copied().unwrap() < duration);

        let step = timestamps[1] - timestamps[0];
        for window in timestamps.windows(2) {
            assert!((window[1] - window[0] - step).abs() < 1e-9);
        }
    }
}
