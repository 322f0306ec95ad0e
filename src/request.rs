/// Extraction request contract between the collector and the service
use crate::collector::{CollectedPageData, ExtractedFrame};
use crate::platform::Platform;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One JSON body carrying everything the client obtained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// The shared video link as pasted by the user
    #[serde(rename = "videoUrl")]
    pub video_url: String,

    /// Explicit platform; takes precedence over URL detection
    #[serde(default)]
    pub platform: Option<Platform>,

    /// Page data the client collected on-device, when any
    #[serde(rename = "clientExtractedData", default)]
    pub client_extracted_data: Option<CollectedPageData>,

    /// Base64-encoded still frames sampled from the video
    #[serde(rename = "videoFrames", default)]
    pub video_frames: Vec<String>,
}

impl ProcessRequest {
    /// Package collector output into a request.
    ///
    /// Frames are base64-encoded for the JSON body; the platform is fixed
    /// here from URL detection so the server does not re-guess it.
    pub fn build(url: &str, collected: CollectedPageData, frames: &[ExtractedFrame]) -> Self {
        let platform = Platform::detect(url);
        let video_frames = frames
            .iter()
            .map(|frame| BASE64.encode(&frame.data))
            .collect();

        Self {
            video_url: url.to_string(),
            platform: Some(platform),
            client_extracted_data: if collected.has_data {
                Some(collected)
            } else {
                None
            },
            video_frames,
        }
    }

    /// Effective platform: the explicit field when present, detection otherwise
    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(|| Platform::detect(&self.video_url))
    }

    /// Decode the base64 frame payloads, silently dropping corrupt entries
    pub fn decoded_frames(&self) -> Vec<Vec<u8>> {
        self.video_frames
            .iter()
            .filter_map(|encoded| BASE64.decode(encoded).ok())
            .collect()
    }
}
