/// Platform detection and URL identity for shared short-form video links
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Source platform for a shared video link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    TikTok,
    Instagram,
}

impl Platform {
    /// Detect the platform from a URL by substring match on known domains.
    ///
    /// Pure and total: ambiguous or unknown URLs default to TikTok. An
    /// explicit platform field on a request always takes precedence over
    /// this detection.
    pub fn detect(url: &str) -> Platform {
        let lower = url.to_lowercase();
        if lower.contains("instagram.com") || lower.contains("instagr.am") {
            Platform::Instagram
        } else {
            Platform::TikTok
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::TikTok => "tiktok",
            Platform::Instagram => "instagram",
        }
    }
}

/// Check whether a URL is a shortened share link that must be resolved
/// to its canonical form before any content-ID or caching logic runs
pub fn is_short_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("vm.tiktok.com")
        || lower.contains("vt.tiktok.com")
        || lower.contains("tiktok.com/t/")
}

/// Extract the platform-specific content identifier from a canonical URL.
///
/// The identifier keys both the raw-HTML cache and the result cache.
/// Returns None when the URL carries no recognizable content path.
pub fn content_id(url: &str, platform: Platform) -> Option<String> {
    match platform {
        Platform::TikTok => {
            // /video/{digits} or /photo/{digits}
            let re = Regex::new(r"/(?:video|photo)/(\d+)").ok()?;
            re.captures(url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        }
        Platform::Instagram => {
            // /reel/{code}, /p/{code}, /tv/{code}
            let re = Regex::new(r"/(?:reel|reels|p|tv)/([A-Za-z0-9_-]+)").ok()?;
            re.captures(url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        }
    }
}
