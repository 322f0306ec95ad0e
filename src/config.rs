use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::inference::ModelConfig;

/// Configuration for the workout importer
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP API settings
    pub server: ServerConfig,

    /// On-device collection settings
    pub collector: CollectorConfig,

    /// Video frame sampling settings
    pub frames: FramesConfig,

    /// Server-side scraping and cache settings
    pub scraping: ScrapingConfig,

    /// Sticker-text workout relevance heuristic
    pub relevance: RelevanceConfig,

    /// Inference path routing settings
    pub router: RouterConfig,

    /// Vision/text model settings
    pub inference: ModelConfig,

    /// Exercise catalog matching settings
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the HTTP API
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Timeout for TikTok page collection (seconds)
    pub tiktok_timeout_seconds: u64,

    /// Timeout for Instagram page collection (seconds)
    pub instagram_timeout_seconds: u64,

    /// Maximum DOM polling attempts for asynchronously rendered pages
    pub poll_attempts: u32,

    /// Interval between polling attempts (milliseconds)
    pub poll_interval_ms: u64,

    /// Per-fetch HTTP timeout (seconds)
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesConfig {
    /// One frame is targeted per this many seconds of video
    pub seconds_per_frame: u32,

    /// Lower bound on sampled frames per video
    pub min_frames: u32,

    /// Upper bound on sampled frames per video
    pub max_frames: u32,

    /// Frames whose encoded size exceeds this are dropped, not retried
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Per-request HTTP timeout (seconds)
    pub request_timeout_seconds: u64,

    /// TTL for the raw-HTML cache (seconds)
    pub html_cache_ttl_seconds: u64,

    /// TTL for the final-result cache (seconds)
    pub result_cache_ttl_seconds: u64,

    /// A response body must exceed this size to count as a full page
    pub min_full_page_bytes: usize,

    /// Maximum sequential bot user-agent attempts
    pub max_bot_attempts: u32,

    /// Pool of bot-identifying user agents, drawn at random without repeats
    pub bot_user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    /// Minimum distinct keyword hits for sticker text to count as a workout
    pub min_keyword_hits: usize,

    /// Domain keywords; matched case-insensitively as substrings
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum raw sticker count for the fast (text-only) path
    pub fast_path_min_stickers: usize,

    /// Minimum usable client frames for the frames path
    pub frames_path_min_frames: usize,

    /// Maximum cover images downloaded for the fallback path
    pub max_cover_images: usize,

    /// Per-image size cap for cover downloads (bytes)
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Jaro-Winkler similarity floor for a fuzzy catalog match
    pub fuzzy_threshold: f32,

    /// Maximum candidates returned by catalog search
    pub search_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            tiktok_timeout_seconds: 15,
            instagram_timeout_seconds: 20,
            poll_attempts: 20,
            poll_interval_ms: 500,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            seconds_per_frame: 5,
            min_frames: 4,
            max_frames: 10,
            max_frame_bytes: 900_000,
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 12,
            html_cache_ttl_seconds: 600,
            result_cache_ttl_seconds: 900,
            min_full_page_bytes: 50_000,
            max_bot_attempts: 2,
            bot_user_agents: vec![
                "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)".to_string(),
                "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)".to_string(),
                "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)".to_string(),
                "Mozilla/5.0 (compatible; Yahoo! Slurp; http://help.yahoo.com/help/us/ysearch/slurp)".to_string(),
                "Twitterbot/1.0".to_string(),
            ],
        }
    }
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            min_keyword_hits: 2,
            // No keyword may be a substring of another: substring matching
            // would let one word score several distinct hits
            keywords: vec![
                "workout", "exercise", "reps", "sets", "superset",
                "squat", "deadlift", "bench", "press", "curl", "row", "lunge",
                "pushup", "push-up", "pullup", "pull-up", "chin-up", "dip",
                "raise", "extension", "fly", "shrug", "thruster",
                "hip thrust", "rdl", "ohp", "plank", "crunch", "leg day",
                "push day", "pull day", "upper body", "lower body", "glutes",
                "hamstring", "quads", "biceps", "triceps", "shoulders", "lats",
                "warm up", "warmup", "dropset", "amrap", "to failure",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fast_path_min_stickers: 5,
            frames_path_min_frames: 3,
            max_cover_images: 3,
            max_image_bytes: 1_000_000,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            search_limit: 10,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "workout-importer.toml",
            "config/workout-importer.toml",
            "~/.config/workout-importer/config.toml",
            "/etc/workout-importer/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        // Fall back to defaults with environment overrides
        Self::from_env()
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("WORKOUT_IMPORTER_PORT") {
            config.server.port = port.parse().unwrap_or(config.server.port);
        }

        if let Ok(api_key) = std::env::var("WORKOUT_IMPORTER_API_KEY") {
            config.inference.api_key = Some(api_key);
        }

        if let Ok(model) = std::env::var("WORKOUT_IMPORTER_MODEL") {
            config.inference.model = model;
        }

        if let Ok(endpoint) = std::env::var("WORKOUT_IMPORTER_ENDPOINT") {
            config.inference.endpoint = Some(endpoint);
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.frames.min_frames == 0 || self.frames.max_frames < self.frames.min_frames {
            return Err(anyhow!("frame bounds must satisfy 0 < min_frames <= max_frames"));
        }

        if self.frames.seconds_per_frame == 0 {
            return Err(anyhow!("seconds_per_frame must be greater than 0"));
        }

        if self.scraping.bot_user_agents.is_empty() {
            return Err(anyhow!("bot_user_agents pool must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.matcher.fuzzy_threshold) {
            return Err(anyhow!("fuzzy_threshold must be within [0, 1]"));
        }

        if self.router.max_cover_images == 0 {
            return Err(anyhow!("max_cover_images must be greater than 0"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Workout Importer Configuration:\n\
            - Port: {}\n\
            - Inference Provider: {:?}\n\
            - Frame bounds: {}..={} (1 per {}s)\n\
            - Result cache TTL: {}s\n\
            - Fuzzy threshold: {}",
            self.server.port,
            self.inference.provider,
            self.frames.min_frames,
            self.frames.max_frames,
            self.frames.seconds_per_frame,
            self.scraping.result_cache_ttl_seconds,
            self.matcher.fuzzy_threshold,
        )
    }
}
