/// Server-side page scraping with anti-blocking fallbacks
///
/// Platforms serve stripped shell pages to unrecognized clients. The
/// scraper escalates through request identities until a full page shows
/// up: cached HTML first, then the public embed endpoint, then a bounded
/// number of crawler user agents drawn at random from a pool. The biggest
/// body seen is kept as a running max so even a stripped page contributes
/// whatever it carries.
use crate::collector::page::{self, probe_f64, probe_str};
use crate::collector::CollectedPageData;
use crate::config::{RelevanceConfig, ScrapingConfig};
use crate::platform::{self, Platform};
use crate::service::cache::TtlCache;
use anyhow::{anyhow, Result};
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// On-screen text overlay with its display window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickerText {
    pub text: String,
    pub start_seconds: Option<f64>,
    pub end_seconds: Option<f64>,
}

/// Everything the scraper recovered from a video page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedData {
    pub caption: Option<String>,
    pub cover_urls: Vec<String>,
    pub media_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub stickers: Vec<StickerText>,
}

impl ScrapedData {
    pub fn is_empty(&self) -> bool {
        self.caption.as_deref().map_or(true, |c| c.trim().is_empty())
            && self.cover_urls.is_empty()
            && self.stickers.is_empty()
    }
}

/// Whether a text block reads like workout content.
///
/// Two distinct keyword hits qualify, as does a single sets-by-reps
/// pattern such as "3x12" or "4 × 8".
pub fn is_workout_relevant(text: &str, config: &RelevanceConfig) -> bool {
    let lower = text.to_lowercase();
    let hits = config
        .keywords
        .iter()
        .filter(|keyword| lower.contains(keyword.as_str()))
        .count();

    if hits >= config.min_keyword_hits {
        return true;
    }

    Regex::new(r"\d+\s*[xX×]\s*\d+")
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Cache key for raw HTML: the platform content ID when one parses, so
/// `?lang=` and `@user` spelling variants of one video share an entry
pub(crate) fn html_cache_key(url: &str, platform: Platform) -> String {
    platform::content_id(url, platform)
        .map(|id| format!("{}:{}", platform.name(), id))
        .unwrap_or_else(|| url.to_string())
}

/// Escalating page scraper with a shared raw-HTML cache
pub struct Scraper {
    client: reqwest::Client,
    config: ScrapingConfig,
    html_cache: Arc<Mutex<TtlCache<String, String>>>,
}

impl Scraper {
    pub fn new(config: ScrapingConfig, html_cache: Arc<Mutex<TtlCache<String, String>>>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config,
            html_cache,
        }
    }

    /// Scrape a video page, working through the fallback cascade.
    ///
    /// Full pages are written to the HTML cache under the content ID so
    /// spelling variants of the same video share one entry; stripped pages
    /// are never cached so a later attempt can still improve on them.
    pub async fn scrape(&self, url: &str, platform: Platform) -> Result<ScrapedData> {
        let cache_key = html_cache_key(url, platform);

        if let Some(cached) = self.cached_html(&cache_key) {
            info!("💾 HTML cache hit for {}", cache_key);
            return Ok(self.extract(&cached, platform));
        }

        let html = self.fetch_page(url, platform, &cache_key).await?;
        Ok(self.extract(&html, platform))
    }

    fn cached_html(&self, key: &str) -> Option<String> {
        self.html_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key.to_string()))
    }

    /// A full page is big enough to carry real content and ships a
    /// hydration payload; stripped shells fail one or both tests
    fn is_full_page(&self, html: &str) -> bool {
        html.len() > self.config.min_full_page_bytes
            && (html.contains("__UNIVERSAL_DATA_FOR_REHYDRATION__")
                || html.contains("SIGI_STATE"))
    }

    async fn fetch_page(&self, url: &str, platform: Platform, cache_key: &str) -> Result<String> {
        // Running max over body size: every attempt may improve on the
        // best page seen, even when none passes the full-page test
        let mut best_html = String::new();

        for (label, attempt_url, user_agent) in self.attempt_plan(url, platform) {
            debug!("🔍 Scrape attempt '{}' for {}", label, url);

            match self.fetch_as(&attempt_url, &user_agent).await {
                Ok(html) => {
                    if self.is_full_page(&html) {
                        info!("✅ Full page via '{}' ({} bytes)", label, html.len());
                        if let Ok(mut cache) = self.html_cache.lock() {
                            cache.insert(cache_key.to_string(), html.clone());
                        }
                        return Ok(html);
                    }

                    debug!("Attempt '{}' served {} bytes (stripped)", label, html.len());
                    if html.len() > best_html.len() {
                        best_html = html;
                    }
                }
                Err(e) => {
                    warn!("⚠️ Scrape attempt '{}' failed: {}", label, e);
                }
            }
        }

        if best_html.is_empty() {
            return Err(anyhow!("all scrape attempts failed for {}", url));
        }

        warn!(
            "⚠️ No full page obtained for {}, using biggest body ({} bytes)",
            url,
            best_html.len()
        );
        Ok(best_html)
    }

    /// Ordered attempt list: embed endpoint first where one exists, then
    /// randomly drawn, non-repeating crawler user agents
    fn attempt_plan(&self, url: &str, platform: Platform) -> Vec<(String, String, String)> {
        let browser_ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
             AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36"
            .to_string();

        let mut attempts = vec![("direct".to_string(), url.to_string(), browser_ua)];

        if platform == Platform::TikTok {
            if let Some(id) = platform::content_id(url, platform) {
                attempts.push((
                    "embed".to_string(),
                    format!("https://www.tiktok.com/embed/v2/{}", id),
                    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
                     (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1"
                        .to_string(),
                ));
            }
        }

        let mut pool = self.config.bot_user_agents.clone();
        pool.shuffle(&mut rand::thread_rng());
        for (i, user_agent) in pool
            .into_iter()
            .take(self.config.max_bot_attempts as usize)
            .enumerate()
        {
            attempts.push((format!("bot-{}", i + 1), url.to_string(), user_agent));
        }

        attempts
    }

    async fn fetch_as(&self, url: &str, user_agent: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }

    /// Run the platform extraction over served HTML and lift the result
    /// into scraped data, stickers included
    fn extract(&self, html: &str, platform: Platform) -> ScrapedData {
        let page_data = match platform {
            Platform::TikTok => page::extract_tiktok(html),
            Platform::Instagram => page::extract_instagram(html),
        };

        let stickers = page_data
            .video_detail
            .as_ref()
            .or(page_data.legacy_item.as_ref())
            .map(extract_stickers)
            .unwrap_or_default();

        scraped_from_page(page_data, stickers)
    }
}

fn scraped_from_page(data: CollectedPageData, stickers: Vec<StickerText>) -> ScrapedData {
    ScrapedData {
        caption: data.caption,
        cover_urls: data.cover_url.into_iter().collect(),
        media_url: data.media_url,
        duration_seconds: data.duration_seconds,
        stickers,
    }
}

/// Pull sticker overlays out of a TikTok item struct.
///
/// Field names are probed speculatively since overlay schemas shift
/// between page versions; a sticker with no recoverable text is skipped.
pub fn extract_stickers(item: &Value) -> Vec<StickerText> {
    let Some(entries) = item.get("stickersOnItem").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut stickers = Vec::new();
    for entry in entries {
        let text = match entry.get("stickerText").and_then(Value::as_array) {
            Some(lines) => {
                let joined = lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("\n");
                if joined.trim().is_empty() {
                    None
                } else {
                    Some(joined)
                }
            }
            None => probe_str(entry, &["text", "content"]),
        };

        let Some(text) = text else { continue };

        stickers.push(StickerText {
            text,
            start_seconds: probe_f64(entry, &["startTime", "start", "startTimestamp"]),
            end_seconds: probe_f64(entry, &["endTime", "end", "endTimestamp"]),
        });
    }

    debug!("Extracted {} sticker overlays", stickers.len());
    stickers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relevance() -> RelevanceConfig {
        RelevanceConfig::default()
    }

    #[test]
    fn test_relevance_by_keyword_hits() {
        assert!(is_workout_relevant("leg day: squat and lunge", &relevance()));
        assert!(!is_workout_relevant("my trip to the beach", &relevance()));
        // One keyword alone is not enough
        assert!(!is_workout_relevant("nice squat form", &relevance()));
    }

    #[test]
    fn test_single_word_cannot_double_count_hits() {
        // "reps" must not clear the two-hit bar by also matching a
        // substring keyword
        assert!(!is_workout_relevant("reps", &relevance()));
        assert!(!is_workout_relevant("superset", &relevance()));
        assert!(!is_workout_relevant("counting reps today", &relevance()));
    }

    #[test]
    fn test_relevance_by_sets_pattern() {
        assert!(is_workout_relevant("bulgarian split 3x12", &relevance()));
        assert!(is_workout_relevant("incline press 4 × 8", &relevance()));
        assert!(!is_workout_relevant("see you at 3 pm", &relevance()));
    }

    #[test]
    fn test_sticker_extraction_line_array() {
        let item = serde_json::json!({
            "stickersOnItem": [
                {"stickerText": ["Squat", "3x12"], "startTime": 1.5, "endTime": 6.0},
                {"text": "RDL 3x10"},
                {"stickerText": []},
            ]
        });

        let stickers = extract_stickers(&item);
        assert_eq!(stickers.len(), 2);
        assert_eq!(stickers[0].text, "Squat\n3x12");
        assert_eq!(stickers[0].start_seconds, Some(1.5));
        assert_eq!(stickers[1].text, "RDL 3x10");
        assert_eq!(stickers[1].start_seconds, None);
    }

    #[test]
    fn test_attempt_plan_bounded_and_distinct() {
        let config = ScrapingConfig::default();
        let cache = Arc::new(Mutex::new(TtlCache::new(Duration::from_secs(60))));
        let scraper = Scraper::new(config.clone(), cache);

        let plan = scraper.attempt_plan(
            "https://www.tiktok.com/@user/video/7312345678901234567",
            Platform::TikTok,
        );

        // direct + embed + max_bot_attempts
        assert_eq!(plan.len(), 2 + config.max_bot_attempts as usize);
        assert!(plan[1].1.starts_with("https://www.tiktok.com/embed/v2/"));

        let bot_uas: Vec<&String> = plan[2..].iter().map(|(_, _, ua)| ua).collect();
        assert_eq!(
            bot_uas.len(),
            bot_uas
                .iter()
                .collect::<std::collections::HashSet<_>>()
                .len()
        );
    }

    #[test]
    fn test_html_cache_key_canonicalizes_spellings() {
        let a = html_cache_key(
            "https://www.tiktok.com/@coach/video/7312345678901234567",
            Platform::TikTok,
        );
        let b = html_cache_key(
            "https://www.tiktok.com/@mirror/video/7312345678901234567?lang=en",
            Platform::TikTok,
        );
        assert_eq!(a, "tiktok:7312345678901234567");
        assert_eq!(a, b);

        // No recognizable content path falls back to the URL itself
        let c = html_cache_key("https://www.tiktok.com/@coach", Platform::TikTok);
        assert_eq!(c, "https://www.tiktok.com/@coach");
    }

    #[test]
    fn test_full_page_heuristic() {
        let config = ScrapingConfig {
            min_full_page_bytes: 100,
            ..Default::default()
        };
        let cache = Arc::new(Mutex::new(TtlCache::new(Duration::from_secs(60))));
        let scraper = Scraper::new(config, cache);

        let big_hydrated = format!(
            "{}<script id=\"__UNIVERSAL_DATA_FOR_REHYDRATION__\"></script>",
            "x".repeat(200)
        );
        let big_shell = "x".repeat(200);
        let small_hydrated = "<script id=\"SIGI_STATE\"></script>";

        assert!(scraper.is_full_page(&big_hydrated));
        assert!(!scraper.is_full_page(&big_shell));
        assert!(!scraper.is_full_page(small_hydrated));
    }
}
