/// Per-platform page signal extraction
///
/// This is the native rendition of the script a hidden renderer would
/// inject after each page load: it walks the served document for platform
/// hydration payloads, meta tags, JSON-LD, and playable media elements,
/// and produces a single CollectedPageData snapshot per attempt.
use super::CollectedPageData;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Captions shorter than this are treated as page chrome, not content.
/// Instagram polling resolves early only once a caption-length text block
/// appears in the rendered document.
pub const MIN_CAPTION_LEN: usize = 20;

/// Try an ordered list of field names against a loosely-typed JSON map,
/// returning the first non-empty string. Payload schemas vary by version,
/// so the probe list is data, not branching logic.
pub fn probe_str(value: &Value, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(s) = value.get(name).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Numeric sibling of probe_str; accepts numbers and numeric strings
pub fn probe_f64(value: &Value, names: &[&str]) -> Option<f64> {
    for name in names {
        match value.get(name) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.parse::<f64>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract everything usable from a TikTok video page
pub fn extract_tiktok(html: &str) -> CollectedPageData {
    let document = Html::parse_document(html);
    let mut data = CollectedPageData::default();

    // Method 1: hydration payload (fast path; present on full pages)
    if let Some(payload) = extract_script_json(&document, "__UNIVERSAL_DATA_FOR_REHYDRATION__") {
        if let Some(item) = payload
            .pointer("/__DEFAULT_SCOPE__/webapp.video-detail/itemInfo/itemStruct")
            .cloned()
        {
            debug!("Found hydration payload item struct");
            apply_item_struct(&mut data, &item);
            data.video_detail = Some(item);
        }
    }

    // Method 2: legacy state blob (older page versions)
    if data.video_detail.is_none() {
        if let Some(state) = extract_script_json(&document, "SIGI_STATE") {
            if let Some(items) = state.get("ItemModule").and_then(Value::as_object) {
                if let Some((_, item)) = items.iter().next() {
                    debug!("Found legacy item module entry");
                    apply_item_struct(&mut data, item);
                    data.legacy_item = Some(item.clone());
                }
            }
        }
    }

    // Method 3: meta tags contribute independently
    apply_meta_tags(&mut data, &document);

    // Method 4: JSON-LD block
    apply_json_ld(&mut data, &document);

    // Method 5: any playable media element
    if data.media_url.is_none() {
        data.media_url = extract_video_element_src(&document);
    }

    data.finalize()
}

/// Extract everything usable from an Instagram reel page.
///
/// Instagram renders asynchronously: early fetches serve a shell whose
/// meta description carries only engagement counts. Callers poll and use
/// MIN_CAPTION_LEN to decide when real content has arrived.
pub fn extract_instagram(html: &str) -> CollectedPageData {
    let document = Html::parse_document(html);
    let mut data = CollectedPageData::default();

    apply_meta_tags(&mut data, &document);

    // Instagram og:description wraps the caption in quotes after the
    // engagement summary: `12K likes - user on January 1: "caption"`
    if let Some(caption) = data.caption.take() {
        data.caption = Some(unwrap_quoted_caption(&caption));
    }

    apply_json_ld(&mut data, &document);

    if data.media_url.is_none() {
        data.media_url = extract_video_element_src(&document);
    }

    data.finalize()
}

/// Populate page data from a TikTok item struct (hydration or legacy)
fn apply_item_struct(data: &mut CollectedPageData, item: &Value) {
    if data.caption.is_none() {
        data.caption = probe_str(item, &["desc", "description"]);
    }

    if let Some(video) = item.get("video") {
        if data.cover_url.is_none() {
            data.cover_url = probe_str(video, &["cover", "originCover", "dynamicCover"]);
        }
        if data.media_url.is_none() {
            data.media_url = probe_str(video, &["playAddr", "downloadAddr"]);
        }
        if data.duration_seconds.is_none() {
            data.duration_seconds = probe_f64(video, &["duration"]);
        }
    }
}

/// Pull a JSON payload out of a `<script id="...">` block
fn extract_script_json(document: &Html, script_id: &str) -> Option<Value> {
    let selector = Selector::parse(&format!("script#{}", script_id)).ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();
    serde_json::from_str(raw.trim()).ok()
}

fn apply_meta_tags(data: &mut CollectedPageData, document: &Html) {
    if data.caption.is_none() {
        data.caption = extract_meta_content(document, "og:description")
            .or_else(|| extract_meta_content(document, "description"));
    }
    if data.cover_url.is_none() {
        data.cover_url = extract_meta_content(document, "og:image");
    }
    if data.media_url.is_none() {
        data.media_url = extract_meta_content(document, "og:video")
            .or_else(|| extract_meta_content(document, "og:video:url"));
    }
    if data.duration_seconds.is_none() {
        data.duration_seconds =
            extract_meta_content(document, "og:video:duration").and_then(|v| v.parse().ok());
    }
}

fn extract_meta_content(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!(
        r#"meta[property="{p}"], meta[name="{p}"]"#,
        p = property
    ))
    .ok()?;

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(String::from)
}

fn apply_json_ld(data: &mut CollectedPageData, document: &Html) {
    let selector = match Selector::parse(r#"script[type="application/ld+json"]"#) {
        Ok(selector) => selector,
        Err(_) => return,
    };

    for element in document.select(&selector) {
        let raw: String = element.text().collect();
        let parsed: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(_) => continue,
        };

        if data.caption.is_none() {
            data.caption = probe_str(&parsed, &["description", "caption", "name"]);
        }
        if data.cover_url.is_none() {
            data.cover_url = probe_str(&parsed, &["thumbnailUrl", "image"]);
        }
        if data.media_url.is_none() {
            data.media_url = probe_str(&parsed, &["contentUrl", "embedUrl"]);
        }
        if data.duration_seconds.is_none() {
            data.duration_seconds = parsed
                .get("duration")
                .and_then(Value::as_str)
                .and_then(parse_iso8601_duration);
        }
    }
}

fn extract_video_element_src(document: &Html) -> Option<String> {
    let selector = Selector::parse("video[src]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("src"))
        .map(String::from)
}

/// Parse ISO-8601 durations like "PT1M15S" into seconds
fn parse_iso8601_duration(value: &str) -> Option<f64> {
    let re = Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?$").ok()?;
    let caps = re.captures(value.trim())?;

    let hours: f64 = caps.get(1).map_or(0.0, |m| m.as_str().parse().unwrap_or(0.0));
    let minutes: f64 = caps.get(2).map_or(0.0, |m| m.as_str().parse().unwrap_or(0.0));
    let seconds: f64 = caps.get(3).map_or(0.0, |m| m.as_str().parse().unwrap_or(0.0));

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    if total > 0.0 {
        Some(total)
    } else {
        None
    }
}

fn unwrap_quoted_caption(description: &str) -> String {
    // Prefer the quoted segment when the description is an engagement
    // summary wrapper; otherwise keep the whole text
    if let Some(start) = description.find(": \"") {
        let quoted = &description[start + 3..];
        if let Some(end) = quoted.rfind('"') {
            let inner = quoted[..end].trim();
            if !inner.is_empty() {
                return inner.to_string();
            }
        }
    }
    description.trim().to_string()
}
