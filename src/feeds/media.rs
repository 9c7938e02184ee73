//! Representative image/video detection for feed entries.
//!
//! Works on the raw JSON form of an entry, so every lookup is an `Option`
//! and a missing or oddly shaped block only disables its own step.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

/// Extensions treated as video whatever the declared MIME type says.
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".ogg"];

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("img regex is valid")
});

static YOUTUBE_WATCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:youtube\.com/watch\?[^"'\s<>]*?\bv=|youtu\.be/)([A-Za-z0-9_-]{6,})"#)
        .expect("youtube watch regex is valid")
});

static YOUTUBE_EMBED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"youtube\.com/embed/([A-Za-z0-9_-]{6,})").expect("youtube embed regex is valid")
});

/// Media found for one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaUrls {
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

impl MediaUrls {
    fn is_complete(&self) -> bool {
        self.image_url.is_some() && self.video_url.is_some()
    }

    fn offer_image(&mut self, url: &str) {
        if self.image_url.is_none() && !url.is_empty() {
            self.image_url = Some(url.to_string());
        }
    }

    fn offer_video(&mut self, url: &str) {
        if self.video_url.is_none() && !url.is_empty() {
            self.video_url = Some(url.to_string());
        }
    }
}

/// Find a representative image and video URL for an entry.
///
/// Heuristics run in order and the first hit per field wins:
/// `media_content`, `media_thumbnail`, enclosure links, `enclosures`,
/// the first `<img>` in `content_html`, then the entry's `image`/`thumbnail`.
/// Hits are resolved against `base_url`. Without a video, YouTube watch,
/// short and embed links in the entry link or content become an embed URL.
pub fn extract_media(entry: &Value, base_url: &str, content_html: &str) -> MediaUrls {
    let mut found = MediaUrls::default();

    scan_media_content(entry, &mut found);

    if found.image_url.is_none() {
        if let Some(url) = list_field(entry, &["media_thumbnail", "mediaThumbnails"])
            .iter()
            .find_map(|thumb| str_field(thumb, &["url", "value"]))
        {
            found.offer_image(url);
        }
    }

    if !found.is_complete() {
        scan_enclosure_links(entry, &mut found);
    }

    if !found.is_complete() {
        scan_enclosures(entry, &mut found);
    }

    if found.image_url.is_none() {
        if let Some(src) = first_img_src(content_html) {
            found.offer_image(src);
        }
    }

    if found.image_url.is_none() {
        let fallback =
            nested_url(entry.get("image")).or_else(|| nested_url(entry.get("thumbnail")));
        if let Some(url) = fallback {
            found.offer_image(url);
        }
    }

    let mut media = MediaUrls {
        image_url: found.image_url.and_then(|u| resolve_url(base_url, &u)),
        video_url: found.video_url.and_then(|u| resolve_url(base_url, &u)),
    };

    if media.video_url.is_none() {
        let link = str_field(entry, &["link"]).unwrap_or_default();
        media.video_url = youtube_embed_url(&[link, content_html]);
    }

    media
}

/// Step 1: structured `media:content` blocks.
fn scan_media_content(entry: &Value, found: &mut MediaUrls) {
    for block in list_field(entry, &["media_content", "mediaContents"]) {
        let Some(url) = str_field(block, &["url", "value"]) else {
            continue;
        };
        let media_type = declared_type(block);
        if media_type.contains("image") {
            found.offer_image(url);
        }
        if media_type.contains("video") || has_video_extension(url) {
            found.offer_video(url);
        }
        if found.is_complete() {
            break;
        }
    }
}

/// Step 3: `<link rel="enclosure">` entries.
fn scan_enclosure_links(entry: &Value, found: &mut MediaUrls) {
    for link in list_field(entry, &["links"]) {
        let Some(href) = str_field(link, &["href", "url"]) else {
            continue;
        };
        let rel = str_field(link, &["rel"]).unwrap_or_default();
        if !rel.eq_ignore_ascii_case("enclosure") {
            continue;
        }
        let media_type = declared_type(link);
        if media_type.contains("image") {
            found.offer_image(href);
        } else if media_type.contains("video") || has_video_extension(href) {
            // octet-stream enclosures still count when the file is a video
            found.offer_video(href);
        }
        if found.is_complete() {
            break;
        }
    }
}

/// Step 4: a separate `enclosures` list.
fn scan_enclosures(entry: &Value, found: &mut MediaUrls) {
    for enclosure in list_field(entry, &["enclosures"]) {
        let Some(href) = str_field(enclosure, &["href", "url"]) else {
            continue;
        };
        let media_type = declared_type(enclosure);
        if media_type.contains("image") {
            found.offer_image(href);
        }
        if media_type.contains("video") || has_video_extension(href) {
            found.offer_video(href);
        }
        if found.is_complete() {
            break;
        }
    }
}

/// First non-empty string among `keys`.
fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// First array among `keys`; anything else reads as empty.
fn list_field<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| v.as_array().map(Vec::as_slice))
        .unwrap_or(&[])
}

fn declared_type(block: &Value) -> String {
    str_field(block, &["type"]).unwrap_or_default().to_lowercase()
}

/// `image`/`thumbnail` may be a bare string or an object with `href`/`url`.
fn nested_url(value: Option<&Value>) -> Option<&str> {
    match value? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()),
        other if other.is_object() => str_field(other, &["href", "url"]),
        _ => None,
    }
}

fn has_video_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn first_img_src(html: &str) -> Option<&str> {
    IMG_SRC_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Join `candidate` onto `base`. With an unusable base only absolute candidates survive.
fn resolve_url(base: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    match Url::parse(base) {
        Ok(base) => base.join(candidate).ok().map(String::from),
        Err(_) => Url::parse(candidate).ok().map(String::from),
    }
}

/// Canonical embed URL for the first YouTube video referenced in `haystacks`.
fn youtube_embed_url(haystacks: &[&str]) -> Option<String> {
    let id = haystacks
        .iter()
        .find_map(|text| YOUTUBE_WATCH_RE.captures(text))
        .or_else(|| {
            haystacks
                .iter()
                .find_map(|text| YOUTUBE_EMBED_RE.captures(text))
        })
        .and_then(|caps| caps.get(1))?;
    Some(format!("https://www.youtube.com/embed/{}", id.as_str()))
}
