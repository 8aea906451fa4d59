use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::post::LinkPreview;
use crate::infra::cache::RedisCache;
use crate::infra::fetch::PageFetcher;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 300;
const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp", ".avif",
];

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("no url in text")]
    NoUrl,
    #[error("url points at an image file")]
    ImageLink,
    #[error("page fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),
    #[error("page has no title")]
    NoTitle,
}

/// Best-effort link unfurling. Never fails: every error becomes `None`.
#[derive(Clone)]
pub struct LinkPreviewResolver {
    fetcher: Arc<dyn PageFetcher>,
    cache: Option<RedisCache>,
    cache_ttl_seconds: u64,
}

impl LinkPreviewResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            cache: None,
            cache_ttl_seconds: 0,
        }
    }

    pub fn with_cache(mut self, cache: RedisCache, ttl_seconds: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl_seconds = ttl_seconds;
        self
    }

    pub async fn resolve(&self, text: &str) -> Option<LinkPreview> {
        match self.try_resolve(text).await {
            Ok(preview) => Some(preview),
            Err(PreviewError::NoUrl) | Err(PreviewError::ImageLink) => None,
            Err(err) => {
                debug!(error = %err, "link preview unavailable");
                None
            }
        }
    }

    pub async fn try_resolve(&self, text: &str) -> Result<LinkPreview, PreviewError> {
        let url = extract_first_url(text).ok_or(PreviewError::NoUrl)?;
        if is_image_url(&url) {
            return Err(PreviewError::ImageLink);
        }

        let cache_key = cache_key(&url);
        if let Some(cache) = &self.cache {
            if let Some(preview) = cache.get_json::<LinkPreview>(&cache_key).await {
                return Ok(preview);
            }
        }

        let html = self.fetcher.fetch(&url).await.map_err(PreviewError::Fetch)?;
        let preview = parse_metadata(&html, &url).ok_or(PreviewError::NoTitle)?;

        if let Some(cache) = &self.cache {
            cache
                .set_json(&cache_key, &preview, self.cache_ttl_seconds)
                .await;
        }
        Ok(preview)
    }
}

fn cache_key(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    format!("preview:{}", hex::encode(hasher.finalize()))
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)\bhttps?://[^\s<>"']+"#).expect("valid url pattern"))
}

/// Byte ranges of every http(s) URL in `text`, trailing punctuation excluded.
pub fn url_spans(text: &str) -> Vec<Range<usize>> {
    url_pattern()
        .find_iter(text)
        .map(|m| {
            let candidate = m.as_str();
            let trimmed = trim_trailing_punctuation(candidate);
            m.start()..m.start() + trimmed.len()
        })
        .filter(|span| Url::parse(&text[span.clone()]).is_ok())
        .collect()
}

fn trim_trailing_punctuation(candidate: &str) -> &str {
    let mut end = candidate.len();
    loop {
        let Some(last) = candidate[..end].chars().last() else {
            break;
        };
        let unbalanced_paren = last == ')'
            && candidate[..end].matches(')').count() > candidate[..end].matches('(').count();
        if matches!(last, '.' | ',' | ';' | ':' | '!' | '?') || unbalanced_paren {
            end -= last.len_utf8();
        } else {
            break;
        }
    }
    &candidate[..end]
}

pub fn extract_first_url(text: &str) -> Option<Url> {
    let span = url_spans(text).into_iter().next()?;
    Url::parse(&text[span]).ok()
}

pub fn is_image_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn meta_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("valid meta pattern"))
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)([a-zA-Z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid attribute pattern")
    })
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title pattern"))
}

/// Pulls `<title>` and Open Graph / Twitter meta tags out of a page. A page
/// without any usable title yields `None`.
pub fn parse_metadata(html: &str, page_url: &Url) -> Option<LinkPreview> {
    let mut meta: HashMap<String, String> = HashMap::new();
    for tag in meta_tag_pattern().find_iter(html) {
        let mut key = None;
        let mut content = None;
        for attr in attribute_pattern().captures_iter(tag.as_str()) {
            let name = attr[1].to_ascii_lowercase();
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map(|v| v.as_str())
                .unwrap_or_default();
            match name.as_str() {
                "property" | "name" => key = Some(value.to_ascii_lowercase()),
                "content" => content = Some(value.to_string()),
                _ => {}
            }
        }
        if let (Some(key), Some(content)) = (key, content) {
            meta.entry(key).or_insert(content);
        }
    }

    let pick = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| meta.get(*key))
            .map(|value| clean_text(value))
            .find(|value| !value.is_empty())
    };

    let title = pick(&["og:title", "twitter:title"]).or_else(|| {
        title_pattern()
            .captures(html)
            .map(|c| clean_text(&c[1]))
            .filter(|t| !t.is_empty())
    })?;
    let description = pick(&["og:description", "description", "twitter:description"]);
    let image = pick(&["og:image", "og:image:url", "twitter:image"])
        .and_then(|src| page_url.join(&src).ok())
        .filter(|src| matches!(src.scheme(), "http" | "https"))
        .map(|src| src.to_string());

    Some(LinkPreview {
        url: page_url.to_string(),
        title: truncate_chars(&title, MAX_TITLE_CHARS),
        description: description.map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS)),
        image,
    })
}

fn clean_text(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
