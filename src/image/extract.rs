//! Parse-time image extraction.
//!
//! Runs while a feed is normalized and never touches the network. The
//! strategies below are tried in order; the first one that yields a valid
//! absolute http(s) URL wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::image::canonical::canonicalize;

static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img tag regex"));

static TAG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z0-9_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

static SRCSET_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\d+)w$").expect("valid srcset regex"));

/// Attributes tried, in order, when an `<img>` has no usable `srcset`.
const IMG_SRC_ATTRS: &[&str] = &["data-lazy-src", "data-amp-src", "data-src", "src"];

/// The parts of a feed item that can carry an image.
#[derive(Debug, Clone, Default)]
pub struct FeedItemView<'a> {
    /// Article link, used to resolve relative URLs.
    pub link: &'a str,
    /// Enclosure and media-content URLs, in document order.
    pub enclosures: Vec<&'a str>,
    /// Media-thumbnail URLs, in document order.
    pub thumbnails: Vec<&'a str>,
    /// Embedded HTML bodies (full content first, then summary).
    pub html: Vec<&'a str>,
}

type Extractor = fn(&FeedItemView<'_>) -> Option<String>;

const STRATEGIES: &[Extractor] = &[from_enclosures, from_thumbnails, from_embedded_html];

/// Cheap image discovery for one feed item.
///
/// Returns `None` when nothing usable is found; never fails.
pub fn extract_cheap(item: &FeedItemView<'_>) -> Option<String> {
    STRATEGIES
        .iter()
        .filter_map(|strategy| strategy(item))
        .find_map(|candidate| accept(&candidate))
}

fn from_enclosures(item: &FeedItemView<'_>) -> Option<String> {
    item.enclosures
        .iter()
        .find_map(|u| absolutize(u, item.link).filter(|u| is_http_url(u)))
}

fn from_thumbnails(item: &FeedItemView<'_>) -> Option<String> {
    item.thumbnails
        .iter()
        .find_map(|u| absolutize(u, item.link).filter(|u| is_http_url(u)))
}

fn from_embedded_html(item: &FeedItemView<'_>) -> Option<String> {
    item.html
        .iter()
        .find_map(|html| first_image_in_html(html, item.link))
}

/// The image of the first `<img>` tag in an HTML fragment.
///
/// A `srcset` wins over the plain source attributes; its widest candidate
/// is used.
pub fn first_image_in_html(html: &str, base: &str) -> Option<String> {
    let tag = IMG_TAG.find(html)?.as_str();
    let attrs = tag_attributes(tag);

    if let Some(best) = attr(&attrs, "srcset").and_then(|set| widest_candidate(set)) {
        if let Some(url) = absolutize(&best, base) {
            return Some(url);
        }
    }

    IMG_SRC_ATTRS
        .iter()
        .filter_map(|name| attr(&attrs, name))
        .find_map(|value| absolutize(value, base))
}

/// Parse the attributes of a single tag into lowercase-name/value pairs.
pub(crate) fn tag_attributes(tag: &str) -> Vec<(String, String)> {
    TAG_ATTR
        .captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))?
                .as_str()
                .trim()
                .to_string();
            Some((name, value))
        })
        .collect()
}

pub(crate) fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, v)| n == name && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

/// Candidates of a `srcset`, widest first. Entries without a width
/// descriptor count as width 0 and keep their relative order.
pub(crate) fn srcset_candidates(srcset: &str) -> Vec<String> {
    let mut parts: Vec<(String, u32)> = srcset
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| match SRCSET_WIDTH.captures(p) {
            Some(caps) => Some((caps[1].to_string(), caps[2].parse().unwrap_or(0))),
            None => p.split_whitespace().next().map(|u| (u.to_string(), 0)),
        })
        .collect();
    parts.sort_by(|a, b| b.1.cmp(&a.1));
    parts.into_iter().map(|(url, _)| url).collect()
}

fn widest_candidate(srcset: &str) -> Option<String> {
    srcset_candidates(srcset).into_iter().next()
}

/// Resolve a possibly relative URL against `base`.
///
/// `data:` and `blob:` URLs are rejected, protocol-relative URLs get https.
pub(crate) fn absolutize(candidate: &str, base: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    let lower = candidate.to_ascii_lowercase();
    if lower.starts_with("data:") || lower.starts_with("blob:") {
        return None;
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(candidate.to_string());
    }
    if candidate.starts_with("//") {
        return Some(format!("https:{}", candidate));
    }
    let base = url::Url::parse(base).ok()?;
    base.join(candidate).ok().map(|u| u.to_string())
}

/// Whether `u` parses as an absolute http(s) URL with a host.
pub(crate) fn is_http_url(u: &str) -> bool {
    url::Url::parse(u)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Final acceptance: canonicalize and re-check validity.
pub(crate) fn accept(candidate: &str) -> Option<String> {
    if !is_http_url(candidate) {
        return None;
    }
    let canonical = canonicalize(candidate);
    is_http_url(&canonical).then_some(canonical)
}
