//! Page-scrape image enrichment.
//!
//! Fetches an article's HTML and pattern-matches it for a representative
//! image. Used only for a bounded subset of articles per request.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ImagesConfig;
use crate::image::extract::{absolutize, accept, attr, srcset_candidates, tag_attributes};
use crate::net::{build_client, read_body_limited, validate_url};
use crate::{NewsdeskError, Result};

static META_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid meta regex"));

static LINK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("valid link regex"));

static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img regex"));

static JSON_LD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<script\b[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#,
    )
    .expect("valid json-ld regex")
});

static SVG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.svg($|\?)").expect("valid svg regex"));

/// Meta tags probed in order: (attribute holding the key, key).
const META_KEYS: &[(&str, &str)] = &[
    ("property", "og:image:secure_url"),
    ("property", "og:image:url"),
    ("property", "og:image"),
    ("name", "og:image"),
    ("name", "twitter:image:src"),
    ("name", "twitter:image"),
    ("name", "thumbnail"),
    ("name", "parsely-image-url"),
];

/// Fields that can hold the URL inside a JSON-LD image object.
const JSON_LD_URL_FIELDS: &[&str] = &["url", "contentUrl", "@id", "src", "image"];

type PageStrategy = fn(&str, &str) -> Option<String>;

const PAGE_STRATEGIES: &[PageStrategy] = &[from_meta_tags, from_json_ld, from_raw_images];

/// Two-tier image resolver. The cheap tier is the pure
/// [`extract_cheap`](crate::image::extract_cheap); this type owns the
/// network-bound tier.
pub struct ImageResolver {
    client: Client,
    config: ImagesConfig,
    allow_private_hosts: bool,
}

impl ImageResolver {
    /// Create a resolver.
    pub fn new(config: ImagesConfig, user_agent: &str, allow_private_hosts: bool) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.slow_page_timeout_ms);
        Ok(Self {
            client: build_client(user_agent, connect_timeout)?,
            config,
            allow_private_hosts,
        })
    }

    /// Resolver settings.
    pub fn config(&self) -> &ImagesConfig {
        &self.config
    }

    /// Find an image by fetching the article page.
    ///
    /// Any failure, including the timeout, yields `None`.
    pub async fn resolve_from_page(&self, article_url: &str) -> Option<String> {
        let timeout = self.config.page_timeout_for(article_url);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(timeout, self.fetch_page(article_url)).await {
            Ok(result) => result,
            Err(_) => Err(NewsdeskError::ImageFetch(format!(
                "timed out after {} ms",
                timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(html) => {
                let found = scan_page_html(&html, article_url);
                debug!(
                    url = %article_url,
                    found = found.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scanned article page for image"
                );
                found
            }
            Err(e) => {
                debug!(url = %article_url, error = %e, "Page image lookup failed");
                None
            }
        }
    }

    async fn fetch_page(&self, article_url: &str) -> Result<String> {
        let url = validate_url(article_url, self.allow_private_hosts)
            .map_err(|e| NewsdeskError::ImageFetch(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.1")
            .send()
            .await
            .map_err(|e| NewsdeskError::ImageFetch(format!("failed to fetch page: {}", e)))?;

        if !response.status().is_success() {
            return Err(NewsdeskError::ImageFetch(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let bytes = read_body_limited(response, self.config.max_page_size_bytes)
            .await
            .map_err(|e| NewsdeskError::ImageFetch(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Search raw article HTML for a representative image.
///
/// Order: Open Graph/Twitter-style meta tags, JSON-LD `image` /
/// `primaryImageOfPage`, then the widest `srcset` candidate or the first
/// plain image. SVGs never match.
pub fn scan_page_html(html: &str, article_url: &str) -> Option<String> {
    PAGE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(html, article_url))
}

/// Resolve, canonicalize and filter a candidate found on the page.
fn page_candidate(raw: &str, article_url: &str) -> Option<String> {
    let absolute = absolutize(raw, article_url)?;
    accept(&absolute).filter(|u| !SVG.is_match(u))
}

fn from_meta_tags(html: &str, article_url: &str) -> Option<String> {
    let metas: Vec<Vec<(String, String)>> = META_TAG
        .find_iter(html)
        .map(|m| tag_attributes(m.as_str()))
        .collect();

    let from_meta = META_KEYS.iter().find_map(|(key_attr, key)| {
        metas
            .iter()
            .filter(|attrs| attr(attrs, key_attr).is_some_and(|v| v.eq_ignore_ascii_case(key)))
            .filter_map(|attrs| attr(attrs, "content"))
            .find_map(|content| page_candidate(content, article_url))
    });
    if from_meta.is_some() {
        return from_meta;
    }

    LINK_TAG
        .find_iter(html)
        .map(|m| tag_attributes(m.as_str()))
        .filter(|attrs| attr(attrs, "rel").is_some_and(|v| v.eq_ignore_ascii_case("image_src")))
        .filter_map(|attrs| attr(&attrs, "href").map(str::to_string))
        .find_map(|href| page_candidate(&href, article_url))
}

fn from_json_ld(html: &str, article_url: &str) -> Option<String> {
    JSON_LD
        .captures_iter(html)
        .filter_map(|caps| serde_json::from_str::<Value>(caps[1].trim()).ok())
        .find_map(|json| image_from_ld_node(&json, article_url))
}

/// Look for `image` / `primaryImageOfPage` on a JSON-LD node, descending
/// into top-level arrays and `@graph`.
fn image_from_ld_node(node: &Value, article_url: &str) -> Option<String> {
    match node {
        Value::Array(items) => items
            .iter()
            .find_map(|item| image_from_ld_node(item, article_url)),
        Value::Object(map) => ["image", "primaryImageOfPage"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|value| unwrap_ld_image(value, article_url))
            .or_else(|| {
                map.get("@graph")
                    .and_then(|graph| image_from_ld_node(graph, article_url))
            }),
        _ => None,
    }
}

/// Unwrap a JSON-LD image value: a URL string, a list, or an object with a
/// url-like field.
fn unwrap_ld_image(value: &Value, article_url: &str) -> Option<String> {
    match value {
        Value::String(s) => page_candidate(s, article_url),
        Value::Array(items) => items
            .iter()
            .find_map(|item| unwrap_ld_image(item, article_url)),
        Value::Object(map) => JSON_LD_URL_FIELDS
            .iter()
            .filter_map(|field| map.get(*field))
            .find_map(|inner| unwrap_ld_image(inner, article_url)),
        _ => None,
    }
}

fn from_raw_images(html: &str, article_url: &str) -> Option<String> {
    let images: Vec<Vec<(String, String)>> = IMG_TAG
        .find_iter(html)
        .map(|m| tag_attributes(m.as_str()))
        .collect();

    let from_srcset = images
        .iter()
        .find_map(|attrs| attr(attrs, "srcset").or_else(|| attr(attrs, "data-srcset")))
        .and_then(|set| {
            srcset_candidates(set)
                .iter()
                .find_map(|u| page_candidate(u, article_url))
        });
    if from_srcset.is_some() {
        return from_srcset;
    }

    images
        .iter()
        .find_map(|attrs| attr(attrs, "data-src").or_else(|| attr(attrs, "src")))
        .and_then(|src| page_candidate(src, article_url))
}
