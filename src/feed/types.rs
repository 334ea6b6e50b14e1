//! Feed and article types for Newsdesk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder title for feed items that carry none.
pub const UNTITLED: &str = "(untitled)";

/// Maximum length for an article description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Static descriptor of one RSS/Atom origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable source identifier used in the `sources` filter.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
}

impl SourceDescriptor {
    /// Create a new source descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A normalized feed entry.
///
/// The `id` is only unique within one fetch cycle: it embeds the item's
/// position in its feed, so it changes whenever the source reorders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// `<source id>-<position>-<link>`.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Link to the original article.
    pub link: String,
    /// Source identifier.
    pub source_id: String,
    /// Source display name.
    pub source_name: String,
    /// Publication time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Absolute http(s) image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Plain-text snippet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw section/category label from the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Article {
    /// Create an article with only the required fields set.
    pub fn new(
        source: &SourceDescriptor,
        index: usize,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        let link = link.into();
        Self {
            id: format!("{}-{}-{}", source.id, index, link),
            title: title.into(),
            link,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            published_at: None,
            image_url: None,
            description: None,
            section: None,
        }
    }

    /// Set the publication time.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Set the image URL.
    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the section label.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Whether an image is already known for this article.
    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }
}

/// Sort articles newest first. Articles without a date sort last and keep
/// their relative order.
pub fn sort_by_recency(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Per-source outcome of one fetch, used for debug output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStat {
    /// Source identifier.
    pub id: String,
    /// Source display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Whether the fetch produced a parsed feed.
    pub ok: bool,
    /// Number of articles kept from this source.
    pub item_count: usize,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchStat {
    /// Successful fetch.
    pub fn success(source: &SourceDescriptor, item_count: usize) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            url: source.url.clone(),
            ok: true,
            item_count,
            error: None,
        }
    }

    /// Failed fetch.
    pub fn failure(source: &SourceDescriptor, error: impl Into<String>) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            url: source.url.clone(),
            ok: false,
            item_count: 0,
            error: Some(error.into()),
        }
    }
}
