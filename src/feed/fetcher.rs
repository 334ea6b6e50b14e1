//! Feed fetcher.
//!
//! Fetches one source under a deadline and turns its entries into
//! [`Article`]s. Failures never escape: every fetch yields a list (possibly
//! empty) plus a [`FetchStat`] describing what happened.

use std::time::Instant;

use feed_rs::model::{Entry, Feed, FeedType};
use feed_rs::parser;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, warn};

use crate::cancel::{CancelReason, CancelToken};
use crate::config::AggregatorConfig;
use crate::feed::types::{
    sort_by_recency, Article, FetchStat, SourceDescriptor, MAX_DESCRIPTION_LENGTH, UNTITLED,
};
use crate::image::{extract_cheap, FeedItemView};
use crate::net::{build_client, read_body_limited, validate_url};
use crate::{NewsdeskError, Result};

/// Accept header sent with feed requests.
const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, text/xml;q=0.9, */*;q=0.1";

/// Prefixes that mark a body as XML-shaped.
const XML_PREFIXES: &[&str] = &["<?xml", "<rss", "<feed", "<rdf"];

static BARE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*>").expect("valid br regex"));

static BARE_HR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<hr\s*>").expect("valid hr regex"));

/// Fetches and normalizes one source's feed.
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
    config: AggregatorConfig,
}

impl FeedFetcher {
    /// Create a new fetcher.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        let client = build_client(&config.user_agent, config.per_source_timeout())?;
        Ok(Self { client, config })
    }

    /// Fetch one source.
    ///
    /// The per-source timeout is layered on top of `outer`; whichever fires
    /// first ends the fetch with a failed stat.
    pub async fn fetch(
        &self,
        source: &SourceDescriptor,
        outer: &CancelToken,
    ) -> (Vec<Article>, FetchStat) {
        let started = Instant::now();
        let token = outer.child_with_timeout(self.config.per_source_timeout());

        let outcome = match token.run(self.fetch_articles(source)).await {
            Ok(result) => result,
            Err(CancelReason::TimedOut) => Err(NewsdeskError::Network(format!(
                "timed out after {} ms",
                self.config.per_source_timeout_ms
            ))),
            Err(CancelReason::Aborted) => Err(NewsdeskError::Network("aborted".to_string())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(articles) => {
                debug!(
                    source = %source.id,
                    items = articles.len(),
                    elapsed_ms,
                    "Fetched feed"
                );
                let stat = FetchStat::success(source, articles.len());
                (articles, stat)
            }
            Err(e) => {
                warn!(source = %source.id, elapsed_ms, error = %e, "Feed fetch failed");
                (Vec::new(), FetchStat::failure(source, e.to_string()))
            }
        }
    }

    async fn fetch_articles(&self, source: &SourceDescriptor) -> Result<Vec<Article>> {
        let url = validate_url(&source.url, self.config.allow_private_hosts)?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await
            .map_err(|e| NewsdeskError::Network(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(NewsdeskError::Network(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = read_body_limited(response, self.config.max_feed_size_bytes).await?;
        let body = String::from_utf8_lossy(&bytes);

        if !looks_like_xml(&body, &content_type) {
            let shown = if content_type.is_empty() {
                "no content-type"
            } else {
                content_type.as_str()
            };
            return Err(NewsdeskError::ContentType(format!(
                "content-type={}",
                shown
            )));
        }

        let feed = parse_feed_lenient(&bytes)?;
        Ok(normalize_feed(
            source,
            feed,
            self.config.per_source_limit,
        ))
    }
}

/// Whether a response looks like an XML feed, by its leading bytes or its
/// content type.
pub fn looks_like_xml(body: &str, content_type: &str) -> bool {
    let head = body.trim_start_matches('\u{feff}').trim_start();
    XML_PREFIXES.iter().any(|p| {
        head.get(..p.len())
            .is_some_and(|start| start.eq_ignore_ascii_case(p))
    }) || content_type.to_ascii_lowercase().contains("xml")
}

/// Patch the common ways feeds break XML: bare `&nbsp;` and unclosed
/// `<br>` / `<hr>`.
pub fn sanitize_xml(body: &str) -> String {
    let body = body.replace("&nbsp;", " ");
    let body = BARE_BR.replace_all(&body, "<br/>");
    BARE_HR.replace_all(&body, "<hr/>").into_owned()
}

/// Parse a feed, retrying exactly once after [`sanitize_xml`].
pub fn parse_feed_lenient(bytes: &[u8]) -> Result<Feed> {
    match parser::parse(bytes) {
        Ok(feed) => Ok(feed),
        Err(first) => {
            debug!(error = %first, "Feed parse failed, retrying after sanitization");
            let sanitized = sanitize_xml(&String::from_utf8_lossy(bytes));
            parser::parse(sanitized.as_bytes())
                .map_err(|e| NewsdeskError::Parse(format!("failed to parse feed: {}", e)))
        }
    }
}

/// Turn parsed entries into articles, newest first, capped at `limit`.
///
/// Entries without a link are dropped. RSS descriptions come from the item
/// `<description>` before `content:encoded`; Atom prefers `<content>`.
pub fn normalize_feed(source: &SourceDescriptor, feed: Feed, limit: usize) -> Vec<Article> {
    let summary_first = matches!(
        feed.feed_type,
        FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2
    );
    let mut articles: Vec<Article> = feed
        .entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| normalize_entry(source, index, entry, summary_first))
        .collect();

    sort_by_recency(&mut articles);
    articles.truncate(limit);
    articles
}

fn normalize_entry(
    source: &SourceDescriptor,
    index: usize,
    entry: &Entry,
    summary_first: bool,
) -> Option<Article> {
    let link = entry_link(entry)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let mut article = Article::new(source, index, title, link.clone());

    if let Some(published) = entry.published.or(entry.updated) {
        article = article.with_published_at(published);
    }

    let content = entry.content.as_ref().and_then(|c| c.body.as_deref());
    let summary = entry.summary.as_ref().map(|s| s.content.as_str());
    let html: Vec<&str> = content.into_iter().chain(summary).collect();

    let enclosures: Vec<&str> = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter(|c| {
            !c.content_type.as_ref().is_some_and(|ct| {
                let ty = ct.ty();
                ty.as_str().eq_ignore_ascii_case("audio")
                    || ty.as_str().eq_ignore_ascii_case("video")
            })
        })
        .filter_map(|c| c.url.as_ref().map(|u| u.as_str()))
        .collect();

    let thumbnails: Vec<&str> = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.as_str())
        .collect();

    let view = FeedItemView {
        link: &link,
        enclosures,
        thumbnails,
        html,
    };
    if let Some(image) = extract_cheap(&view) {
        article = article.with_image_url(image);
    }

    let (first, second) = if summary_first {
        (summary, content)
    } else {
        (content, summary)
    };
    if let Some(description) = first
        .into_iter()
        .chain(second)
        .map(|h| truncate_description(&strip_html(h)))
        .find(|d| !d.is_empty())
    {
        article = article.with_description(description);
    }

    if let Some(section) = entry
        .categories
        .iter()
        .map(|c| c.label.as_deref().unwrap_or(&c.term).trim())
        .find(|s| !s.is_empty())
    {
        article = article.with_section(section);
    }

    Some(article)
}

/// The entry's article link: the first `alternate` (or rel-less) link,
/// otherwise the first link of any kind.
fn entry_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Strip HTML tags from text, decoding entities and collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
                result.push(' ');
            }
            continue;
        }

        if let Some(name) = entity.as_mut() {
            match ch {
                ';' => {
                    let name = std::mem::take(name);
                    entity = None;
                    push_entity(&mut result, &name);
                }
                c if c.is_ascii_alphanumeric() || c == '#' => name.push(c),
                _ => {
                    // Not an entity after all
                    result.push('&');
                    result.push_str(name);
                    entity = None;
                    if ch == '<' {
                        in_tag = true;
                    } else {
                        result.push(ch);
                    }
                }
            }
            continue;
        }

        match ch {
            '<' => in_tag = true,
            '&' => entity = Some(String::new()),
            _ => result.push(ch),
        }
    }
    if let Some(name) = entity {
        result.push('&');
        result.push_str(&name);
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_entity(out: &mut String, name: &str) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "hellip" => Some('…'),
        "ndash" => Some('–'),
        "mdash" => Some('—'),
        "laquo" => Some('«'),
        "raquo" => Some('»'),
        "bdquo" => Some('„'),
        "rdquo" => Some('”'),
        "ldquo" => Some('“'),
        _ => parse_numeric_entity(name).and_then(char::from_u32),
    };
    match decoded {
        Some(c) => out.push(c),
        None => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
    }
}

/// Parse a numeric HTML entity (e.g., "#123" or "#x7B").
fn parse_numeric_entity(entity: &str) -> Option<u32> {
    let digits = entity.strip_prefix('#')?;
    match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

/// Truncate a description to [`MAX_DESCRIPTION_LENGTH`] characters.
fn truncate_description(text: &str) -> String {
    match text.char_indices().nth(MAX_DESCRIPTION_LENGTH) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("telex", "Telex", "https://telex.hu/rss")
    }

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Telex</title>
    <link>https://telex.hu</link>
    <item>
      <title>Older story</title>
      <link>https://telex.hu/belfold/older</link>
      <pubDate>Wed, 01 Jan 2025 08:00:00 +0000</pubDate>
      <category>Belföld</category>
      <description><![CDATA[<p>Some <b>bold</b> text &amp; more</p>]]></description>
      <enclosure url="https://telex.hu/img/older.jpg" type="image/jpeg" length="1"/>
    </item>
    <item>
      <title>Newer story</title>
      <link>https://telex.hu/kulfold/newer</link>
      <pubDate>Thu, 02 Jan 2025 08:00:00 +0000</pubDate>
      <description><![CDATA[<img src="/img/inline.jpg"> Inline image]]></description>
    </item>
    <item>
      <title></title>
      <link>https://telex.hu/undated</link>
    </item>
    <item>
      <title>No link</title>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <id>urn:example</id>
  <updated>2025-01-03T10:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:example:1</id>
    <link rel="alternate" href="https://example.org/a1"/>
    <updated>2025-01-03T10:00:00Z</updated>
    <summary>Plain summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_normalize_rss() {
        let feed = parse_feed_lenient(RSS.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 25);

        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].title, "Newer story");
        assert_eq!(articles[0].id, "telex-1-https://telex.hu/kulfold/newer");
        assert_eq!(
            articles[0].image_url.as_deref(),
            Some("https://telex.hu/img/inline.jpg")
        );
        assert_eq!(articles[0].description.as_deref(), Some("Inline image"));

        assert_eq!(articles[1].title, "Older story");
        assert_eq!(
            articles[1].image_url.as_deref(),
            Some("https://telex.hu/img/older.jpg")
        );
        assert_eq!(
            articles[1].description.as_deref(),
            Some("Some bold text & more")
        );
        assert_eq!(articles[1].section.as_deref(), Some("Belföld"));
        assert_eq!(
            articles[1].published_at,
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap())
        );

        assert_eq!(articles[2].title, UNTITLED);
        assert!(articles[2].published_at.is_none());
    }

    #[test]
    fn test_normalize_truncates_per_source() {
        let feed = parse_feed_lenient(RSS.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 1);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Newer story");
    }

    #[test]
    fn test_normalize_atom() {
        let feed = parse_feed_lenient(ATOM.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 25);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].link, "https://example.org/a1");
        assert_eq!(articles[0].description.as_deref(), Some("Plain summary"));
        assert!(articles[0].published_at.is_some());
    }

    #[test]
    fn test_rss_description_prefers_excerpt() {
        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Blog</title>
    <item>
      <title>Both bodies</title>
      <link>https://blog.example/post</link>
      <description>Short excerpt of the post.</description>
      <content:encoded><![CDATA[<p>Full article body paragraph one that is long.</p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;
        let feed = parse_feed_lenient(rss.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 25);
        assert_eq!(
            articles[0].description.as_deref(),
            Some("Short excerpt of the post.")
        );
    }

    #[test]
    fn test_atom_description_prefers_content() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <id>urn:example</id>
  <updated>2025-01-03T10:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:example:1</id>
    <link rel="alternate" href="https://example.org/a1"/>
    <updated>2025-01-03T10:00:00Z</updated>
    <summary>Plain summary</summary>
    <content type="html">&lt;p&gt;Full content&lt;/p&gt;</content>
  </entry>
</feed>"#;
        let feed = parse_feed_lenient(atom.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 25);
        assert_eq!(articles[0].description.as_deref(), Some("Full content"));
    }

    #[test]
    fn test_audio_enclosure_skipped_for_thumbnail() {
        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Podcast</title>
    <item>
      <title>Episode</title>
      <link>https://pod.example/ep1</link>
      <enclosure url="https://pod.example/ep1.mp3" type="audio/mpeg" length="1"/>
      <media:thumbnail url="https://pod.example/ep1.jpg"/>
    </item>
  </channel>
</rss>"#;
        let feed = parse_feed_lenient(rss.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 25);
        assert_eq!(
            articles[0].image_url.as_deref(),
            Some("https://pod.example/ep1.jpg")
        );
    }

    #[test]
    fn test_sanitize_recovers_malformed_feed() {
        let broken = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
<item><title>Broken&nbsp;title</title><link>https://x.example/1</link></item>
</channel></rss>"#;
        let feed = parse_feed_lenient(broken.as_bytes()).unwrap();
        let articles = normalize_feed(&source(), feed, 25);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Broken title");
    }

    #[test]
    fn test_unparseable_feed_is_parse_error() {
        let result = parse_feed_lenient(b"<html><body>not a feed</body></html>");
        assert!(matches!(result, Err(NewsdeskError::Parse(_))));
    }

    #[test]
    fn test_sanitize_xml() {
        assert_eq!(
            sanitize_xml("a&nbsp;b<br>c<BR >d<hr>"),
            "a b<br/>c<br/>d<hr/>"
        );
        assert_eq!(sanitize_xml("<br/>"), "<br/>");
    }

    #[test]
    fn test_looks_like_xml() {
        assert!(looks_like_xml("<?xml version=\"1.0\"?><rss/>", ""));
        assert!(looks_like_xml("\u{feff}  <rss version=\"2.0\">", "text/html"));
        assert!(looks_like_xml("<FEED>", ""));
        assert!(looks_like_xml("<rdf:RDF>", ""));
        assert!(looks_like_xml("garbage", "application/rss+xml"));
        assert!(!looks_like_xml("<!DOCTYPE html><html>", "text/html; charset=utf-8"));
        assert!(!looks_like_xml("", ""));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello <b>World</b></p>"), "Hello World");
        assert_eq!(strip_html("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(strip_html("&#65;&#x42;&#X43;"), "ABC");
        assert_eq!(strip_html("Tom &unknown; Jerry"), "Tom &unknown; Jerry");
        assert_eq!(strip_html("AT&T rocks"), "AT&T rocks");
        assert_eq!(strip_html("  lots \n of\t space  "), "lots of space");
        assert_eq!(strip_html("line<br>break"), "line break");
    }

    #[test]
    fn test_truncate_description() {
        let short = "short";
        assert_eq!(truncate_description(short), "short");

        let long = "á".repeat(MAX_DESCRIPTION_LENGTH + 10);
        assert_eq!(
            truncate_description(&long).chars().count(),
            MAX_DESCRIPTION_LENGTH
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_private_host() {
        let fetcher = FeedFetcher::new(AggregatorConfig::default()).unwrap();
        let source = SourceDescriptor::new("local", "Local", "http://127.0.0.1:9/rss");

        let (articles, stat) = fetcher.fetch(&source, &CancelToken::never()).await;

        assert!(articles.is_empty());
        assert!(!stat.ok);
        assert!(stat.error.unwrap().contains("private IP"));
    }

    #[tokio::test]
    async fn test_fetch_aborted_by_outer_token() {
        let fetcher = FeedFetcher::new(AggregatorConfig::default()).unwrap();
        let (handle, token) = CancelToken::new();
        handle.cancel();

        let (articles, stat) = fetcher.fetch(&source(), &token).await;

        assert!(articles.is_empty());
        assert_eq!(stat.error.as_deref(), Some("network error: aborted"));
    }
}
