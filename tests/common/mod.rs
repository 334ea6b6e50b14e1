//! Test helpers for integration tests.
//!
//! Provides a local fixture server that serves feeds and article pages, plus
//! configuration helpers that point the aggregator at it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use newsdesk::config::{AggregatorConfig, ImagesConfig};
use newsdesk::{Aggregator, SourceDescriptor, SourceRegistry};

/// Title shared by one story in the alpha and beta feeds.
pub const STORM_TITLE: &str = "Brutális vihar csapott le Budapestre tegnap este";

/// How long the slow endpoints sleep.
pub const SLOW_DELAY: Duration = Duration::from_secs(3);

/// Local HTTP server serving feed and page fixtures.
pub struct FixtureServer {
    addr: SocketAddr,
}

impl FixtureServer {
    /// Start the fixture server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fixture server");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let base = Arc::new(format!("http://{}", addr));

        let app = Router::new()
            .route("/feeds/alpha.xml", get(alpha_feed))
            .route("/feeds/beta.xml", get(beta_feed))
            .route("/feeds/slow.xml", get(slow_feed))
            .route("/feeds/delay/:ms", get(delayed_feed))
            .route("/feeds/html", get(html_page_as_feed))
            .route("/feeds/broken.xml", get(broken_feed))
            .route("/feeds/garbage.xml", get(garbage_feed))
            .route("/pages/:name", get(article_page))
            .with_state(base);

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr }
    }

    /// Absolute URL of a fixture path.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Source descriptor pointing at a fixture path.
    pub fn source(&self, id: &str, path: &str) -> SourceDescriptor {
        SourceDescriptor::new(id, id.to_uppercase(), self.url(path))
    }

    /// The two well-behaved sources.
    pub fn healthy_sources(&self) -> Vec<SourceDescriptor> {
        vec![
            self.source("alpha", "/feeds/alpha.xml"),
            self.source("beta", "/feeds/beta.xml"),
        ]
    }
}

/// Aggregator settings for tests: local hosts allowed, short budgets.
pub fn test_aggregator_config() -> AggregatorConfig {
    AggregatorConfig {
        per_source_timeout_ms: 2000,
        wall_clock_ms: 2500,
        allow_private_hosts: true,
        ..AggregatorConfig::default()
    }
}

/// Image settings for tests: short page timeouts.
pub fn test_images_config() -> ImagesConfig {
    ImagesConfig {
        page_timeout_ms: 1000,
        slow_page_timeout_ms: 1000,
        ..ImagesConfig::default()
    }
}

/// Build an aggregator over the given sources.
pub fn aggregator(sources: Vec<SourceDescriptor>, config: AggregatorConfig) -> Aggregator {
    Aggregator::new(SourceRegistry::new(sources), config, test_images_config())
        .expect("Failed to create aggregator")
}

fn xml(body: String) -> Response {
    ([(CONTENT_TYPE, "application/rss+xml; charset=utf-8")], body).into_response()
}

fn alpha_body(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Alpha</title>
    <link>{base}</link>
    <item>
      <title>{STORM_TITLE}</title>
      <link>{base}/pages/storm-alpha</link>
      <pubDate>Thu, 02 Jan 2025 10:00:00 +0000</pubDate>
      <description>A vihar fákat döntött ki.</description>
    </item>
    <item>
      <title>Új könyvtár nyílik a belvárosban jövő héten</title>
      <link>{base}/pages/library</link>
      <pubDate>Thu, 02 Jan 2025 09:00:00 +0000</pubDate>
      <category>Kultúra</category>
      <enclosure url="{base}/img/library.jpg" type="image/jpeg" length="1"/>
    </item>
    <item>
      <title>Rövid hír</title>
      <link>{base}/pages/short</link>
      <pubDate>Wed, 01 Jan 2025 08:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#
    )
}

async fn alpha_feed(State(base): State<Arc<String>>) -> Response {
    xml(alpha_body(&base))
}

async fn beta_feed(State(base): State<Arc<String>>) -> Response {
    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Beta</title>
  <id>urn:beta</id>
  <updated>2025-01-02T11:00:00Z</updated>
  <entry>
    <title>{STORM_TITLE}</title>
    <id>urn:beta:1</id>
    <link rel="alternate" href="{base}/pages/storm-beta"/>
    <updated>2025-01-02T11:00:00Z</updated>
    <summary>Viharos éjszaka a fővárosban.</summary>
  </entry>
  <entry>
    <title>Sportesemény: döntő a stadionban vasárnap délután</title>
    <id>urn:beta:2</id>
    <link rel="alternate" href="{base}/pages/final"/>
    <updated>2025-01-01T12:00:00Z</updated>
  </entry>
</feed>"#
    );
    ([(CONTENT_TYPE, "application/atom+xml")], body).into_response()
}

async fn slow_feed(State(base): State<Arc<String>>) -> Response {
    tokio::time::sleep(SLOW_DELAY).await;
    xml(alpha_body(&base))
}

async fn delayed_feed(State(base): State<Arc<String>>, Path(ms): Path<u64>) -> Response {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    xml(alpha_body(&base))
}

async fn html_page_as_feed() -> Response {
    (
        [(CONTENT_TYPE, "text/html; charset=utf-8")],
        "<!DOCTYPE html><html><body>Not a feed</body></html>",
    )
        .into_response()
}

async fn broken_feed(State(base): State<Arc<String>>) -> Response {
    xml(format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Broken</title>
<item><title>Hibás&nbsp;cím</title><link>{base}/pages/broken</link></item>
</channel></rss>"#
    ))
}

async fn garbage_feed() -> Response {
    xml(r#"<?xml version="1.0"?><html><body>not a feed</body></html>"#.to_string())
}

async fn article_page(Path(name): Path<String>) -> Response {
    if name == "plain" {
        return (StatusCode::OK, "<html><body>No image here</body></html>").into_response();
    }
    let body = format!(
        r#"<!DOCTYPE html><html><head>
<meta property="og:image" content="/img/{name}.jpg">
</head><body><p>Article {name}</p></body></html>"#
    );
    ([(CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}
