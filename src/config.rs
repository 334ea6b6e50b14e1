//! Configuration module for Newsdesk.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::feed::{default_sources, SourceDescriptor};
use crate::{NewsdeskError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins (empty = any origin).
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty means console only.
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

/// Budgets and caps for one aggregation request.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Timeout for a single feed fetch in milliseconds.
    #[serde(default = "default_per_source_timeout")]
    pub per_source_timeout_ms: u64,
    /// Wall-clock budget for the whole fetch batch in milliseconds.
    #[serde(default = "default_wall_clock")]
    pub wall_clock_ms: u64,
    /// Maximum number of feed fetches in flight.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Items kept per source after sorting.
    #[serde(default = "default_per_source_limit")]
    pub per_source_limit: usize,
    /// Items kept overall after the global sort.
    #[serde(default = "default_max_total")]
    pub max_total: usize,
    /// User agent sent with every outbound request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum feed body size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Allow fetching from loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_per_source_timeout() -> u64 {
    5000
}

fn default_wall_clock() -> u64 {
    5500
}

fn default_max_concurrency() -> usize {
    6
}

fn default_per_source_limit() -> usize {
    25
}

fn default_max_total() -> usize {
    250
}

fn default_user_agent() -> String {
    "newsdesk/1.0 (+rss aggregator)".to_string()
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: default_per_source_timeout(),
            wall_clock_ms: default_wall_clock(),
            max_concurrency: default_max_concurrency(),
            per_source_limit: default_per_source_limit(),
            max_total: default_max_total(),
            user_agent: default_user_agent(),
            max_feed_size_bytes: default_max_feed_size(),
            allow_private_hosts: false,
        }
    }
}

impl AggregatorConfig {
    /// Per-source timeout as a [`Duration`].
    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    /// Whole-batch deadline as a [`Duration`].
    pub fn wall_clock(&self) -> Duration {
        Duration::from_millis(self.wall_clock_ms)
    }
}

/// Image enrichment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Maximum number of articles enriched per request.
    #[serde(default = "default_enrichment_limit")]
    pub enrichment_limit: usize,
    /// Article page fetch timeout in milliseconds.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_ms: u64,
    /// Page fetch timeout for domains in `slow_domains`.
    #[serde(default = "default_slow_page_timeout")]
    pub slow_page_timeout_ms: u64,
    /// Host fragments that need the longer timeout and go first.
    #[serde(default = "default_slow_domains")]
    pub slow_domains: Vec<String>,
    /// Maximum article page size in bytes.
    #[serde(default = "default_max_page_size")]
    pub max_page_size_bytes: u64,
}

fn default_enrichment_limit() -> usize {
    20
}

fn default_page_timeout() -> u64 {
    1200
}

fn default_slow_page_timeout() -> u64 {
    4000
}

fn default_slow_domains() -> Vec<String> {
    vec!["theguardian.com".to_string(), "hang.hu".to_string()]
}

fn default_max_page_size() -> u64 {
    2 * 1024 * 1024 // 2MB
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enrichment_limit: default_enrichment_limit(),
            page_timeout_ms: default_page_timeout(),
            slow_page_timeout_ms: default_slow_page_timeout(),
            slow_domains: default_slow_domains(),
            max_page_size_bytes: default_max_page_size(),
        }
    }
}

impl ImagesConfig {
    /// Check whether a link points at one of the slow domains.
    pub fn is_slow_link(&self, link: &str) -> bool {
        let host = match url::Url::parse(link) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_lowercase(),
                None => return false,
            },
            Err(_) => return false,
        };
        self.slow_domains
            .iter()
            .any(|d| !d.is_empty() && host.contains(&d.to_lowercase()))
    }

    /// Page fetch timeout for the given article link.
    pub fn page_timeout_for(&self, link: &str) -> Duration {
        if self.is_slow_link(link) {
            Duration::from_millis(self.slow_page_timeout_ms.max(self.page_timeout_ms))
        } else {
            Duration::from_millis(self.page_timeout_ms)
        }
    }
}

/// Deduplication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupeConfig {
    /// Base similarity threshold used when the request does not give one.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

fn default_threshold() -> f64 {
    0.90
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Aggregation budgets.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// Image enrichment configuration.
    #[serde(default)]
    pub images: ImagesConfig,
    /// Deduplication configuration.
    #[serde(default)]
    pub dedupe: DedupeConfig,
    /// Feed sources.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            aggregator: AggregatorConfig::default(),
            images: ImagesConfig::default(),
            dedupe: DedupeConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NewsdeskError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NewsdeskError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NEWSDESK_PORT`: Override the listen port
    /// - `NEWSDESK_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("NEWSDESK_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) if port.trim().is_empty() => {}
                Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid NEWSDESK_PORT"),
            }
        }
        if let Ok(level) = std::env::var("NEWSDESK_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let agg = &self.aggregator;
        if agg.per_source_timeout_ms == 0 || agg.wall_clock_ms == 0 {
            return Err(NewsdeskError::Validation(
                "aggregator timeouts must be greater than zero".to_string(),
            ));
        }
        if agg.max_concurrency == 0 || agg.per_source_limit == 0 || agg.max_total == 0 {
            return Err(NewsdeskError::Validation(
                "aggregator caps and concurrency must be greater than zero".to_string(),
            ));
        }
        if self.images.page_timeout_ms == 0 || self.images.slow_page_timeout_ms == 0 {
            return Err(NewsdeskError::Validation(
                "image page timeouts must be greater than zero".to_string(),
            ));
        }
        let threshold = self.dedupe.default_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(NewsdeskError::Validation(format!(
                "dedupe.default_threshold must be within 0..1, got {threshold}"
            )));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(NewsdeskError::Validation(format!(
                    "source with url {} has an empty id",
                    source.url
                )));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(NewsdeskError::Validation(format!(
                    "duplicate source id: {}",
                    source.id
                )));
            }
        }
        Ok(())
    }
}
