//! Request-scoped aggregation pipeline.
//!
//! One call to [`Aggregator::aggregate`] selects sources, fetches them under
//! a concurrency cap and a wall-clock deadline, ranks and caps the merged
//! list, filters it, enriches missing images and collapses duplicates.
//! Nothing is shared between calls except the immutable configuration and
//! the HTTP clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::{AggregatorConfig, Config, ImagesConfig};
use crate::dedupe::{dedupe_articles, DEFAULT_THRESHOLD};
use crate::feed::{sort_by_recency, Article, FeedFetcher, FetchStat, SourceDescriptor, SourceRegistry};
use crate::image::ImageResolver;
use crate::Result;

/// Stat message for sources still running at the wall-clock deadline.
pub const DEADLINE_EXCEEDED: &str = "wall-clock deadline exceeded";

/// Stat message for sources whose task ended without a result.
pub const TASK_FAILED: &str = "task failed";

/// Per-request options.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOptions {
    /// Source ids to include; `None` means all.
    pub sources: Option<Vec<String>>,
    /// Lowercase keyword matched against title and description.
    pub query: Option<String>,
    /// Base dedupe threshold in [0, 1].
    pub threshold: f64,
    /// Run page-scrape image enrichment.
    pub enrich_images: bool,
    /// Collapse near-duplicates.
    pub dedupe: bool,
    /// Include stats and counts in the response.
    pub debug: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            sources: None,
            query: None,
            threshold: DEFAULT_THRESHOLD,
            enrich_images: true,
            dedupe: true,
            debug: false,
        }
    }
}

/// Pipeline counters reported in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub selected_sources: usize,
    pub fetched_articles: usize,
    pub after_limit: usize,
    pub after_dedupe: usize,
    pub wall_ms: u64,
    pub per_source_ms: u64,
}

/// Result of one aggregation.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub articles: Vec<Article>,
    pub stats: Vec<FetchStat>,
    pub counts: Counts,
}

/// Merged output of the fetch stage.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Articles from every source that reported in time, in source order.
    pub articles: Vec<Article>,
    /// One stat per selected source, in source order.
    pub stats: Vec<FetchStat>,
    /// Whether the wall-clock deadline cut the batch short.
    pub timed_out: bool,
}

/// The aggregation pipeline.
pub struct Aggregator {
    registry: SourceRegistry,
    config: AggregatorConfig,
    fetcher: FeedFetcher,
    resolver: Arc<ImageResolver>,
}

impl Aggregator {
    /// Create a new aggregator.
    pub fn new(
        registry: SourceRegistry,
        config: AggregatorConfig,
        images: ImagesConfig,
    ) -> Result<Self> {
        let fetcher = FeedFetcher::new(config.clone())?;
        let resolver = ImageResolver::new(images, &config.user_agent, config.allow_private_hosts)?;
        Ok(Self {
            registry,
            config,
            fetcher,
            resolver: Arc::new(resolver),
        })
    }

    /// Create an aggregator from the application configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            SourceRegistry::new(config.sources.clone()),
            config.aggregator.clone(),
            config.images.clone(),
        )
    }

    /// The source registry.
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run the whole pipeline for one request.
    pub async fn aggregate(&self, options: &AggregateOptions) -> Aggregation {
        let started = Instant::now();
        let sources = self.registry.select(options.sources.as_deref());

        let FetchBatch {
            mut articles,
            stats,
            timed_out,
        } = self.fetch_all(&sources).await;
        let fetched = articles.len();

        sort_by_recency(&mut articles);
        // Cap before filtering: a keyword only searches the newest items.
        articles.truncate(self.config.max_total);
        if let Some(query) = options.query.as_deref().filter(|q| !q.is_empty()) {
            articles = filter_by_keyword(articles, query);
        }
        let after_limit = articles.len();

        if options.enrich_images {
            self.enrich_images(&mut articles).await;
        }

        if options.dedupe {
            articles = dedupe_articles(&articles, options.threshold);
        }
        let after_dedupe = articles.len();

        info!(
            selected = sources.len(),
            fetched,
            after_limit,
            after_dedupe,
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregated news"
        );

        Aggregation {
            articles,
            stats,
            counts: Counts {
                selected_sources: sources.len(),
                fetched_articles: fetched,
                after_limit,
                after_dedupe,
                wall_ms: self.config.wall_clock_ms,
                per_source_ms: self.config.per_source_timeout_ms,
            },
        }
    }

    /// Fetch every source, at most `max_concurrency` at a time, until all
    /// report or the wall-clock deadline passes.
    ///
    /// Sources still running at the deadline get a failed stat and their
    /// eventual results are dropped.
    pub async fn fetch_all(&self, sources: &[SourceDescriptor]) -> FetchBatch {
        if sources.is_empty() {
            return FetchBatch::default();
        }

        let (handle, token) = CancelToken::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(sources.len());

        // A single dispatcher takes permits in submission order, so queued
        // sources start in the order they were selected.
        let dispatcher = {
            let fetcher = self.fetcher.clone();
            let sources = sources.to_vec();
            let token = token.clone();
            tokio::spawn(async move {
                for (index, source) in sources.into_iter().enumerate() {
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        return;
                    };
                    if token.is_cancelled() {
                        return;
                    }
                    let fetcher = fetcher.clone();
                    let token = token.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let outcome = fetcher.fetch(&source, &token).await;
                        // The receiver is gone once the deadline has passed
                        let _ = tx.send((index, outcome)).await;
                    });
                }
            })
        };

        let mut slots: Vec<Option<(Vec<Article>, FetchStat)>> =
            (0..sources.len()).map(|_| None).collect();
        let mut received = 0;
        let mut timed_out = false;

        let deadline = tokio::time::sleep(self.config.wall_clock());
        tokio::pin!(deadline);

        while received < sources.len() {
            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Some((index, outcome)) => {
                        slots[index] = Some(outcome);
                        received += 1;
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    handle.cancel();
                    break;
                }
            }
        }
        drop(rx);
        dispatcher.abort();

        if timed_out {
            warn!(
                pending = sources.len() - received,
                wall_ms = self.config.wall_clock_ms,
                "Wall-clock deadline reached, dropping pending sources"
            );
        }

        let missing = if timed_out { DEADLINE_EXCEEDED } else { TASK_FAILED };
        let mut batch = FetchBatch {
            timed_out,
            ..FetchBatch::default()
        };
        for (source, slot) in sources.iter().zip(slots) {
            match slot {
                Some((items, stat)) => {
                    batch.articles.extend(items);
                    batch.stats.push(stat);
                }
                None => batch.stats.push(FetchStat::failure(source, missing)),
            }
        }
        batch
    }

    /// Look up page images for the imageless articles picked by
    /// [`select_for_enrichment`], all concurrently. Returns how many were
    /// found.
    pub async fn enrich_images(&self, articles: &mut [Article]) -> usize {
        let images = self.resolver.config();
        let candidates = select_for_enrichment(articles, images);
        if candidates.is_empty() {
            return 0;
        }
        let requested = candidates.len();
        let started = Instant::now();

        let resolver = &self.resolver;
        let found: HashMap<String, String> = stream::iter(candidates)
            .map(|(id, link)| async move {
                resolver
                    .resolve_from_page(&link)
                    .await
                    .map(|image| (id, image))
            })
            .buffer_unordered(requested)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        for article in articles.iter_mut().filter(|a| !a.has_image()) {
            if let Some(image) = found.get(&article.id) {
                article.image_url = Some(image.clone());
            }
        }

        debug!(
            requested,
            found = found.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Enriched article images"
        );
        found.len()
    }
}

/// Keep articles whose title or description contains `query`.
///
/// `query` is expected lowercase already.
pub fn filter_by_keyword(articles: Vec<Article>, query: &str) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| {
            a.title.to_lowercase().contains(query)
                || a
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(query))
        })
        .collect()
}

/// Pick up to `enrichment_limit` imageless articles for page enrichment,
/// slow-domain links first. Returns `(id, link)` pairs.
pub fn select_for_enrichment(articles: &[Article], images: &ImagesConfig) -> Vec<(String, String)> {
    let mut missing: Vec<&Article> = articles.iter().filter(|a| !a.has_image()).collect();
    missing.sort_by_key(|a| !images.is_slow_link(&a.link));
    missing
        .into_iter()
        .take(images.enrichment_limit)
        .map(|a| (a.id.clone(), a.link.clone()))
        .collect()
}
