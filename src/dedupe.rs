//! Near-duplicate detection.
//!
//! The same story reported by several outlets usually shares most of the
//! meaningful words of its title. Titles are reduced to token sets, pairs
//! that share at least [`MIN_SHARED_TOKENS`] tokens are compared by Jaccard
//! similarity, and each cluster of matches collapses to one representative.

use std::cmp::Ordering;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

use crate::feed::{sort_by_recency, Article};

/// Default base threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.90;

/// Titles with fewer tokens than this are never merged.
pub const MIN_TOKENS: usize = 4;

/// Shared tokens needed before a pair is compared at all.
pub const MIN_SHARED_TOKENS: usize = 3;

/// Shortest token kept, in characters.
const MIN_TOKEN_CHARS: usize = 4;

/// Lower bound of the effective Jaccard threshold.
const JACCARD_FLOOR: f64 = 0.60;

/// Distance between the base threshold and the effective one.
const JACCARD_SLACK: f64 = 0.12;

const STOPWORDS: &[&str] = &[
    "a", "az", "és", "meg", "vagy", "is", "hogy", "már", "még", "mint", "de", "ha", "mert", "nem",
    "se", "sem", "egy", "egyik", "másik", "lesz", "volt", "van", "vannak", "lenne", "kell", "sőt",
    "közben", "után", "előtt", "között", "szerint", "miatt", "tovább", "videó", "fotó", "friss",
    "breaking",
];

/// Stopwords as written. Tokens are compared after normalization, so the
/// accented entries never match.
static STOPWORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOPWORDS.iter().copied().collect());

/// Normalized title tokens.
pub type TokenSet = HashSet<String>;

/// Lowercase, strip diacritics, turn punctuation into spaces and collapse
/// whitespace.
pub fn normalize_title(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| if is_separator(c) { ' ' } else { c })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_separator(c: char) -> bool {
    matches!(
        c,
        '“' | '”' | '„' | '"' | '\''
            | '(' | ')' | '{' | '}' | '[' | ']'
            | '-' | '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}'
            | '.' | ',' | ':' | ';' | '!' | '?' | '/' | '\\' | '|' | '+' | '*' | '='
            | '<' | '>' | '@' | '#' | '%' | '^' | '&' | '~' | '`'
    )
}

/// Meaningful tokens of a title: normalized words of at least four
/// characters that are not stopwords.
pub fn tokenize(title: &str) -> TokenSet {
    normalize_title(title)
        .split(' ')
        .filter(|w| w.chars().count() >= MIN_TOKEN_CHARS && !STOPWORD_SET.contains(w))
        .map(str::to_string)
        .collect()
}

/// |a ∩ b| / |a ∪ b|; 0 when both are empty.
pub fn jaccard(a: &TokenSet, b: &TokenSet) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let inter = small.iter().filter(|w| large.contains(*w)).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// Effective Jaccard threshold for a base threshold.
pub fn merge_threshold(base: f64) -> f64 {
    (base - JACCARD_SLACK).max(JACCARD_FLOOR)
}

/// Count shared tokens, stopping once `MIN_SHARED_TOKENS` are found.
fn shares_enough(a: &TokenSet, b: &TokenSet) -> bool {
    a.iter()
        .filter(|w| b.contains(*w))
        .take(MIN_SHARED_TOKENS)
        .count()
        >= MIN_SHARED_TOKENS
}

type Preference = fn(&Article, &Article) -> Ordering;

/// Representative preference, most important first. `Greater` favours the
/// left-hand article.
const PREFERENCES: &[Preference] = &[prefer_image, prefer_recent, prefer_longer_title];

fn prefer_image(a: &Article, b: &Article) -> Ordering {
    a.has_image().cmp(&b.has_image())
}

fn prefer_recent(a: &Article, b: &Article) -> Ordering {
    a.published_at.cmp(&b.published_at)
}

fn prefer_longer_title(a: &Article, b: &Article) -> Ordering {
    a.title.chars().count().cmp(&b.title.chars().count())
}

/// Whether `candidate` should replace `current` as a cluster representative.
/// Ties keep `current`.
fn replaces(current: &Article, candidate: &Article) -> bool {
    PREFERENCES
        .iter()
        .map(|prefer| prefer(candidate, current))
        .find(|o| o.is_ne())
        .is_some_and(Ordering::is_gt)
}

struct Cluster {
    representative: Article,
    tokens: TokenSet,
}

/// Collapse near-duplicate articles, one article per cluster.
///
/// `base` is the requested strictness in [0, 1]; the effective Jaccard
/// threshold is [`merge_threshold`]. Output is in cluster-creation order,
/// which follows the recency order of the input.
pub fn dedupe_articles(articles: &[Article], base: f64) -> Vec<Article> {
    if articles.len() <= 1 {
        return articles.to_vec();
    }

    let mut sorted = articles.to_vec();
    sort_by_recency(&mut sorted);

    let threshold = merge_threshold(base);
    let mut clusters: Vec<Cluster> = Vec::new();

    for article in sorted {
        let tokens = tokenize(&article.title);

        if tokens.len() >= MIN_TOKENS {
            let matched = clusters.iter_mut().find(|cluster| {
                shares_enough(&tokens, &cluster.tokens)
                    && jaccard(&tokens, &cluster.tokens) >= threshold
            });
            if let Some(cluster) = matched {
                if replaces(&cluster.representative, &article) {
                    cluster.representative = article;
                    cluster.tokens = tokens;
                }
                continue;
            }
        }

        clusters.push(Cluster {
            representative: article,
            tokens,
        });
    }

    clusters.into_iter().map(|c| c.representative).collect()
}
