//! Source registry.

use std::sync::Arc;

use crate::feed::types::SourceDescriptor;

/// Immutable list of feed sources, cheap to clone.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Arc<[SourceDescriptor]>,
}

impl SourceRegistry {
    /// Create a registry from a list of sources.
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self {
            sources: sources.into(),
        }
    }

    /// All sources, in registry order.
    pub fn all(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Pick the sources to fetch for a request.
    ///
    /// `None` selects everything. A filter that matches nothing also selects
    /// everything, so a mistyped id list never yields an empty page.
    /// Registry order is kept regardless of the order of the filter.
    pub fn select(&self, filter: Option<&[String]>) -> Vec<SourceDescriptor> {
        let Some(ids) = filter else {
            return self.sources.to_vec();
        };

        let selected: Vec<SourceDescriptor> = self
            .sources
            .iter()
            .filter(|s| ids.iter().any(|id| id == &s.id))
            .cloned()
            .collect();

        if selected.is_empty() {
            tracing::debug!(?ids, "Source filter matched nothing, using all sources");
            return self.sources.to_vec();
        }
        selected
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(default_sources())
    }
}

/// Built-in source list used when the configuration has no `[[sources]]`.
pub fn default_sources() -> Vec<SourceDescriptor> {
    [
        ("telex", "Telex", "https://telex.hu/rss"),
        ("444", "444", "https://444.hu/feed"),
        ("hvg", "HVG", "https://hvg.hu/rss"),
        ("gamestar", "Gamestar", "https://www.gsplus.hu/site/rss/rss.xml"),
        ("24", "24.hu", "https://24.hu/rss"),
        ("forbes", "Forbes", "https://forbes.hu/rss"),
        ("magyarnarancs", "Magyar Narancs", "https://magyarnarancs.hu/rss"),
        ("mfor", "Menedzsment Fórum", "https://mfor.hu/rss"),
        ("quibit", "Quibit", "https://qubit.hu/feed"),
        (
            "szabadeuropa",
            "Szabad Európa",
            "https://www.szabadeuropa.hu/api/zppymql-vomx-tpe_jtmr",
        ),
        ("transtelex", "Transtelex", "https://transtelex.ro/rss"),
        ("g7", "G7", "https://g7.hu/rss"),
        ("lakmusz", "Lakmusz", "https://lakmusz.hu/rss"),
        ("media1", "Média1", "https://media1.hu/rss"),
        ("atlatszo", "Átlátszó", "https://atlatszo.hu/feed/"),
        ("merce", "Mérce", "https://merce.hu/rss"),
        ("rtl", "RTL", "https://rss.rtl.hu/"),
        (
            "theguardian",
            "The Guardian",
            "https://www.theguardian.com/international/rss",
        ),
        ("jogaszvilag", "Jogászvilág", "https://jogaszvilag.hu/feed/"),
        ("ignhu", "IGN Hungary", "https://hu.ign.com/feed.xml"),
        ("portfolio", "Portfolio", "https://www.portfolio.hu/rss/gazdasag.xml"),
        ("hwsw", "HWSW", "https://www.hwsw.hu/feed"),
    ]
    .into_iter()
    .map(|(id, name, url)| SourceDescriptor::new(id, name, url))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry::new(vec![
            SourceDescriptor::new("a", "A", "https://a.example/rss"),
            SourceDescriptor::new("b", "B", "https://b.example/rss"),
            SourceDescriptor::new("c", "C", "https://c.example/rss"),
        ])
    }

    fn ids(sources: &[SourceDescriptor]) -> Vec<&str> {
        sources.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_select_without_filter_returns_all() {
        assert_eq!(ids(&registry().select(None)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_select_with_matching_filter() {
        let filter = vec!["c".to_string(), "a".to_string()];
        assert_eq!(ids(&registry().select(Some(&filter))), vec!["a", "c"]);
    }

    #[test]
    fn test_select_ignores_unknown_ids_when_some_match() {
        let filter = vec!["zzz".to_string(), "b".to_string()];
        assert_eq!(ids(&registry().select(Some(&filter))), vec!["b"]);
    }

    #[test]
    fn test_select_falls_back_to_all_when_nothing_matches() {
        let filter = vec!["badid1".to_string(), "badid2".to_string()];
        assert_eq!(ids(&registry().select(Some(&filter))), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_default_sources_have_unique_ids() {
        let sources = default_sources();
        let mut seen = std::collections::HashSet::new();
        for source in &sources {
            assert!(seen.insert(source.id.clone()), "duplicate id {}", source.id);
            assert!(source.url.starts_with("https://"));
        }
        assert_eq!(SourceRegistry::default().len(), sources.len());
    }
}
