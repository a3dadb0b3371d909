// Listing enrichment.
// Adds language and dependency data to each repository; secondary failures never escape.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::github::{EnrichedItem, LanguageStats, ListingItem};
use crate::upstream::RepositorySource;

/// Issues the secondary fetches for listing items.
#[derive(Clone)]
pub struct Enricher {
    source: Arc<dyn RepositorySource>,
    owner: String,
    manifest_path: String,
}

impl Enricher {
    pub fn new(
        source: Arc<dyn RepositorySource>,
        owner: impl Into<String>,
        manifest_path: impl Into<String>,
    ) -> Self {
        Self {
            source,
            owner: owner.into(),
            manifest_path: manifest_path.into(),
        }
    }

    /// Enrich one item. A failed fetch leaves its collection empty.
    pub async fn enrich(&self, item: ListingItem) -> EnrichedItem {
        let (languages, dependencies) =
            tokio::join!(self.languages(&item.name), self.dependencies(&item.name));

        EnrichedItem {
            item,
            languages,
            dependencies,
        }
    }

    /// Enrich every item concurrently, keeping listing order.
    ///
    /// Concurrency is bounded only by the outbound rate limiter.
    pub async fn enrich_all(&self, items: Vec<ListingItem>) -> Vec<EnrichedItem> {
        join_all(items.into_iter().map(|item| self.enrich(item))).await
    }

    async fn languages(&self, repo: &str) -> LanguageStats {
        match self.source.fetch_languages(&self.owner, repo).await {
            Ok(languages) => languages,
            Err(e) => {
                warn!(repo, error = %e, "language fetch failed, leaving languages empty");
                LanguageStats::new()
            }
        }
    }

    async fn dependencies(&self, repo: &str) -> BTreeSet<String> {
        match self
            .source
            .fetch_manifest(&self.owner, repo, &self.manifest_path)
            .await
        {
            Ok(Some(manifest)) => manifest.dependency_names(),
            Ok(None) => {
                debug!(repo, path = %self.manifest_path, "no manifest");
                BTreeSet::new()
            }
            Err(e) => {
                warn!(repo, error = %e, "manifest fetch failed, leaving dependencies empty");
                BTreeSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FeedError, Result};
    use crate::github::Manifest;
    use crate::testing::{FakeSource, item};
    use async_trait::async_trait;
    use std::time::Duration;

    #[tokio::test]
    async fn test_enrich_merges_secondary_data() {
        let source = FakeSource::new(vec![item(1, "api")]);
        let enricher = Enricher::new(Arc::new(source), "octocat", "package.json");

        let enriched = enricher.enrich(item(1, "api")).await;

        assert_eq!(enriched.item.name, "api");
        assert_eq!(enriched.languages.get("Rust"), Some(&1000));
        assert!(enriched.dependencies.contains("serde"));
    }

    struct FailingSource;

    #[async_trait]
    impl RepositorySource for FailingSource {
        async fn fetch_listing(&self, _owner: &str) -> Result<Vec<ListingItem>> {
            unreachable!("enricher never fetches the listing")
        }

        async fn fetch_languages(&self, _owner: &str, _repo: &str) -> Result<LanguageStats> {
            Err(FeedError::Upstream {
                status: Some(500),
                message: "boom".into(),
            })
        }

        async fn fetch_manifest(
            &self,
            _owner: &str,
            _repo: &str,
            _path: &str,
        ) -> Result<Option<Manifest>> {
            Err(FeedError::RateLimited {
                reset_in: Duration::from_secs(60),
            })
        }
    }

    #[tokio::test]
    async fn test_enrich_never_fails() {
        let enricher = Enricher::new(Arc::new(FailingSource), "octocat", "package.json");

        let enriched = enricher.enrich(item(7, "broken")).await;

        assert_eq!(enriched, EnrichedItem::bare(item(7, "broken")));
    }

    #[tokio::test]
    async fn test_missing_manifest_yields_empty_dependencies() {
        let source = FakeSource::new(vec![]).without_manifests();
        let enricher = Enricher::new(Arc::new(source), "octocat", "package.json");

        let enriched = enricher.enrich(item(3, "docs")).await;

        assert!(enriched.dependencies.is_empty());
        assert!(!enriched.languages.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_all_preserves_order() {
        let items: Vec<_> = (0..20).map(|i| item(i, &format!("repo-{i}"))).collect();
        let source = FakeSource::new(items.clone());
        let enricher = Enricher::new(Arc::new(source), "octocat", "package.json");

        let enriched = enricher.enrich_all(items).await;

        let names: Vec<_> = enriched.iter().map(|e| e.item.name.clone()).collect();
        let expected: Vec<_> = (0..20).map(|i| format!("repo-{i}")).collect();
        assert_eq!(names, expected);
    }
}
