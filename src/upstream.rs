// Upstream data source contract.
// The enricher and refresh scheduler only see this trait, never the HTTP client.

use async_trait::async_trait;

use crate::error::Result;
use crate::github::{LanguageStats, ListingItem, Manifest};

/// The three read-only fetches a refresh is built from.
///
/// Implementations must pass every call through the outbound rate limiter and
/// must not retry.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Fetch the base listing of `owner`'s repositories, in upstream order.
    async fn fetch_listing(&self, owner: &str) -> Result<Vec<ListingItem>>;

    /// Fetch the language breakdown of one repository.
    async fn fetch_languages(&self, owner: &str, repo: &str) -> Result<LanguageStats>;

    /// Fetch and parse one repository's dependency manifest.
    ///
    /// A missing manifest is `Ok(None)`, not an error.
    async fn fetch_manifest(&self, owner: &str, repo: &str, path: &str)
    -> Result<Option<Manifest>>;
}
