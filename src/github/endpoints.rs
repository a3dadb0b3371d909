// GitHub API endpoint functions.
// Typed wrappers for the listing, languages and contents endpoints.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FeedError, Result};
use crate::upstream::RepositorySource;

use super::client::GitHubClient;
use super::types::{ContentFile, LanguageStats, ListingItem, Manifest, Repository};

/// Repositories requested per listing call. Only the first page is read.
const LISTING_PAGE_SIZE: u32 = 100;

impl GitHubClient {
    /// Get public repositories of a user, most recently updated first.
    pub async fn get_user_repos(&self, owner: &str) -> Result<Vec<Repository>> {
        let params = [
            ("sort", "updated"),
            ("direction", "desc"),
            ("per_page", &LISTING_PAGE_SIZE.to_string()),
        ];
        let response = self
            .get_with_params(&format!("/users/{}/repos", owner), &params)
            .await?;
        let repos: Vec<Repository> = response.json().await?;
        Ok(repos)
    }

    /// Get the language breakdown (bytes per language) of a repository.
    pub async fn get_languages(&self, owner: &str, repo: &str) -> Result<LanguageStats> {
        let response = self
            .get(&format!("/repos/{}/{}/languages", owner, repo))
            .await?;
        let languages: LanguageStats = response.json().await?;
        Ok(languages)
    }

    /// Get a single file through the contents API.
    pub async fn get_contents(&self, owner: &str, repo: &str, path: &str) -> Result<ContentFile> {
        let response = self
            .get(&format!("/repos/{}/{}/contents/{}", owner, repo, path))
            .await?;
        let file: ContentFile = response.json().await?;
        Ok(file)
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn fetch_listing(&self, owner: &str) -> Result<Vec<ListingItem>> {
        let repos = self.get_user_repos(owner).await?;
        debug!(owner, count = repos.len(), "fetched repository listing");
        Ok(repos.into_iter().map(ListingItem::from).collect())
    }

    async fn fetch_languages(&self, owner: &str, repo: &str) -> Result<LanguageStats> {
        self.get_languages(owner, repo).await
    }

    async fn fetch_manifest(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Manifest>> {
        let file = match self.get_contents(owner, repo, path).await {
            Ok(file) => file,
            Err(FeedError::Upstream {
                status: Some(404), ..
            }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let manifest = Manifest::from_slice(&file.decode()?)?;
        Ok(Some(manifest))
    }
}
