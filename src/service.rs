// Repository feed service.
// The single entry point for reading the listing: stale-while-revalidate over the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheStore, ListingSnapshot};
use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::github::{GitHubClient, UpstreamQuota};
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use crate::refresh::{RefreshFailure, RefreshScheduler};
use crate::upstream::RepositorySource;

/// Observability data returned alongside every listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telemetry {
    pub cache_age: Duration,
    /// Time until the background refresh is next due.
    pub next_refresh_in: Duration,
    pub rate_limit: RateLimitStatus,
    /// Quota as last reported by GitHub itself, when known.
    pub upstream_quota: Option<UpstreamQuota>,
    pub last_failure: Option<RefreshFailure>,
}

/// A snapshot plus the telemetry observed when it was served.
#[derive(Debug, Clone)]
pub struct Listing {
    pub snapshot: Arc<ListingSnapshot>,
    pub telemetry: Telemetry,
}

/// Owns the cache, the rate limiter and the refresh scheduler for one owner.
pub struct RepoFeed {
    owner: String,
    cache_duration: Duration,
    limiter: Arc<RateLimiter>,
    store: Arc<CacheStore>,
    scheduler: RefreshScheduler,
    client: Option<Arc<GitHubClient>>,
}

impl RepoFeed {
    /// Build a feed backed by the GitHub API.
    pub fn new(config: &Config) -> std::result::Result<Self, ConfigError> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_limit_window));
        let client = Arc::new(GitHubClient::new(config, Arc::clone(&limiter))?);

        let mut feed = Self::with_source(config, client.clone(), limiter);
        feed.client = Some(client);
        Ok(feed)
    }

    /// Build a feed over any source. `limiter` is only used for telemetry;
    /// admission is the source's responsibility.
    pub fn with_source(
        config: &Config,
        source: Arc<dyn RepositorySource>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let store = Arc::new(CacheStore::new());
        let scheduler = RefreshScheduler::new(
            source,
            Arc::clone(&store),
            config.owner.clone(),
            config.manifest_path.clone(),
            config.refresh_interval,
        );

        Self {
            owner: config.owner.clone(),
            cache_duration: config.cache_duration,
            limiter,
            store,
            scheduler,
            client: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the current listing.
    ///
    /// Blocks on the first refresh when nothing is cached. A stale snapshot is
    /// returned immediately while a refresh runs in the background; a fresh one
    /// is returned without touching the upstream.
    pub async fn get_listing(&self) -> Result<Listing> {
        self.get_listing_at(Utc::now()).await
    }

    pub async fn get_listing_at(&self, now: DateTime<Utc>) -> Result<Listing> {
        let snapshot = match self.store.read() {
            None => {
                debug!(owner = %self.owner, "no cached listing, waiting for first refresh");
                self.scheduler.refresh().await?
            }
            Some(snapshot) if snapshot.is_expired(self.cache_duration, now) => {
                debug!(
                    owner = %self.owner,
                    age_secs = snapshot.age(now).as_secs(),
                    "cached listing is stale, refreshing in background"
                );
                drop(self.scheduler.start());
                snapshot
            }
            Some(snapshot) => snapshot,
        };

        let telemetry = self.telemetry_for(&snapshot, now);
        Ok(Listing {
            snapshot,
            telemetry,
        })
    }

    /// The cached snapshot without triggering anything.
    pub fn snapshot(&self) -> Option<Arc<ListingSnapshot>> {
        self.store.read()
    }

    pub fn rate_limit(&self) -> RateLimitStatus {
        self.limiter.status()
    }

    pub fn is_refreshing(&self) -> bool {
        self.scheduler.is_in_flight()
    }

    pub fn last_failure(&self) -> Option<RefreshFailure> {
        self.scheduler.last_failure()
    }

    /// Start the periodic refresh owned by this feed.
    pub fn spawn_background_refresh(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.scheduler.spawn_periodic(cancel)
    }

    fn telemetry_for(&self, snapshot: &ListingSnapshot, now: DateTime<Utc>) -> Telemetry {
        let cache_age = snapshot.age(now);
        Telemetry {
            cache_age,
            next_refresh_in: self.scheduler.interval().saturating_sub(cache_age),
            rate_limit: self.limiter.status_at(now),
            upstream_quota: self.client.as_ref().and_then(|c| c.upstream_quota()),
            last_failure: self.scheduler.last_failure(),
        }
    }
}
