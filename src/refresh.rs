// Refresh scheduling.
// Runs at most one listing refresh at a time and drives the periodic background refresh.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{CacheStore, ListingSnapshot};
use crate::enrich::Enricher;
use crate::error::{FeedError, Result};
use crate::upstream::RepositorySource;

/// Eventual result of one refresh attempt, shared by everyone waiting on it.
pub type RefreshOutcome = Result<Arc<ListingSnapshot>>;

/// Handle to an in-flight attempt. Awaiting it is optional; the attempt runs
/// to completion on its own task either way.
pub type RefreshAttempt = Shared<BoxFuture<'static, RefreshOutcome>>;

enum RefreshState {
    Idle,
    InFlight(RefreshAttempt),
}

/// Returns the scheduler to `Idle` when an attempt ends, including by panic.
struct IdleOnDrop<'a>(&'a Mutex<RefreshState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = RefreshState::Idle;
    }
}

/// The most recent failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub at: DateTime<Utc>,
    pub error: FeedError,
}

struct Inner {
    source: Arc<dyn RepositorySource>,
    enricher: Enricher,
    owner: String,
    store: Arc<CacheStore>,
    interval: Duration,
    state: Mutex<RefreshState>,
    last_failure: Mutex<Option<RefreshFailure>>,
}

/// Serializes refreshes of the listing cache.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn RepositorySource>,
        store: Arc<CacheStore>,
        owner: impl Into<String>,
        manifest_path: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let owner = owner.into();
        let enricher = Enricher::new(Arc::clone(&source), owner.clone(), manifest_path);
        Self {
            inner: Arc::new(Inner {
                source,
                enricher,
                owner,
                store,
                interval,
                state: Mutex::new(RefreshState::Idle),
                last_failure: Mutex::new(None),
            }),
        }
    }

    /// Start a refresh, or join the one already in flight.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> RefreshAttempt {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let RefreshState::InFlight(attempt) = &*state {
            return attempt.clone();
        }

        let attempt = Arc::clone(&self.inner).run().boxed().shared();
        *state = RefreshState::InFlight(attempt.clone());
        drop(state);

        tokio::spawn(attempt.clone());
        attempt
    }

    /// Start or join a refresh and wait for its outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.start().await
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            *self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            RefreshState::InFlight(_)
        )
    }

    /// The last failure, cleared by the next successful refresh.
    pub fn last_failure(&self) -> Option<RefreshFailure> {
        self.inner
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Period of the background refresh.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Refresh immediately and then every `interval` until `cancel` fires.
    pub fn spawn_periodic(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        let period = self.inner.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "background refresh started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    // Outcome is logged by the attempt itself.
                    _ = scheduler.refresh() => {}
                }
            }

            info!("background refresh stopped");
        })
    }
}

impl Inner {
    async fn run(self: Arc<Self>) -> RefreshOutcome {
        let idle = IdleOnDrop(&self.state);
        let started = Instant::now();
        let result = self.build_snapshot().await;

        match &result {
            Ok(snapshot) => {
                self.store.replace(Arc::clone(snapshot));
                *self
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                info!(
                    owner = %self.owner,
                    items = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "repository listing refreshed"
                );
            }
            Err(e) => {
                *self
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(RefreshFailure {
                    at: Utc::now(),
                    error: e.clone(),
                });
                warn!(
                    owner = %self.owner,
                    error = %e,
                    "repository refresh failed, keeping previous snapshot"
                );
            }
        }

        drop(idle);
        result
    }

    async fn build_snapshot(&self) -> RefreshOutcome {
        let items = self.source.fetch_listing(&self.owner).await?;
        let enriched = self.enricher.enrich_all(items).await;
        Ok(Arc::new(ListingSnapshot::new(enriched, Utc::now())))
    }
}
