// In-memory listing cache.
// Holds the latest snapshot behind an atomically swapped pointer.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::github::EnrichedItem;

/// Result of one complete refresh. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingSnapshot {
    /// Enriched items in listing order.
    pub items: Vec<EnrichedItem>,
    /// When the refresh that built this snapshot finished.
    pub produced_at: DateTime<Utc>,
}

impl ListingSnapshot {
    pub fn new(items: Vec<EnrichedItem>, produced_at: DateTime<Utc>) -> Self {
        Self { items, produced_at }
    }

    /// Age of this snapshot at `now`. Zero if `now` precedes it.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.produced_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Check if this snapshot is older than `ttl` at `now`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > ttl
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Holder of the current snapshot.
///
/// Readers get an `Arc` to whichever snapshot was current when they read; a
/// concurrent `replace` never exposes a partially built one.
#[derive(Debug, Default)]
pub struct CacheStore {
    current: ArcSwapOption<ListingSnapshot>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, if a refresh has ever succeeded.
    pub fn read(&self) -> Option<Arc<ListingSnapshot>> {
        self.current.load_full()
    }

    /// Publish a new snapshot, returning the one it replaced.
    pub fn replace(&self, snapshot: Arc<ListingSnapshot>) -> Option<Arc<ListingSnapshot>> {
        self.current.swap(Some(snapshot))
    }

    /// Stale when empty or when the snapshot is older than `ttl`.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.read().is_none_or(|snapshot| snapshot.is_expired(ttl, now))
    }
}
