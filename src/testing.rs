// Test doubles shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{FeedError, Result};
use crate::github::{LanguageStats, ListingItem, Manifest};
use crate::upstream::RepositorySource;

pub fn item(id: u64, name: &str) -> ListingItem {
    ListingItem {
        id,
        name: name.to_string(),
        description: Some(format!("{name} description")),
        url: format!("https://github.com/octocat/{name}"),
        homepage: None,
        stars: id * 3,
        language: Some("Rust".to_string()),
        topics: vec!["cli".to_string()],
        updated_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
    }
}

/// In-memory source that counts listing calls.
pub struct FakeSource {
    items: Mutex<Vec<ListingItem>>,
    fail_listing: AtomicBool,
    manifests: bool,
    listing_delay: Duration,
    listing_calls: AtomicUsize,
    active_listings: AtomicUsize,
    max_active_listings: AtomicUsize,
}

impl FakeSource {
    pub fn new(items: Vec<ListingItem>) -> Self {
        Self {
            items: Mutex::new(items),
            fail_listing: AtomicBool::new(false),
            manifests: true,
            listing_delay: Duration::ZERO,
            listing_calls: AtomicUsize::new(0),
            active_listings: AtomicUsize::new(0),
            max_active_listings: AtomicUsize::new(0),
        }
    }

    pub fn without_manifests(mut self) -> Self {
        self.manifests = false;
        self
    }

    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_listing.store(failing, Ordering::SeqCst);
    }

    pub fn set_items(&self, items: Vec<ListingItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_listings(&self) -> usize {
        self.max_active_listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySource for FakeSource {
    async fn fetch_listing(&self, _owner: &str) -> Result<Vec<ListingItem>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_listings.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_listings.fetch_max(active, Ordering::SeqCst);

        if !self.listing_delay.is_zero() {
            tokio::time::sleep(self.listing_delay).await;
        }
        self.active_listings.fetch_sub(1, Ordering::SeqCst);

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(FeedError::Upstream {
                status: Some(503),
                message: "service unavailable".into(),
            });
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn fetch_languages(&self, _owner: &str, _repo: &str) -> Result<LanguageStats> {
        Ok(LanguageStats::from([("Rust".to_string(), 1000)]))
    }

    async fn fetch_manifest(
        &self,
        _owner: &str,
        _repo: &str,
        _path: &str,
    ) -> Result<Option<Manifest>> {
        if !self.manifests {
            return Ok(None);
        }
        Manifest::from_slice(br#"{"dependencies":{"serde":"1"}}"#).map(Some)
    }
}
