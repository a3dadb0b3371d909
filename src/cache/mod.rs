// Cache module for the enriched repository listing.
// Snapshots live in memory only and are replaced whole on every refresh.

pub mod store;

pub use store::{CacheStore, ListingSnapshot};
