// repofeed: a self-refreshing, rate-limited cache of a GitHub owner's repositories.
// Each repository is enriched with its language breakdown and manifest dependencies.

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod github;
pub mod rate_limit;
pub mod refresh;
pub mod server;
pub mod service;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ConfigError, FeedError, Result};
pub use service::{Listing, RepoFeed, Telemetry};
