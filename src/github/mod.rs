// GitHub API module.
// Provides the rate-limited client and types for the repository listing endpoints.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::GitHubClient;
pub use types::*;
