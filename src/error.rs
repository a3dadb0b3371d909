// Error types for repofeed.
// Core feed errors are cloneable so one refresh outcome can be handed to every waiter.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Rate limit exceeded, resets in {}s", .reset_in.as_secs())]
    RateLimited { reset_in: Duration },

    #[error("GitHub API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

impl FeedError {
    /// HTTP status a serving layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            FeedError::RateLimited { .. } => 429,
            FeedError::Upstream {
                status: Some(status),
                ..
            } => *status,
            FeedError::Upstream { status: None, .. } | FeedError::Decode(_) => 500,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FeedError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FeedError::Decode(err.to_string());
        }
        FeedError::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors raised while assembling configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing GITHUB_USERNAME (or `owner` in the config file)")]
    MissingOwner,

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
