// GitHub API HTTP client.
// Handles authentication, outbound rate limiting, and response status mapping.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::{
    Client, Response,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ConfigError, FeedError, Result};
use crate::rate_limit::RateLimiter;

use super::types::UpstreamQuota;

const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT_VALUE: &str = concat!("repofeed/", env!("CARGO_PKG_VERSION"));

/// Error body GitHub returns alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// GitHub API client. Every request passes the shared [`RateLimiter`] first.
#[derive(Debug)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    limiter: Arc<RateLimiter>,
    upstream_quota: Mutex<Option<UpstreamQuota>>,
}

impl GitHubClient {
    /// Create a client for the configured API base and credentials.
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> std::result::Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                ConfigError::Invalid {
                    key: "GITHUB_TOKEN",
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            limiter,
            upstream_quota: Mutex::new(None),
        })
    }

    /// The limiter this client admits requests through.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Quota last reported by GitHub's `x-ratelimit-*` headers.
    pub fn upstream_quota(&self) -> Option<UpstreamQuota> {
        *self
            .upstream_quota
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a GET request to the GitHub API.
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        self.get_with_params(endpoint, &[] as &[(&str, &str)]).await
    }

    /// Make a GET request with query parameters.
    ///
    /// Fails with [`FeedError::RateLimited`] without touching the network when
    /// the local quota is exhausted.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<Response> {
        let decision = self.limiter.try_consume();
        if !decision.allowed {
            return Err(FeedError::RateLimited {
                reset_in: decision.reset_in,
            });
        }

        let url = format!("{}{}", self.api_base, endpoint);
        debug!(%url, remaining = decision.remaining, "GET");

        let response = self.client.get(&url).query(params).send().await?;

        self.update_upstream_quota(&response);
        self.check_response(response).await
    }

    /// Record rate limit state reported by GitHub.
    fn update_upstream_quota(&self, response: &Response) {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };

        let (Some(limit), Some(remaining)) =
            (header("x-ratelimit-limit"), header("x-ratelimit-remaining"))
        else {
            return;
        };
        let quota = UpstreamQuota {
            limit,
            remaining,
            reset: header("x-ratelimit-reset").unwrap_or_default(),
        };

        if quota.remaining == 0 {
            warn!(limit, reset = quota.reset, "GitHub reports its rate limit exhausted");
        }
        *self
            .upstream_quota
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(quota);
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        let message = if message.is_empty() {
            format!("{} returned {}", url, status)
        } else {
            format!("{}: {}", url, message)
        };

        Err(FeedError::Upstream {
            status: Some(status.as_u16()),
            message,
        })
    }
}
