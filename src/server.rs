// HTTP surface for the repository feed.
// Serves the cached listing with cache and rate limit headers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{ConfigError, FeedError};
use crate::github::{EnrichedItem, LanguageStats};
use crate::service::{Listing, RepoFeed};

const NO_DESCRIPTION: &str = "No description available";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesResponse {
    pub success: bool,
    pub data: Vec<RepositoryView>,
    pub status: u16,
    pub cached: bool,
    pub last_update: DateTime<Utc>,
    pub rate_limit: RateLimitView,
}

#[derive(Debug, Serialize)]
pub struct RateLimitView {
    pub limit: u32,
    pub used: u32,
    /// Window reset as milliseconds since the Unix epoch.
    pub reset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryView {
    pub id: u64,
    pub name: String,
    /// Homepage when set, otherwise the repository page.
    pub website: String,
    pub description: String,
    pub stars: u64,
    pub language: Option<String>,
    pub last_update: DateTime<Utc>,
    pub url: String,
    pub topics: Vec<String>,
    pub technologies: Technologies,
    /// Bytes per language, in the same order as `technologies.languages`.
    pub language_stats: LanguageStats,
}

#[derive(Debug, Serialize)]
pub struct Technologies {
    /// Languages by byte count, largest first.
    pub languages: Vec<String>,
    pub dependencies: Vec<String>,
    pub topics: Vec<String>,
}

impl From<&EnrichedItem> for RepositoryView {
    fn from(enriched: &EnrichedItem) -> Self {
        let item = &enriched.item;

        let mut language_stats = enriched.languages.clone();
        language_stats.sort_by(|a_name, a_bytes, b_name, b_bytes| {
            b_bytes.cmp(a_bytes).then_with(|| a_name.cmp(b_name))
        });

        Self {
            id: item.id,
            name: item.name.clone(),
            website: item.homepage.clone().unwrap_or_else(|| item.url.clone()),
            description: item
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            stars: item.stars,
            language: item.language.clone(),
            last_update: item.updated_at,
            url: item.url.clone(),
            topics: item.topics.clone(),
            technologies: Technologies {
                languages: language_stats.keys().cloned().collect(),
                dependencies: enriched.dependencies.iter().cloned().collect(),
                topics: item.topics.clone(),
            },
            language_stats,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub owner: String,
    pub items: Option<usize>,
    pub last_update: Option<DateTime<Utc>>,
    pub refreshing: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Starting,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the router. `cors_origin` restricts cross-origin access to one frontend.
pub fn router(feed: Arc<RepoFeed>, cors_origin: Option<&str>) -> Result<Router, ConfigError> {
    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/github/repositories", get(repositories))
        .with_state(feed);

    if let Some(origin) = cors_origin {
        let origin = HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
            key: "cors_origin",
            reason: e.to_string(),
        })?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT, AUTHORIZATION])
                .allow_credentials(true),
        );
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}

async fn root() -> &'static str {
    "Backend API is running"
}

async fn health(State(feed): State<Arc<RepoFeed>>) -> impl IntoResponse {
    let snapshot = feed.snapshot();
    let last_failure = feed.last_failure();

    let status = match (&snapshot, &last_failure) {
        (None, _) => HealthStatus::Starting,
        (Some(_), Some(_)) => HealthStatus::Degraded,
        (Some(_), None) => HealthStatus::Ok,
    };
    let code = if status == HealthStatus::Starting {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = HealthResponse {
        status,
        owner: feed.owner().to_string(),
        items: snapshot.as_ref().map(|s| s.len()),
        last_update: snapshot.as_ref().map(|s| s.produced_at),
        refreshing: feed.is_refreshing(),
        last_error: last_failure.map(|f| f.error.to_string()),
    };
    (code, Json(body))
}

async fn repositories(State(feed): State<Arc<RepoFeed>>) -> Response {
    match feed.get_listing().await {
        Ok(listing) => listing_response(&listing),
        Err(e) => {
            error!(owner = feed.owner(), error = %e, "failed to serve repository listing");
            error_response(&e)
        }
    }
}

fn listing_response(listing: &Listing) -> Response {
    let telemetry = &listing.telemetry;

    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };
    put("x-cache-age", format!("{}s", telemetry.cache_age.as_secs()));
    put(
        "x-next-update",
        format!("{}s", telemetry.next_refresh_in.as_secs()),
    );
    put("x-rate-limit", telemetry.rate_limit.limit.to_string());
    put("x-rate-limit-used", telemetry.rate_limit.used.to_string());
    put(
        "x-rate-limit-reset",
        format!("{}s", telemetry.rate_limit.reset_in.as_secs()),
    );

    let body = RepositoriesResponse {
        success: true,
        data: listing.snapshot.items.iter().map(RepositoryView::from).collect(),
        status: StatusCode::OK.as_u16(),
        cached: true,
        last_update: listing.snapshot.produced_at,
        rate_limit: RateLimitView {
            limit: telemetry.rate_limit.limit,
            used: telemetry.rate_limit.used,
            reset: telemetry.rate_limit.reset_at.timestamp_millis(),
        },
    };

    (StatusCode::OK, headers, Json(body)).into_response()
}

fn error_response(err: &FeedError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    if let FeedError::RateLimited { reset_in } = err {
        headers.insert(RETRY_AFTER, HeaderValue::from(reset_in.as_secs()));
    }

    let body = ErrorResponse {
        success: false,
        error: "Failed to fetch GitHub repositories",
        message: err.to_string(),
        status: status.as_u16(),
    };
    (status, headers, Json(body)).into_response()
}
