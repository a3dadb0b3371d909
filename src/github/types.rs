// GitHub API response types and the listing records built from them.
// Wire structs deserialize REST responses; listing structs are what the cache serves.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine as _;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FeedError, Result};

/// GitHub repository as returned by `/users/{owner}/repos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub homepage: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// A file fetched through the contents API.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentFile {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

impl ContentFile {
    /// Decode the file body. GitHub wraps base64 content at 60 columns.
    pub fn decode(&self) -> Result<Vec<u8>> {
        match self.encoding.as_str() {
            "base64" => {
                let compact: String = self
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| FeedError::Decode(format!("{}: {}", self.path, e)))
            }
            "" | "utf-8" => Ok(self.content.clone().into_bytes()),
            other => Err(FeedError::Decode(format!(
                "{}: unsupported encoding {}",
                self.path, other
            ))),
        }
    }
}

/// Dependency manifest of a repository (`package.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(
        default,
        rename = "devDependencies",
        deserialize_with = "null_as_empty"
    )]
    pub dev_dependencies: BTreeMap<String, serde_json::Value>,
}

// Manifests in the wild carry `"dependencies": null`.
fn null_as_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Names of runtime and development dependencies combined.
    pub fn dependency_names(&self) -> BTreeSet<String> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .cloned()
            .collect()
    }
}

/// Language breakdown: language name to byte count, in the order GitHub
/// reports it (largest first).
pub type LanguageStats = IndexMap<String, u64>;

/// One repository of a listing, normalized from the upstream record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingItem {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub homepage: Option<String>,
    pub stars: u64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<Repository> for ListingItem {
    fn from(repo: Repository) -> Self {
        Self {
            id: repo.id,
            name: repo.name,
            description: repo.description,
            url: repo.html_url,
            // GitHub reports an unset homepage as either null or "".
            homepage: repo.homepage.filter(|h| !h.trim().is_empty()),
            stars: repo.stargazers_count,
            language: repo.language,
            topics: repo.topics,
            updated_at: repo.updated_at,
        }
    }
}

/// A listing item plus its secondary data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub item: ListingItem,
    /// Empty when the languages fetch failed.
    pub languages: LanguageStats,
    /// Empty when no manifest exists or it could not be fetched.
    pub dependencies: BTreeSet<String>,
}

impl EnrichedItem {
    /// An item whose enrichment yielded nothing.
    pub fn bare(item: ListingItem) -> Self {
        Self {
            item,
            languages: LanguageStats::new(),
            dependencies: BTreeSet::new(),
        }
    }
}

/// Rate limit information reported by GitHub in response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpstreamQuota {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}
