// Runtime configuration.
// Merges built-in defaults, an optional TOML file, and environment variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_MANIFEST_PATH: &str = "package.json";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:3001";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// Fully resolved configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Owner whose repositories are listed.
    pub owner: String,
    /// Bearer token for the GitHub API, if any.
    pub token: Option<String>,
    pub api_base: String,
    /// Age after which the cached listing is considered stale.
    pub cache_duration: Duration,
    /// Period of the background refresh.
    pub refresh_interval: Duration,
    /// Outbound calls admitted per window.
    pub rate_limit: u32,
    pub rate_limit_window: Duration,
    pub request_timeout: Duration,
    /// Repository path of the dependency manifest.
    pub manifest_path: String,
    pub listen: SocketAddr,
    /// Frontend origin allowed by CORS. Unset means no CORS headers.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Defaults for `owner`, tuned to whether a token is available.
    ///
    /// Authenticated: 5 minute cache, 15 minute refresh, 5000 calls/hour.
    /// Unauthenticated: 1 hour cache, 1 hour refresh, 60 calls/hour.
    pub fn new(owner: impl Into<String>, token: Option<String>) -> Self {
        let authenticated = token.is_some();
        Self {
            owner: owner.into(),
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            cache_duration: Duration::from_secs(if authenticated { 5 * MINUTE } else { HOUR }),
            refresh_interval: Duration::from_secs(if authenticated { 15 * MINUTE } else { HOUR }),
            rate_limit: if authenticated { 5000 } else { 60 },
            rate_limit_window: Duration::from_secs(HOUR),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            listen: SocketAddr::from(([0, 0, 0, 0], 3001)),
            cors_origin: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Load from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge file values with variables from `env`; the environment wins.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let owner = env("GITHUB_USERNAME")
            .or(file.owner)
            .filter(|o| !o.trim().is_empty())
            .ok_or(ConfigError::MissingOwner)?;
        let token = env("GITHUB_TOKEN").or(file.token.filter(|t| !t.trim().is_empty()));

        let mut config = Config::new(owner, token);

        if let Some(base) = env("GITHUB_API_BASE").or(file.api_base) {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = secs_setting(&env, "REPOFEED_CACHE_SECS", file.cache_duration_secs)? {
            config.cache_duration = secs;
        }
        if let Some(secs) =
            secs_setting(&env, "REPOFEED_REFRESH_SECS", file.refresh_interval_secs)?
        {
            config.refresh_interval = secs;
        }
        if let Some(limit) = parse_setting::<u32>(&env, "REPOFEED_RATE_LIMIT")?.or(file.rate_limit)
        {
            config.rate_limit = limit;
        }
        if let Some(secs) =
            secs_setting(&env, "REPOFEED_RATE_WINDOW_SECS", file.rate_limit_window_secs)?
        {
            config.rate_limit_window = secs;
        }
        if let Some(secs) =
            secs_setting(&env, "REPOFEED_TIMEOUT_SECS", file.request_timeout_secs)?
        {
            config.request_timeout = secs;
        }
        if let Some(path) = env("REPOFEED_MANIFEST_PATH").or(file.manifest_path) {
            config.manifest_path = path.trim_start_matches('/').to_string();
        }
        if let Some(port) = parse_setting::<u16>(&env, "PORT")? {
            config.listen.set_port(port);
        } else if let Some(listen) = file.listen {
            config.listen = listen.parse().map_err(|e| ConfigError::Invalid {
                key: "listen",
                reason: format!("{listen}: {e}"),
            })?;
        }
        config.cors_origin = env("REPOFEED_CORS_ORIGIN").or(file.cors_origin);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = |key: &'static str, value: Duration| {
            if value.is_zero() {
                Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };

        if self.rate_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "rate_limit",
                reason: "must be greater than zero".into(),
            });
        }
        nonzero("rate_limit_window_secs", self.rate_limit_window)?;
        nonzero("cache_duration_secs", self.cache_duration)?;
        nonzero("refresh_interval_secs", self.refresh_interval)?;
        nonzero("request_timeout_secs", self.request_timeout)?;

        if self.manifest_path.is_empty() {
            return Err(ConfigError::Invalid {
                key: "manifest_path",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Shape of the optional TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub owner: Option<String>,
    pub token: Option<String>,
    pub api_base: Option<String>,
    pub cache_duration_secs: Option<u64>,
    pub refresh_interval_secs: Option<u64>,
    pub rate_limit: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub manifest_path: Option<String>,
    pub listen: Option<String>,
    pub cors_origin: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_setting<T>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("{raw}: {e}"),
            })
        })
        .transpose()
}

fn secs_setting(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    file_value: Option<u64>,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_setting::<u64>(env, key)?
        .or(file_value)
        .map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_unauthenticated_defaults() {
        let config =
            Config::resolve(FileConfig::default(), env_of(&[("GITHUB_USERNAME", "octocat")]))
                .unwrap();

        assert_eq!(config.owner, "octocat");
        assert!(!config.is_authenticated());
        assert_eq!(config.rate_limit, 60);
        assert_eq!(config.cache_duration, Duration::from_secs(3600));
        assert_eq!(config.refresh_interval, Duration::from_secs(3600));
        assert_eq!(config.rate_limit_window, Duration::from_secs(3600));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
    }

    #[test]
    fn test_authenticated_defaults() {
        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("GITHUB_USERNAME", "octocat"), ("GITHUB_TOKEN", "ghp_x")]),
        )
        .unwrap();

        assert!(config.is_authenticated());
        assert_eq!(config.rate_limit, 5000);
        assert_eq!(config.cache_duration, Duration::from_secs(300));
        assert_eq!(config.refresh_interval, Duration::from_secs(900));
    }

    #[test]
    fn test_blank_token_is_unauthenticated() {
        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("GITHUB_USERNAME", "octocat"), ("GITHUB_TOKEN", "  ")]),
        )
        .unwrap();
        assert!(!config.is_authenticated());
    }

    #[test]
    fn test_missing_owner() {
        let err = Config::resolve(FileConfig::default(), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOwner));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
owner = "from-file"
cache_duration_secs = 120
rate_limit = 10
manifest_path = "/web/package.json"
listen = "127.0.0.1:8080"
"#
        )
        .unwrap();

        let file_config = FileConfig::read(file.path()).unwrap();
        let config = Config::resolve(
            file_config,
            env_of(&[("GITHUB_USERNAME", "from-env"), ("REPOFEED_RATE_LIMIT", "25")]),
        )
        .unwrap();

        assert_eq!(config.owner, "from-env");
        assert_eq!(config.rate_limit, 25);
        assert_eq!(config.cache_duration, Duration::from_secs(120));
        assert_eq!(config.manifest_path, "web/package.json");
        assert_eq!(config.listen.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_port_env_sets_listen_port() {
        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("GITHUB_USERNAME", "octocat"), ("PORT", "4000")]),
        )
        .unwrap();
        assert_eq!(config.listen.port(), 4000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::resolve(
            FileConfig::default(),
            env_of(&[("GITHUB_USERNAME", "octocat"), ("REPOFEED_RATE_LIMIT", "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "rate_limit", .. }));

        let err = Config::resolve(
            FileConfig::default(),
            env_of(&[("GITHUB_USERNAME", "octocat"), ("REPOFEED_CACHE_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REPOFEED_CACHE_SECS", .. }));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ownr = \"typo\"").unwrap();

        let err = FileConfig::read(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }
}
