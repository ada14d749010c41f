//! TOML configuration model.
//!
//! ```toml
//! [http]
//! host = "127.0.0.1:7400"
//!
//! [repos.movies]
//! name = "Movies"
//! path = "/srv/media/movies"
//! index_path = "/var/lib/reelvault/movies.json"
//! cache_path = "/var/cache/reelvault/movies"
//! capabilities = ["watch", "remux"]
//!
//! [repos.movies.sources.analysis.tmdb]
//! key = "..."
//! ```
//!
//! The `index` capability is not listed explicitly; it is inferred from
//! `index_path` being set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Struct representation of the TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// The `[http]` section.
    #[serde(default)]
    pub http: HttpConfig,

    /// Repository configurations, keyed by repository ID.
    #[serde(default)]
    pub repos: HashMap<String, RepoConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Listen address, e.g. `"127.0.0.1:7400"`.
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "127.0.0.1:7400".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

/// A capability a repository can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityId {
    Watch,
    Remux,
    Transcode,
}

/// A single repository configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepoConfig {
    /// Display name, may be empty.
    #[serde(default)]
    pub name: String,

    /// Root directory of the repository.
    pub path: PathBuf,

    /// Index file location; setting it enables the index capability.
    #[serde(default)]
    pub index_path: Option<PathBuf>,

    /// Remux/transcode cache location; required with those capabilities.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Configured capabilities.
    #[serde(default)]
    pub capabilities: Vec<CapabilityId>,

    /// Metadata source configuration.
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl RepoConfig {
    /// Whether a capability is listed in the configuration.
    pub fn capable(&self, capability: CapabilityId) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Metadata source table.
///
/// Sources compose most-specific-first: analysis, then tmdb, then literal.
/// An empty table yields the dummy source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Literal source: bare metadata out of file names and queries.
    #[serde(default)]
    pub literal: Option<LiteralSourceConfig>,

    /// File-analysis source wrapping a nested source table.
    #[serde(default)]
    pub analysis: Option<Box<SourcesConfig>>,

    /// The Movie Database source.
    #[serde(default)]
    pub tmdb: Option<TmdbSourceConfig>,
}

impl SourcesConfig {
    /// Whether no source is configured at this level.
    pub fn is_empty(&self) -> bool {
        self.literal.is_none() && self.analysis.is_none() && self.tmdb.is_none()
    }
}

/// Marker table for the literal source; it has no options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LiteralSourceConfig {}

/// TMDB source options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbSourceConfig {
    /// API key.
    pub key: String,

    /// API base URL.
    #[serde(default = "default_tmdb_url")]
    pub url: String,

    /// Language preference, a BCP-47 tag.
    #[serde(default = "default_tmdb_lang")]
    pub lang: String,

    /// Detail cache expiration in seconds.
    #[serde(default = "default_tmdb_cache_exp")]
    pub cache_exp_seconds: u64,
}

fn default_tmdb_url() -> String {
    crate::meta::tmdb::DEFAULT_BASE_URL.to_string()
}

fn default_tmdb_lang() -> String {
    crate::meta::tmdb::DEFAULT_LANGUAGE.to_string()
}

fn default_tmdb_cache_exp() -> u64 {
    crate::meta::tmdb::DEFAULT_CACHE_TTL.as_secs()
}

/// Parse the configuration from a TOML file.
pub fn load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [http]
            host = "0.0.0.0:9000"

            [repos.movies]
            name = "Movies"
            path = "/srv/media/movies"
            index_path = "/var/lib/reelvault/movies.json"
            cache_path = "/var/cache/reelvault/movies"
            capabilities = ["watch", "remux"]

            [repos.movies.sources.literal]

            [repos.movies.sources.analysis.tmdb]
            key = "secret"
            lang = "cs-CZ"
            "#,
        )
        .unwrap();

        assert_eq!(config.http.host, "0.0.0.0:9000");

        let movies = &config.repos["movies"];
        assert_eq!(movies.name, "Movies");
        assert!(movies.capable(CapabilityId::Watch));
        assert!(movies.capable(CapabilityId::Remux));
        assert!(!movies.capable(CapabilityId::Transcode));
        assert!(movies.sources.literal.is_some());

        let analysis = movies.sources.analysis.as_ref().unwrap();
        let tmdb = analysis.tmdb.as_ref().unwrap();
        assert_eq!(tmdb.key, "secret");
        assert_eq!(tmdb.lang, "cs-CZ");
        assert_eq!(tmdb.url, super::default_tmdb_url());
        assert_eq!(tmdb.cache_exp_seconds, 300);
    }

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.http.host, "127.0.0.1:7400");
        assert!(config.repos.is_empty());

        let sources = SourcesConfig::default();
        assert!(sources.is_empty());
    }
}
