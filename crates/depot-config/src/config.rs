use std::collections::BTreeMap;
use std::path::Path;

use depot_pattern::{PatternError, PatternLine};
use serde::{Deserialize, Serialize};

/// Number of modules deployed concurrently when `publish_fork_count` is unset.
pub const DEFAULT_PUBLISH_FORK_COUNT: usize = 3;

/// Files smaller than this (in KiB) are always uploaded in full.
pub const DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB: u64 = 10;

/// Extra attempts made after an upload fails to connect or send.
pub const DEFAULT_CONNECTION_RETRIES: u32 = 3;

/// The `depot.toml` configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
    #[serde(default)]
    pub resolve: ResolveConfig,
}

/// `[deploy]`: where and how build artifacts are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Base URL of the artifact store, e.g. `"https://repo.example.com/artifactory"`.
    pub url: String,
    /// Target repository for every deployed artifact.
    pub repository: String,
    /// Maximum number of modules deployed at once. `1` deploys serially.
    #[serde(default = "default_publish_fork_count")]
    pub publish_fork_count: usize,
    #[serde(default = "default_min_checksum_deploy_size_kb")]
    pub min_checksum_deploy_size_kb: u64,
    /// Retries after a transport failure. Error responses are never retried.
    #[serde(default = "default_connection_retries")]
    pub connection_retries: u32,
    /// Comma- or whitespace-separated path patterns; empty means everything.
    #[serde(default)]
    pub include_patterns: String,
    #[serde(default)]
    pub exclude_patterns: String,
    /// Properties attached to every deployed artifact.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

fn default_publish_fork_count() -> usize {
    DEFAULT_PUBLISH_FORK_COUNT
}

fn default_min_checksum_deploy_size_kb() -> u64 {
    DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB
}

fn default_connection_retries() -> u32 {
    DEFAULT_CONNECTION_RETRIES
}

/// `[resolve]`: dependency pattern lines to download before the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

impl ResolveConfig {
    /// Parse every configured pattern line, skipping blank ones.
    ///
    /// # Errors
    /// Returns `ConfigError::Pattern` naming the 1-based position of the
    /// first line that does not parse.
    pub fn dependency_patterns(&self) -> Result<Vec<PatternLine>, ConfigError> {
        self.patterns
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                depot_pattern::parse(line).map_err(|source| ConfigError::Pattern {
                    index: i + 1,
                    source,
                })
            })
            .collect()
    }
}

impl DepotConfig {
    /// Read and parse a `depot.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// has an invalid `[deploy]` section.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse `depot.toml` content. `origin` names the source in errors.
    ///
    /// # Errors
    /// Returns an error if the content is invalid TOML or has an invalid
    /// `[deploy]` section.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: DepotConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_owned(),
            source: e,
        })?;
        if let Some(deploy) = &config.deploy {
            deploy.validate(origin)?;
        }
        Ok(config)
    }
}

impl DeployConfig {
    fn validate(&self, origin: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: origin.to_owned(),
            message: message.to_owned(),
        };
        if self.url.trim().is_empty() {
            return Err(invalid("deploy.url must not be empty"));
        }
        if self.repository.trim().is_empty() {
            return Err(invalid("deploy.repository must not be empty"));
        }
        if self.publish_fork_count == 0 {
            return Err(invalid("deploy.publish_fork_count must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid depot.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid depot.toml at {path}: {message}")]
    Invalid { path: String, message: String },
    #[error("resolve pattern #{index}: {source}")]
    Pattern { index: usize, source: PatternError },
}
