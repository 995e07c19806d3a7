//! Parse and validate `depot.toml`.

pub mod config;

pub use config::{
    ConfigError, DeployConfig, DepotConfig, ResolveConfig, DEFAULT_CONNECTION_RETRIES,
    DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB, DEFAULT_PUBLISH_FORK_COUNT,
};
