//! Error types for depot-engine.

use std::fmt;
use std::path::{Path, PathBuf};

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] depot_util::error::UtilError),

    /// A configuration file could not be loaded.
    #[error("{0}")]
    Config(#[from] depot_config::ConfigError),

    /// A pattern line could not be parsed.
    #[error("{0}")]
    Pattern(#[from] depot_pattern::PatternError),

    /// A deploy request is incomplete.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A line of dependency graph output is not `parent child`.
    #[error("malformed dependency graph line {line_number}: \"{line}\" (expected `parent child`)")]
    MalformedGraphLine { line_number: usize, line: String },

    /// An external command exited with a failure status.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The deploy worker pool could not be started.
    #[error("cannot start deploy worker pool: {message}")]
    WorkerPool { message: String },

    /// One or more module deployments failed.
    #[error("{0}")]
    DeployFailed(#[from] AggregateDeployError),

    /// Deployable-artifacts metadata could not be read or written.
    #[error("cannot process deployable artifacts {path}: {message}")]
    Metadata { path: String, message: String },
}

/// The first missing or invalid field of a deploy request.
///
/// Checked in declaration order, so a request missing everything reports
/// the file first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("file not found: {}", display_path(path.as_deref()))]
    FileNotFound { path: Option<PathBuf> },
    #[error("target repository cannot be empty")]
    MissingTargetRepository,
    #[error("artifact path cannot be empty")]
    MissingArtifactPath,
}

fn display_path(path: Option<&Path>) -> String {
    path.map_or_else(|| "<none>".to_owned(), |p| p.display().to_string())
}

/// Errors raised by a deploy client for a single artifact.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The local file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The server response could not be understood.
    #[error("unexpected response from {url}: {message}")]
    Response { url: String, message: String },
}

/// One artifact that failed to deploy, with the module it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("module {module}: cannot deploy {} as {artifact_path}: {source}", file.display())]
pub struct ModuleDeployFailure {
    pub module: String,
    pub artifact_path: String,
    pub file: PathBuf,
    pub source: DeployError,
}

/// A deployed artifact, as confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedArtifact {
    pub module: String,
    /// Final path in the repository. Snapshot uploads may come back renamed.
    pub artifact_path: String,
    pub sha256: Option<String>,
}

/// Every module failure of one deploy run.
///
/// Modules that were already running in parallel finish before this is
/// returned, so `deployed` lists everything that did reach the store.
#[derive(Debug)]
pub struct AggregateDeployError {
    pub failures: Vec<ModuleDeployFailure>,
    pub deployed: Vec<DeployedArtifact>,
}

impl fmt::Display for AggregateDeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} artifact deployment(s) failed; remaining artifacts of the failed module(s) were skipped",
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateDeployError {}
