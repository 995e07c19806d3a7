//! Validated description of one artifact to deploy.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use depot_config::DeployConfig;
use depot_util::checksum::FileChecksums;

use crate::error::ValidationError;

/// One local file and where it goes in the artifact store.
///
/// Only [`DeployDetailsBuilder::build`] creates these, so the file existed
/// and the repository and path were non-blank at construction time.
/// Ordered by artifact path, then repository, then local file, so a module's
/// descriptor (`.pom`, `.module`, ...) can be sorted after its other files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployDetails {
    target_repository: String,
    artifact_path: String,
    file: PathBuf,
    sha1: Option<String>,
    md5: Option<String>,
    explode: bool,
    properties: Option<BTreeMap<String, String>>,
}

impl DeployDetails {
    pub fn builder() -> DeployDetailsBuilder {
        DeployDetailsBuilder::default()
    }

    pub fn target_repository(&self) -> &str {
        &self.target_repository
    }

    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn sha1(&self) -> Option<&str> {
        self.sha1.as_deref()
    }

    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    /// Whether the store should unpack the uploaded archive.
    pub fn explode(&self) -> bool {
        self.explode
    }

    /// Properties to attach, or `None` when none were ever added.
    pub fn properties(&self) -> Option<&BTreeMap<String, String>> {
        self.properties.as_ref()
    }
}

impl Ord for DeployDetails {
    fn cmp(&self, other: &Self) -> Ordering {
        self.artifact_path
            .cmp(&other.artifact_path)
            .then_with(|| self.target_repository.cmp(&other.target_repository))
            .then_with(|| self.file.cmp(&other.file))
            .then_with(|| self.sha1.cmp(&other.sha1))
            .then_with(|| self.md5.cmp(&other.md5))
            .then_with(|| self.explode.cmp(&other.explode))
            .then_with(|| self.properties.cmp(&other.properties))
    }
}

impl PartialOrd for DeployDetails {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collects the fields of a [`DeployDetails`] and validates them on `build`.
#[derive(Debug, Clone, Default)]
pub struct DeployDetailsBuilder {
    target_repository: Option<String>,
    artifact_path: Option<String>,
    file: Option<PathBuf>,
    sha1: Option<String>,
    md5: Option<String>,
    explode: bool,
    properties: Option<BTreeMap<String, String>>,
}

impl DeployDetailsBuilder {
    /// A builder that targets the `[deploy]` repository and carries its
    /// properties. Properties added later override configured ones.
    pub fn from_config(config: &DeployConfig) -> Self {
        let builder = Self::default().target_repository(config.repository.as_str());
        if config.properties.is_empty() {
            return builder;
        }
        builder.add_properties(&config.properties)
    }

    #[must_use]
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn target_repository(mut self, repository: impl Into<String>) -> Self {
        self.target_repository = Some(repository.into());
        self
    }

    #[must_use]
    pub fn artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn sha1(mut self, sha1: impl Into<String>) -> Self {
        self.sha1 = Some(sha1.into());
        self
    }

    #[must_use]
    pub fn md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    /// Take SHA-1 and MD5 from precomputed checksums.
    #[must_use]
    pub fn checksums(self, checksums: &FileChecksums) -> Self {
        self.sha1(checksums.sha1.clone()).md5(checksums.md5.clone())
    }

    #[must_use]
    pub fn explode(mut self, explode: bool) -> Self {
        self.explode = explode;
        self
    }

    /// Add one property. A key added twice keeps the last value.
    #[must_use]
    pub fn add_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn add_properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = self.properties.get_or_insert_with(BTreeMap::new);
        for (key, value) in properties {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// Checks, in this order, that the file exists as a regular file, that
    /// the target repository is not blank, and that the artifact path is not
    /// blank. The first failed check is returned.
    pub fn build(self) -> Result<DeployDetails, ValidationError> {
        let file = match self.file {
            Some(file) if file.is_file() => file,
            other => return Err(ValidationError::FileNotFound { path: other }),
        };
        let target_repository = self
            .target_repository
            .filter(|r| !r.trim().is_empty())
            .ok_or(ValidationError::MissingTargetRepository)?;
        let artifact_path = self
            .artifact_path
            .filter(|p| !p.trim().is_empty())
            .ok_or(ValidationError::MissingArtifactPath)?;

        Ok(DeployDetails {
            target_repository,
            artifact_path,
            file,
            sha1: self.sha1,
            md5: self.md5,
            explode: self.explode,
            properties: self.properties,
        })
    }
}
