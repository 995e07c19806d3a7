//! Per-module collections of artifacts waiting to be deployed.

use std::collections::BTreeSet;

use depot_config::DeployConfig;
use depot_util::filter::IncludeExcludePatterns;

use crate::details::DeployDetails;
use crate::error::EngineError;

/// The artifacts of one build module, in deploy order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeploySet {
    module: String,
    artifacts: BTreeSet<DeployDetails>,
}

impl ModuleDeploySet {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_owned(),
            artifacts: BTreeSet::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Artifacts ordered by artifact path, then repository, then local file.
    pub fn artifacts(&self) -> impl Iterator<Item = &DeployDetails> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Returns false if an identical artifact was already present.
    pub fn insert(&mut self, details: DeployDetails) -> bool {
        self.artifacts.insert(details)
    }
}

/// Everything a build wants deployed, grouped by module.
///
/// Modules keep the order in which their first artifact was added. The
/// plan is handed to [`crate::deploy::deploy_all`] once the build is done.
#[derive(Debug, Clone, Default)]
pub struct DeployPlan {
    modules: Vec<ModuleDeploySet>,
    patterns: IncludeExcludePatterns,
}

impl DeployPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty plan filtered by the `[deploy]` include/exclude patterns.
    ///
    /// # Errors
    /// Returns an error if one of the patterns is not a valid glob.
    pub fn from_config(config: &DeployConfig) -> Result<Self, EngineError> {
        let patterns =
            IncludeExcludePatterns::new(&config.include_patterns, &config.exclude_patterns)?;
        Ok(Self::new().with_patterns(patterns))
    }

    /// Skip artifacts whose path conflicts with these patterns.
    #[must_use]
    pub fn with_patterns(mut self, patterns: IncludeExcludePatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Add an artifact to a module, creating the module on first use.
    ///
    /// Returns false when the artifact was filtered out by the include/exclude
    /// patterns or is already in the module.
    pub fn add_artifact(&mut self, module: &str, details: DeployDetails) -> bool {
        if self.patterns.conflicts(details.artifact_path()) {
            tracing::info!(
                module,
                path = details.artifact_path(),
                "skipping artifact excluded by include/exclude patterns"
            );
            return false;
        }

        let index = match self.modules.iter().position(|m| m.module == module) {
            Some(index) => index,
            None => {
                self.modules.push(ModuleDeploySet::new(module));
                self.modules.len() - 1
            }
        };
        self.modules
            .get_mut(index)
            .is_some_and(|set| set.insert(details))
    }

    pub fn modules(&self) -> &[ModuleDeploySet] {
        &self.modules
    }

    pub fn module(&self, module: &str) -> Option<&ModuleDeploySet> {
        self.modules.iter().find(|m| m.module == module)
    }

    /// Total number of artifacts across all modules.
    pub fn artifact_count(&self) -> usize {
        self.modules.iter().map(ModuleDeploySet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.iter().all(ModuleDeploySet::is_empty)
    }
}
