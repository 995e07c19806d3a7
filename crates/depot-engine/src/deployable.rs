//! The deployable-artifacts record: a JSON file listing, per module, which
//! local file goes to which repository path.
//!
//! Written after a build so a later step can deploy or inspect the
//! artifacts without re-running the build.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::plan::DeployPlan;

/// One artifact entry of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployableArtifact {
    /// Absolute path of the local file.
    pub source_path: String,
    /// Repository path the file is deployed to.
    pub artifact_dest: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

/// Artifacts keyed by module id.
pub type DeployableArtifacts = BTreeMap<String, Vec<DeployableArtifact>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum Record {
    ByModule(DeployableArtifacts),
    // Older records are a flat list with no module information.
    Flat(Vec<DeployableArtifact>),
}

/// Describe every artifact of a plan, in deploy order.
pub fn deployable_artifacts(plan: &DeployPlan) -> DeployableArtifacts {
    plan.modules()
        .iter()
        .map(|module| {
            let artifacts = module
                .artifacts()
                .map(|details| DeployableArtifact {
                    source_path: std::path::absolute(details.file())
                        .unwrap_or_else(|_| details.file().to_path_buf())
                        .display()
                        .to_string(),
                    artifact_dest: details.artifact_path().to_owned(),
                    sha1: details.sha1().map(str::to_owned),
                })
                .collect();
            (module.module().to_owned(), artifacts)
        })
        .collect()
}

/// Write the record for a plan as JSON.
///
/// Uses atomic write (write-to-temp-then-rename) so readers never see a
/// partial file.
///
/// # Errors
/// Returns an error if serialization fails or the file cannot be written.
pub fn save(plan: &DeployPlan, path: &Path) -> Result<(), EngineError> {
    let content = serde_json::to_string_pretty(&deployable_artifacts(plan)).map_err(|e| {
        EngineError::Metadata {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content).map_err(|source| EngineError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        modules = plan.modules().len(),
        "saved deployable artifacts"
    );
    Ok(())
}

/// Read a record written by [`save`].
///
/// A missing or empty file yields an empty map. A flat list of artifacts is
/// accepted and placed under the module id `""`.
///
/// # Errors
/// Returns an error if the file cannot be read or holds neither format.
pub fn load(path: &Path) -> Result<DeployableArtifacts, EngineError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(EngineError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let record: Record = serde_json::from_str(&content).map_err(|e| EngineError::Metadata {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(match record {
        Record::ByModule(artifacts) => artifacts,
        Record::Flat(artifacts) => BTreeMap::from([(String::new(), artifacts)]),
    })
}
