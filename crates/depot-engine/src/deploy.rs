//! Module-parallel artifact deployment.
//!
//! Modules may deploy concurrently, but the artifacts of one module always go
//! up one at a time in their sorted order, so the module descriptor lands
//! after everything it describes.

use depot_config::DeployConfig;
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use crate::details::DeployDetails;
use crate::error::{
    AggregateDeployError, DeployError, DeployedArtifact, EngineError, ModuleDeployFailure,
};
use crate::plan::{DeployPlan, ModuleDeploySet};

/// What the store reported back for an uploaded artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResponse {
    /// Final repository path. May differ from the requested one, e.g. when
    /// the store timestamps a snapshot.
    pub path: Option<String>,
    pub sha256: Option<String>,
}

/// Uploads a single artifact. Shared across deploy workers.
pub trait DeployClient: Sync {
    /// # Errors
    /// Returns an error if the artifact could not be stored.
    fn deploy(
        &self,
        details: &DeployDetails,
        log_prefix: Option<&str>,
    ) -> Result<UploadResponse, DeployError>;
}

/// Artifacts deployed by a successful [`deploy_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    /// In module order, then artifact order within each module.
    pub deployed: Vec<DeployedArtifact>,
}

/// Deploy every module of the plan.
///
/// With `max_parallelism <= 1` modules go one after another and the first
/// failure stops everything after it. Otherwise up to `max_parallelism`
/// modules deploy at once on a dedicated thread pool; a failure stops only
/// its own module, and all failures are reported once every module is done.
///
/// # Errors
/// Returns `EngineError::DeployFailed` carrying every failure and every
/// artifact that was deployed, or `EngineError::WorkerPool` if the threads
/// cannot be started.
pub fn deploy_all(
    client: &dyn DeployClient,
    plan: &DeployPlan,
    max_parallelism: usize,
) -> Result<DeployReport, EngineError> {
    tracing::info!(
        modules = plan.modules().len(),
        artifacts = plan.artifact_count(),
        max_parallelism,
        "deploying artifacts"
    );

    if max_parallelism <= 1 {
        return deploy_serial(client, plan);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size(max_parallelism, plan.modules().len()))
        .thread_name(|i| format!("depot-deploy-{i}"))
        .build()
        .map_err(|e| EngineError::WorkerPool {
            message: e.to_string(),
        })?;

    let outcomes: Vec<ModuleOutcome> = pool.install(|| {
        plan.modules()
            .par_iter()
            .map(|module| {
                let prefix =
                    rayon::current_thread_index().map(|i| format!("[depot-deploy-{i}]"));
                deploy_module(client, module, prefix.as_deref())
            })
            .collect()
    });

    let mut deployed = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        deployed.extend(outcome.deployed);
        failures.extend(outcome.failure);
    }

    if failures.is_empty() {
        Ok(DeployReport { deployed })
    } else {
        Err(AggregateDeployError { failures, deployed }.into())
    }
}

/// [`deploy_all`] with the `[deploy] publish_fork_count` as the parallelism.
///
/// # Errors
/// See [`deploy_all`].
pub fn deploy_with_config(
    client: &dyn DeployClient,
    plan: &DeployPlan,
    config: &DeployConfig,
) -> Result<DeployReport, EngineError> {
    deploy_all(client, plan, config.publish_fork_count)
}

/// No more workers than there are modules to deploy.
fn pool_size(max_parallelism: usize, modules: usize) -> usize {
    max_parallelism.min(modules).max(1)
}

fn deploy_serial(
    client: &dyn DeployClient,
    plan: &DeployPlan,
) -> Result<DeployReport, EngineError> {
    let mut deployed = Vec::new();
    for module in plan.modules() {
        let outcome = deploy_module(client, module, None);
        deployed.extend(outcome.deployed);
        if let Some(failure) = outcome.failure {
            return Err(AggregateDeployError {
                failures: vec![failure],
                deployed,
            }
            .into());
        }
    }
    Ok(DeployReport { deployed })
}

struct ModuleOutcome {
    deployed: Vec<DeployedArtifact>,
    failure: Option<ModuleDeployFailure>,
}

fn deploy_module(
    client: &dyn DeployClient,
    module: &ModuleDeploySet,
    log_prefix: Option<&str>,
) -> ModuleOutcome {
    let mut deployed = Vec::with_capacity(module.len());
    for details in module.artifacts() {
        tracing::debug!(
            module = module.module(),
            path = details.artifact_path(),
            prefix = log_prefix.unwrap_or_default(),
            "deploying artifact"
        );
        match client.deploy(details, log_prefix) {
            Ok(response) => deployed.push(DeployedArtifact {
                module: module.module().to_owned(),
                artifact_path: response
                    .path
                    .unwrap_or_else(|| details.artifact_path().to_owned()),
                sha256: response.sha256,
            }),
            Err(source) => {
                tracing::error!(
                    module = module.module(),
                    path = details.artifact_path(),
                    file = %details.file().display(),
                    error = %source,
                    "artifact deployment failed, skipping the rest of the module"
                );
                return ModuleOutcome {
                    deployed,
                    failure: Some(ModuleDeployFailure {
                        module: module.module().to_owned(),
                        artifact_path: details.artifact_path().to_owned(),
                        file: details.file().to_path_buf(),
                        source,
                    }),
                };
            }
        }
    }
    tracing::info!(
        module = module.module(),
        artifacts = deployed.len(),
        "module deployed"
    );
    ModuleOutcome {
        deployed,
        failure: None,
    }
}
