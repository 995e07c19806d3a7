//! Dependency trees and module-parallel artifact deployment for Depot.

pub mod client;
pub mod deploy;
pub mod deployable;
pub mod details;
pub mod error;
pub mod graph;
pub mod plan;

pub use client::HttpDeployClient;
pub use deploy::{deploy_all, deploy_with_config, DeployClient, DeployReport, UploadResponse};
pub use details::{DeployDetails, DeployDetailsBuilder};
pub use error::{
    AggregateDeployError, DeployError, DeployedArtifact, EngineError, ModuleDeployFailure,
    ValidationError,
};
pub use graph::{go_dependency_tree, DependencyGraph, DependencyTree, PackageNode};
pub use plan::{DeployPlan, ModuleDeploySet};
