//! dbt artifact access
//!
//! This crate handles:
//! - Locating dbt artifacts (production state and local target directories)
//! - Parsing manifest.json
//! - Building dependency graphs (DAG) for downstream impact

pub mod artifacts;
pub mod manifest;
pub mod dag;

pub use artifacts::{local_manifest_path, state_manifest_path, MANIFEST_FILE_NAME};
pub use manifest::{
    ColumnDefinition, ContractConfig, DependsOn, FileChecksum, Manifest, ManifestError,
    ManifestMetadata, ManifestNode, NodeConfig,
};
pub use dag::{DependencyGraph, NodeId};
