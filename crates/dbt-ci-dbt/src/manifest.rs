//! manifest.json
//!
//! Only the parts dbt-ci compares are deserialized; everything else in the
//! artifact is skipped, so manifests from any recent dbt version load.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub metadata: ManifestMetadata,

    /// Models, tests, seeds and snapshots keyed by unique id
    pub nodes: HashMap<String, ManifestNode>,

    /// Dependents of each node as recorded by dbt; absent in partial parses
    pub child_map: HashMap<String, Vec<String>>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest: Self = serde_json::from_str(&contents).map_err(|source| ManifestError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;

        tracing::debug!(
            path = %path.display(),
            dbt_version = %manifest.metadata.dbt_version,
            nodes = manifest.nodes.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|source| ManifestError::Parse { path: None, source })
    }

    /// Enabled nodes a selector can pick, keyed and ordered by unique id
    pub fn selectable_nodes(&self) -> BTreeMap<&str, &ManifestNode> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_selectable() && node.config.enabled)
            .map(|(id, node)| (id.as_str(), node))
            .collect()
    }

    pub fn get_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManifestMetadata {
    pub dbt_version: String,
    pub project_name: Option<String>,
    pub generated_at: Option<String>,
}

/// Node types that state comparison tracks
const SELECTABLE_RESOURCE_TYPES: [&str; 4] = ["model", "seed", "snapshot", "test"];

/// One entry of `nodes`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestNode {
    /// e.g. `model.jaffle_shop.orders`
    pub unique_id: String,

    /// e.g. `orders`; what `--select` matches
    pub name: String,

    pub resource_type: String,

    pub package_name: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub original_file_path: String,

    /// Hash of the raw file; missing from some older or hand-written manifests
    #[serde(default)]
    pub checksum: Option<FileChecksum>,

    #[serde(default)]
    pub config: NodeConfig,

    #[serde(default)]
    pub columns: HashMap<String, ColumnDefinition>,

    #[serde(default)]
    pub depends_on: DependsOn,

    #[serde(default)]
    pub fqn: Vec<String>,
}

impl ManifestNode {
    /// Models, seeds, snapshots and tests; not analyses, operations or the like
    pub fn is_selectable(&self) -> bool {
        SELECTABLE_RESOURCE_TYPES.contains(&self.resource_type.as_str())
    }
}

/// `{"name": "sha256", "checksum": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileChecksum {
    pub name: String,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub enabled: bool,
    pub materialized: Option<String>,
    pub contract: Option<ContractConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            materialized: None,
            contract: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    pub enforced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,

    /// Declared type, if any
    #[serde(default)]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DependsOn {
    /// Unique ids of upstream nodes
    pub nodes: Vec<String>,
    pub macros: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest JSON{}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },
}
