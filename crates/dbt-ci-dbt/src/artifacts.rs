//! dbt artifact locations

use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// dbt's default target directory, relative to the project root
pub const TARGET_DIR: &str = "target";

/// manifest.json inside a `--state` directory
///
/// dbt expects the file directly in the state directory, not under `target/`.
pub fn state_manifest_path(state_dir: &Path) -> PathBuf {
    state_dir.join(MANIFEST_FILE_NAME)
}

/// manifest.json written by `dbt parse`/`dbt compile` in a project
pub fn local_manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join(TARGET_DIR).join(MANIFEST_FILE_NAME)
}
