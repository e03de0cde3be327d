//! Selector construction
//!
//! Works out which models differ from the production manifest, either by
//! asking dbt (`dbt ls --select state:modified+`) or by comparing the two
//! manifests natively.

use std::path::Path;
use std::sync::OnceLock;

use dbt_ci_core::{ExitCode, RunConfig, Selection, SelectionMethod, Selector, STATE_MODIFIED};
use dbt_ci_dbt::{local_manifest_path, state_manifest_path, Manifest, ManifestError};
use dbt_ci_runner::{CommandRunner, DbtInvocation, ExecutionError, ProcessLauncher};
use regex::Regex;

use crate::state_comparison::{diff_manifests, ManifestDiff};

/// Lines of dbt output kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// Errors while computing the selection
#[derive(Debug, thiserror::Error)]
pub enum StateComparisonError {
    #[error("Production manifest not found: {0}")]
    MissingStateManifest(String),

    #[error("Local manifest not found after dbt parse: {0}")]
    MissingLocalManifest(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("`{command}` failed with exit code {exit_code}:\n{stderr}")]
    DbtFailed {
        command: String,
        exit_code: ExitCode,
        stderr: String,
    },

    #[error("Could not run `{command}`")]
    Launch {
        command: String,
        #[source]
        source: ExecutionError,
    },
}

impl StateComparisonError {
    /// Exit code reported for this failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            StateComparisonError::Launch { source, .. } => source.exit_code(),
            _ => ExitCode::STATE_COMPARISON_ERROR,
        }
    }
}

/// Compare `<prod>/manifest.json` against `<project>/target/manifest.json`
///
/// Never spawns a process; both manifests must already exist.
pub fn build_selector(
    prod_manifest_dir: &Path,
    project_dir: &Path,
) -> Result<Selection, StateComparisonError> {
    let state = load_state_manifest(prod_manifest_dir)?;

    let local_path = local_manifest_path(project_dir);
    if !local_path.is_file() {
        return Err(StateComparisonError::MissingLocalManifest(
            local_path.display().to_string(),
        ));
    }
    let current = Manifest::from_file(&local_path)?;

    Ok(selection_from(&diff_manifests(&current, &state), &current, None))
}

/// Computes the selection for one run, using the configured runner for dbt calls
pub struct SelectorBuilder<'a, L: ProcessLauncher + ?Sized> {
    runner: CommandRunner<'a, L>,
}

impl<'a, L: ProcessLauncher + ?Sized> SelectorBuilder<'a, L> {
    pub fn new(config: &'a RunConfig, launcher: &'a L) -> Self {
        Self {
            runner: CommandRunner::new(config, launcher),
        }
    }

    fn config(&self) -> &RunConfig {
        self.runner.config()
    }

    pub fn build(&self) -> Result<Selection, StateComparisonError> {
        let config = self.config();
        let state_path = state_manifest_path(&config.prod_manifest_dir);
        if !state_path.is_file() {
            return Err(StateComparisonError::MissingStateManifest(
                state_path.display().to_string(),
            ));
        }

        tracing::debug!(
            method = %config.selection_method,
            prod_manifest = %state_path.display(),
            "Building selector"
        );

        match config.selection_method {
            SelectionMethod::Dbt => self.ask_dbt(),
            SelectionMethod::Manifest => self.compare_manifests(),
        }
    }

    fn state_selection(&self) -> Selection {
        Selection::Modified(Selector::state_modified(&self.config().prod_manifest_dir))
    }

    /// Ask dbt which nodes `state:modified+` matches for the configured subcommand
    fn ask_dbt(&self) -> Result<Selection, StateComparisonError> {
        let config = self.config();
        if config.dry_run {
            tracing::info!("Dry run; assuming {STATE_MODIFIED} selects nodes");
            return Ok(self.state_selection());
        }

        let mut invocation = DbtInvocation::new("ls")
            .global_flag("--quiet")
            .select(Selector::state_modified(&config.prod_manifest_dir));
        if let Some(resource_type) = config.command.resource_type() {
            invocation = invocation.args(["--resource-type", resource_type]);
        }
        let invocation = invocation.args(["--output", "name"]);

        let output = self.capture(&invocation)?;
        let selected = output.lines().filter(|line| is_node_name(line)).count();
        tracing::info!(selected, mode = %config.command, "dbt listed modified nodes");

        if selected == 0 {
            Ok(Selection::Empty)
        } else {
            Ok(self.state_selection())
        }
    }

    /// Compare manifests natively, generating the local one with `dbt parse` if needed
    fn compare_manifests(&self) -> Result<Selection, StateComparisonError> {
        let config = self.config();
        let local_path = local_manifest_path(&config.project_dir);

        if !local_path.is_file() {
            if config.dry_run {
                tracing::info!(
                    local_manifest = %local_path.display(),
                    "Dry run without a local manifest; falling back to {STATE_MODIFIED}"
                );
                return Ok(self.state_selection());
            }

            self.capture(&DbtInvocation::new("parse"))?;
            if !local_path.is_file() {
                return Err(StateComparisonError::MissingLocalManifest(
                    local_path.display().to_string(),
                ));
            }
        }

        let state = load_state_manifest(&config.prod_manifest_dir)?;
        let current = Manifest::from_file(&local_path)?;
        let diff = diff_manifests(&current, &state);
        Ok(selection_from(&diff, &current, config.command.resource_type()))
    }

    /// Run a helper dbt call (`ls`, `parse`), returning its stdout
    fn capture(&self, invocation: &DbtInvocation) -> Result<String, StateComparisonError> {
        let command = self.runner.build(invocation);
        let output = self
            .runner
            .capture(invocation)
            .map_err(|source| StateComparisonError::Launch {
                command: command.command_line(),
                source,
            })?;

        if !output.exit_code.is_success() {
            // dbt logs most failures to stdout
            let log = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            return Err(StateComparisonError::DbtFailed {
                command: command.command_line(),
                exit_code: output.exit_code,
                stderr: tail(log, STDERR_TAIL_LINES),
            });
        }

        Ok(output.stdout)
    }
}

fn load_state_manifest(prod_manifest_dir: &Path) -> Result<Manifest, StateComparisonError> {
    let path = state_manifest_path(prod_manifest_dir);
    if !path.is_file() {
        return Err(StateComparisonError::MissingStateManifest(
            path.display().to_string(),
        ));
    }
    Ok(Manifest::from_file(&path)?)
}

fn selection_from(diff: &ManifestDiff, local: &Manifest, resource_type: Option<&str>) -> Selection {
    for change in &diff.changed {
        let kinds: Vec<String> = change.kinds.iter().map(ToString::to_string).collect();
        tracing::info!(
            node = %change.unique_id,
            downstream = change.downstream.len(),
            "Changed: {}",
            kinds.join(", ")
        );
    }
    if !diff.removed.is_empty() {
        tracing::warn!(removed = ?diff.removed, "Nodes removed since production are not selectable");
    }

    let selection = diff.selection_for(local, resource_type);
    if selection.is_empty() && !diff.changed.is_empty() {
        tracing::info!(
            resource_type = resource_type.unwrap_or("any"),
            "No change reaches a node of this type"
        );
    }
    selection
}

/// Whether a line of `dbt ls --output name` is a node name rather than log noise
fn is_node_name(line: &str) -> bool {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("valid regex"))
        .is_match(line.trim())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
