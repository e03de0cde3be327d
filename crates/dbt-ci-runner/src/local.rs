//! dbt on the host

use dbt_ci_core::RunConfig;

use crate::command::{DbtInvocation, ExternalCommand};
use crate::runner::CommandBuilder;

/// Builds `dbt <subcommand> ...` run from the project directory
///
/// Paths are passed as absolute paths, so the only thing tying the command to
/// the project is its working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommandBuilder;

impl CommandBuilder for LocalCommandBuilder {
    fn build(&self, config: &RunConfig, invocation: &DbtInvocation) -> ExternalCommand {
        let state_dir = invocation
            .selector
            .as_ref()
            .and_then(|selector| selector.state_dir())
            .map(|dir| dir.display().to_string());
        let profiles_dir = config
            .profiles_dir
            .as_ref()
            .map(|dir| dir.display().to_string());

        ExternalCommand::new(config.dbt_executable.clone())
            .args(invocation.render(config, state_dir, profiles_dir))
            .current_dir(&config.project_dir)
    }
}
