//! Command runner
//!
//! Picks the command builder for the configured runner, then either prints the
//! assembled command (dry run) or executes it.

use std::io::Write;

use dbt_ci_core::{ExitCode, RunConfig, Runner, Selection};

use crate::command::{DbtInvocation, ExternalCommand};
use crate::docker::DockerCommandBuilder;
use crate::launcher::{CapturedOutput, ExecutionError, ProcessLauncher, SystemLauncher};
use crate::local::LocalCommandBuilder;

/// Renders a [`DbtInvocation`] for one execution environment
pub trait CommandBuilder {
    fn build(&self, config: &RunConfig, invocation: &DbtInvocation) -> ExternalCommand;
}

/// Builder matching the runner variant
pub fn command_builder(runner: &Runner) -> Box<dyn CommandBuilder + '_> {
    match runner {
        Runner::Local => Box::new(LocalCommandBuilder),
        Runner::Docker(options) => Box::new(DockerCommandBuilder::new(options)),
    }
}

/// Run dbt on the selection with real processes, printing dry runs to stdout
pub fn run(config: &RunConfig, selection: &Selection) -> Result<ExitCode, ExecutionError> {
    CommandRunner::new(config, &SystemLauncher).run(selection)
}

pub struct CommandRunner<'a, L: ProcessLauncher + ?Sized> {
    config: &'a RunConfig,
    launcher: &'a L,
}

impl<'a, L: ProcessLauncher + ?Sized> CommandRunner<'a, L> {
    pub fn new(config: &'a RunConfig, launcher: &'a L) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &RunConfig {
        self.config
    }

    /// Render an invocation for the configured runner
    pub fn build(&self, invocation: &DbtInvocation) -> ExternalCommand {
        command_builder(&self.config.runner).build(self.config, invocation)
    }

    /// Run an auxiliary dbt command (e.g. `ls`, `parse`) and capture its output
    ///
    /// Ignores dry run; callers decide whether a helper dbt call may execute.
    pub fn capture(&self, invocation: &DbtInvocation) -> Result<CapturedOutput, ExecutionError> {
        let command = self.build(invocation);
        tracing::debug!(command = %command, "Capturing dbt output");
        self.launcher.capture(&command)
    }

    /// Run the configured dbt command on the selection, printing dry runs to stdout
    pub fn run(&self, selection: &Selection) -> Result<ExitCode, ExecutionError> {
        self.run_to(selection, &mut std::io::stdout().lock())
    }

    /// Run the configured dbt command on the selection
    ///
    /// An empty selection returns success without building anything. In dry
    /// run the command line is written to `out` instead of executed.
    pub fn run_to<W: Write>(
        &self,
        selection: &Selection,
        out: &mut W,
    ) -> Result<ExitCode, ExecutionError> {
        let Selection::Modified(selector) = selection else {
            tracing::info!("No modified models; skipping dbt");
            return Ok(ExitCode::SUCCESS);
        };

        let invocation = DbtInvocation::for_command(self.config.command).select(selector.clone());
        let command = self.build(&invocation);

        if self.config.dry_run {
            tracing::info!(cwd = ?command.cwd(), "Dry run; not executing");
            writeln!(out, "{}", command.command_line())
                .map_err(|e| ExecutionError::Output(e.to_string()))?;
            return Ok(ExitCode::SUCCESS);
        }

        tracing::info!(
            runner = %self.config.runner.kind(),
            selector = %selector,
            "Running dbt {}",
            self.config.command
        );
        let exit_code = self.launcher.run(&command)?;
        tracing::debug!(%exit_code, "dbt finished");
        Ok(exit_code)
    }
}
