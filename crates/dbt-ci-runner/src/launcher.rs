//! Process launching

use std::io;
use std::process::{Command, ExitStatus, Stdio};

use dbt_ci_core::ExitCode;

use crate::command::ExternalCommand;

/// Output of a command whose streams were captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: ExitCode,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns external commands
pub trait ProcessLauncher {
    /// Run with inherited stdio and wait for the child's exit code
    fn run(&self, command: &ExternalCommand) -> Result<ExitCode, ExecutionError>;

    /// Run with stdout and stderr captured
    fn capture(&self, command: &ExternalCommand) -> Result<CapturedOutput, ExecutionError>;
}

/// Launches real processes with [`std::process::Command`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn prepare(&self, command: &ExternalCommand) -> Result<Command, ExecutionError> {
        let program = which::which(command.program()).map_err(|e| {
            tracing::debug!(program = command.program(), error = %e, "Executable lookup failed");
            ExecutionError::NotFound {
                program: command.program().to_string(),
            }
        })?;

        let mut process = Command::new(program);
        process.args(command.get_args());
        if let Some(cwd) = command.cwd() {
            process.current_dir(cwd);
        }

        tracing::debug!(
            command = %command,
            cwd = ?command.cwd(),
            "Launching process"
        );
        Ok(process)
    }
}

impl ProcessLauncher for SystemLauncher {
    /// The child shares dbt-ci's process group, so a terminal Ctrl-C reaches
    /// both. dbt-ci keeps the default SIGINT disposition and exits at once
    /// without waiting for dbt to finish cleaning up. A signal delivered to
    /// the child alone surfaces as [`ExecutionError::Signaled`].
    fn run(&self, command: &ExternalCommand) -> Result<ExitCode, ExecutionError> {
        let status = self
            .prepare(command)?
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| ExecutionError::from_spawn(command.program(), e))?;

        exit_code(command.program(), status)
    }

    fn capture(&self, command: &ExternalCommand) -> Result<CapturedOutput, ExecutionError> {
        let output = self
            .prepare(command)?
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ExecutionError::from_spawn(command.program(), e))?;

        Ok(CapturedOutput {
            exit_code: exit_code(command.program(), output.status)?,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn exit_code(program: &str, status: ExitStatus) -> Result<ExitCode, ExecutionError> {
    if let Some(code) = status.code() {
        return Ok(ExitCode::new(code));
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(ExecutionError::Signaled {
                program: program.to_string(),
                signal,
            });
        }
    }

    Err(ExecutionError::NoStatus {
        program: program.to_string(),
    })
}

/// Failures to execute a command at all
///
/// A command that runs and exits non-zero is not an error.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Executable '{program}' not found on PATH")]
    NotFound { program: String },

    #[error("Failed to launch '{program}': {details}")]
    Spawn { program: String, details: String },

    #[error("'{program}' was terminated by signal {signal}")]
    Signaled { program: String, signal: i32 },

    #[error("'{program}' exited without a status code")]
    NoStatus { program: String },

    #[error("Failed to write output: {0}")]
    Output(String),
}

impl ExecutionError {
    fn from_spawn(program: &str, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            ExecutionError::NotFound {
                program: program.to_string(),
            }
        } else {
            ExecutionError::Spawn {
                program: program.to_string(),
                details: error.to_string(),
            }
        }
    }

    /// Exit code reported for this failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExecutionError::NotFound { .. } => ExitCode::NOT_FOUND,
            ExecutionError::Spawn { .. } => ExitCode::CANNOT_EXECUTE,
            ExecutionError::Signaled { signal, .. } => ExitCode::from_signal(*signal),
            ExecutionError::NoStatus { .. } | ExecutionError::Output(_) => ExitCode::new(1),
        }
    }
}
