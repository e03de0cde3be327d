//! dbt-ci runner
//!
//! Turns a [`Selection`](dbt_ci_core::Selection) into one external command and
//! executes it:
//! - [`local`]: dbt on the host, run from the project directory
//! - [`docker`]: `docker run` with the project mounted into the container
//! - [`launcher`]: process spawning behind a trait so tests can observe it

pub mod command;
pub mod local;
pub mod docker;
pub mod launcher;
pub mod runner;

pub use command::{DbtInvocation, ExternalCommand};
pub use docker::DockerCommandBuilder;
pub use launcher::{CapturedOutput, ExecutionError, ProcessLauncher, SystemLauncher};
pub use local::LocalCommandBuilder;
pub use runner::{command_builder, run, CommandBuilder, CommandRunner};
