//! dbt-ci Core
//!
//! Domain types shared by every dbt-ci crate: the resolved run configuration,
//! selector values and exit codes.

pub mod config;
pub mod options;
pub mod selector;
pub mod exit;

pub use config::{
    ConfigError, DbtCommand, DockerOptions, FileConfig, RunConfig, RunOptions, Runner, RunnerKind,
    SelectionMethod,
};
pub use options::{EnvVar, VolumeMount};
pub use selector::{Selection, Selector, STATE_MODIFIED};
pub use exit::ExitCode;
