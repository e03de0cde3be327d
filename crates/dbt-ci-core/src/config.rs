//! Run configuration
//!
//! Options arrive from CLI flags and the optional `dbt-ci.toml` file as a
//! [`RunOptions`] value. [`RunConfig::resolve`] validates them and settles every
//! auto-detected value (profiles directory, docker user and platform) once, so
//! a dry run previews exactly what a real run would execute.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::options::{split_docker_args, EnvVar, VolumeMount};

/// Config file looked up in the working directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "dbt-ci.toml";

pub const DEFAULT_DOCKER_IMAGE: &str = "ghcr.io/dbt-labs/dbt-core:latest";

pub const DEFAULT_DOCKER_NETWORK: &str = "host";

pub const DEFAULT_DBT_EXECUTABLE: &str = "dbt";

/// dbt's profile file name
pub const PROFILES_FILE_NAME: &str = "profiles.yml";

/// Where dbt gets executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// dbt on the host
    #[default]
    Local,

    /// dbt inside a `docker run` container
    Docker,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Docker => "docker",
        }
    }
}

/// dbt subcommand executed against the selected models
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbtCommand {
    #[default]
    Run,
    Test,
    Build,
    Seed,
    Snapshot,
}

impl DbtCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Test => "test",
            Self::Build => "build",
            Self::Seed => "seed",
            Self::Snapshot => "snapshot",
        }
    }

    /// Node type the subcommand acts on; `build` acts on all of them
    pub fn resource_type(&self) -> Option<&'static str> {
        match self {
            Self::Run => Some("model"),
            Self::Test => Some("test"),
            Self::Seed => Some("seed"),
            Self::Snapshot => Some("snapshot"),
            Self::Build => None,
        }
    }
}

/// How modified models are discovered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Ask dbt itself (`dbt ls --select state:modified+ --state <prod>`)
    #[default]
    Dbt,

    /// Compare both manifest.json files directly
    Manifest,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dbt => "dbt",
            Self::Manifest => "manifest",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $field:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|variant| variant.as_str().eq_ignore_ascii_case(value))
                    .ok_or_else(|| ConfigError::UnknownValue {
                        field: $field,
                        value: value.to_string(),
                        expected: [$($variant.as_str()),+].join(", "),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(RunnerKind, "runner", [RunnerKind::Local, RunnerKind::Docker]);
impl_str_enum!(
    DbtCommand,
    "mode",
    [
        DbtCommand::Run,
        DbtCommand::Test,
        DbtCommand::Build,
        DbtCommand::Seed,
        DbtCommand::Snapshot,
    ]
);
impl_str_enum!(
    SelectionMethod,
    "selection method",
    [SelectionMethod::Dbt, SelectionMethod::Manifest]
);

/// `[docker]` table of dbt-ci.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerFileConfig {
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    /// `host:container[:mode]` entries, mounted before any `--docker-volumes`
    #[serde(default)]
    pub volumes: Vec<String>,

    /// `KEY=VALUE` entries, passed before any `--docker-env`
    #[serde(default)]
    pub env: Vec<String>,

    /// Raw extra `docker run` arguments
    #[serde(default)]
    pub args: Option<String>,
}

/// Configuration file schema (dbt-ci.toml)
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub runner: Option<RunnerKind>,

    #[serde(default)]
    pub mode: Option<DbtCommand>,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub profiles_dir: Option<PathBuf>,

    #[serde(default)]
    pub selection_method: Option<SelectionMethod>,

    #[serde(default)]
    pub dbt_executable: Option<String>,

    #[serde(default)]
    pub docker: DockerFileConfig,
}

impl FileConfig {
    /// Load config from TOML file
    ///
    /// A relative `profiles_dir` is taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        if let (Some(profiles_dir), Some(parent)) = (&config.profiles_dir, path.parent()) {
            if profiles_dir.is_relative() {
                config.profiles_dir = Some(parent.join(profiles_dir));
            }
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Unresolved options as given by the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub prod_manifest_dir: PathBuf,
    pub project_dir: Option<PathBuf>,
    pub profiles_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub vars: Option<String>,
    pub mode: Option<DbtCommand>,
    pub runner: Option<RunnerKind>,
    pub selection_method: Option<SelectionMethod>,
    pub dbt_executable: Option<String>,
    pub docker_image: Option<String>,
    pub docker_platform: Option<String>,
    pub docker_volumes: Vec<String>,
    pub docker_env: Vec<String>,
    pub docker_network: Option<String>,
    pub docker_user: Option<String>,
    pub docker_args: Option<String>,
    pub dry_run: bool,
}

impl RunOptions {
    /// Fill unset options from a config file
    ///
    /// Scalars already set here win. Volumes and env entries from the file
    /// come first, followed by the ones given here.
    pub fn with_file_config(mut self, file: FileConfig) -> Self {
        self.runner = self.runner.or(file.runner);
        self.mode = self.mode.or(file.mode);
        self.target = self.target.or(file.target);
        self.profiles_dir = self.profiles_dir.or(file.profiles_dir);
        self.selection_method = self.selection_method.or(file.selection_method);
        self.dbt_executable = self.dbt_executable.or(file.dbt_executable);

        let docker = file.docker;
        self.docker_image = self.docker_image.or(docker.image);
        self.docker_platform = self.docker_platform.or(docker.platform);
        self.docker_network = self.docker_network.or(docker.network);
        self.docker_user = self.docker_user.or(docker.user);
        self.docker_args = self.docker_args.or(docker.args);
        self.docker_volumes = docker.volumes.into_iter().chain(self.docker_volumes).collect();
        self.docker_env = docker.env.into_iter().chain(self.docker_env).collect();

        self
    }
}

/// Fully resolved `docker run` settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOptions {
    /// Image reference; never empty
    pub image: String,
    pub platform: Option<String>,
    pub volumes: Vec<VolumeMount>,
    pub env: Vec<EnvVar>,
    pub network: String,
    /// `uid:gid` passed to `--user`
    pub user: Option<String>,
    pub extra_args: Vec<String>,
}

impl DockerOptions {
    /// Options with the given image and defaults elsewhere, without auto-detection
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            platform: None,
            volumes: Vec::new(),
            env: Vec::new(),
            network: DEFAULT_DOCKER_NETWORK.to_string(),
            user: None,
            extra_args: Vec::new(),
        }
    }
}

/// Execution target for dbt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Runner {
    Local,
    Docker(DockerOptions),
}

impl Runner {
    pub fn kind(&self) -> RunnerKind {
        match self {
            Runner::Local => RunnerKind::Local,
            Runner::Docker(_) => RunnerKind::Docker,
        }
    }
}

/// Resolved configuration for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Absolute directory holding the production manifest.json
    pub prod_manifest_dir: PathBuf,

    /// Absolute dbt project root
    pub project_dir: PathBuf,

    /// Directory holding profiles.yml, if one was found
    pub profiles_dir: Option<PathBuf>,

    pub target: Option<String>,

    /// YAML passed to dbt `--vars`
    pub vars: Option<String>,

    pub command: DbtCommand,

    pub selection_method: SelectionMethod,

    /// dbt binary used by the local runner
    pub dbt_executable: String,

    pub runner: Runner,

    pub dry_run: bool,
}

impl RunConfig {
    /// Local-runner config with defaults, without touching the filesystem
    pub fn new(prod_manifest_dir: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            prod_manifest_dir: prod_manifest_dir.into(),
            project_dir: project_dir.into(),
            profiles_dir: None,
            target: None,
            vars: None,
            command: DbtCommand::default(),
            selection_method: SelectionMethod::default(),
            dbt_executable: DEFAULT_DBT_EXECUTABLE.to_string(),
            runner: Runner::Local,
            dry_run: false,
        }
    }

    /// Validate options and settle every auto-detected value
    pub fn resolve(options: RunOptions) -> Result<Self, ConfigError> {
        if options.prod_manifest_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("--prod-manifest-dir"));
        }

        let project_dir = options
            .project_dir
            .unwrap_or_else(|| PathBuf::from("."));
        let project_dir = project_dir
            .canonicalize()
            .map_err(|e| ConfigError::ProjectDirNotFound(format!("{}: {}", project_dir.display(), e)))?;
        if !project_dir.is_dir() {
            return Err(ConfigError::ProjectDirNotFound(project_dir.display().to_string()));
        }

        // The production manifest is checked by the selector builder, not here
        let prod_manifest_dir = std::path::absolute(&options.prod_manifest_dir)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", options.prod_manifest_dir.display(), e)))?;

        let home = home::home_dir();
        let profiles_dir =
            resolve_profiles_dir(options.profiles_dir.as_deref(), &project_dir, home.as_deref())?;

        // Parsed for every runner so malformed specs fail before anything runs
        let volumes = options
            .docker_volumes
            .iter()
            .map(|spec| spec.parse::<VolumeMount>())
            .collect::<Result<Vec<_>, _>>()?;
        let env = options
            .docker_env
            .iter()
            .map(|spec| spec.parse::<EnvVar>())
            .collect::<Result<Vec<_>, _>>()?;
        let extra_args = match options.docker_args.as_deref() {
            Some(raw) => split_docker_args(raw)?,
            None => Vec::new(),
        };

        let runner = match options.runner.unwrap_or_default() {
            RunnerKind::Local => Runner::Local,
            RunnerKind::Docker => {
                let image = options
                    .docker_image
                    .unwrap_or_else(|| DEFAULT_DOCKER_IMAGE.to_string());
                if image.trim().is_empty() {
                    return Err(ConfigError::MissingDockerImage);
                }

                Runner::Docker(DockerOptions {
                    image: image.trim().to_string(),
                    platform: non_empty(options.docker_platform).or_else(detect_platform),
                    volumes,
                    env,
                    network: non_empty(options.docker_network)
                        .unwrap_or_else(|| DEFAULT_DOCKER_NETWORK.to_string()),
                    user: non_empty(options.docker_user).or_else(detect_user),
                    extra_args,
                })
            }
        };

        let dbt_executable = options
            .dbt_executable
            .unwrap_or_else(|| DEFAULT_DBT_EXECUTABLE.to_string());
        if dbt_executable.trim().is_empty() {
            return Err(ConfigError::MissingValue("--dbt-executable"));
        }

        let config = Self {
            prod_manifest_dir,
            project_dir,
            profiles_dir,
            target: non_empty(options.target),
            vars: non_empty(options.vars),
            command: options.mode.unwrap_or_default(),
            selection_method: options.selection_method.unwrap_or_default(),
            dbt_executable,
            runner,
            dry_run: options.dry_run,
        };

        // Env values may hold credentials, so only the shape of the config is logged
        tracing::debug!(
            project_dir = %config.project_dir.display(),
            prod_manifest_dir = %config.prod_manifest_dir.display(),
            runner = %config.runner.kind(),
            command = %config.command,
            selection_method = %config.selection_method,
            "Resolved run configuration"
        );
        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Find the directory holding profiles.yml
///
/// An explicit directory must contain the file. Otherwise the project
/// directory is tried, then `~/.dbt`; if neither has one, dbt is left to
/// apply its own defaults.
pub fn resolve_profiles_dir(
    explicit: Option<&Path>,
    project_dir: &Path,
    home: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(dir) = explicit {
        let dir = std::path::absolute(dir)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", dir.display(), e)))?;
        if !dir.join(PROFILES_FILE_NAME).is_file() {
            return Err(ConfigError::ProfilesNotFound(dir.display().to_string()));
        }
        return Ok(Some(dir));
    }

    let candidates = std::iter::once(project_dir.to_path_buf())
        .chain(home.map(|home| home.join(".dbt")));

    for candidate in candidates {
        if candidate.join(PROFILES_FILE_NAME).is_file() {
            tracing::debug!(profiles_dir = %candidate.display(), "Detected profiles directory");
            return Ok(Some(candidate));
        }
    }

    tracing::debug!("No profiles.yml found; leaving profile resolution to dbt");
    Ok(None)
}

/// Platform override for hosts whose native images are scarce
fn detect_platform() -> Option<String> {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        Some("linux/amd64".to_string())
    } else {
        None
    }
}

/// `uid:gid` of the invoking user, so files written into the project mount stay owned by them
#[cfg(target_os = "linux")]
fn detect_user() -> Option<String> {
    Some(format!("{}:{}", nix::unistd::getuid(), nix::unistd::getgid()))
}

#[cfg(not(target_os = "linux"))]
fn detect_user() -> Option<String> {
    None
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    #[error("Invalid {field} '{value}' (expected one of: {expected})")]
    UnknownValue {
        field: &'static str,
        value: String,
        expected: String,
    },

    #[error("Invalid volume '{0}': expected host:container[:mode]")]
    InvalidVolume(String),

    #[error("Invalid environment variable '{0}': expected KEY=VALUE")]
    InvalidEnv(String),

    #[error("Invalid docker arguments: {0}")]
    InvalidDockerArgs(String),

    #[error("A docker image is required when the runner is docker")]
    MissingDockerImage,

    #[error("dbt project directory not found: {0}")]
    ProjectDirNotFound(String),

    #[error("profiles.yml not found in {0}")]
    ProfilesNotFound(String),
}
