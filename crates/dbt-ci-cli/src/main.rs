use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbt_ci_core::config::CONFIG_FILE_NAME;
use dbt_ci_core::{
    ConfigError, DbtCommand, ExitCode, FileConfig, RunConfig, RunOptions, RunnerKind, Selection,
    SelectionMethod,
};
use dbt_ci_engine::{SelectorBuilder, StateComparisonError};
use dbt_ci_runner::{CommandRunner, ExecutionError, SystemLauncher};

/// dbt-ci - Run only the dbt models that changed relative to production
#[derive(Parser)]
#[command(name = "dbt-ci")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the production manifest.json
    #[arg(long, visible_alias = "reference-manifest-dir", value_name = "DIR")]
    prod_manifest_dir: PathBuf,

    /// dbt project root [default: .]
    #[arg(long, value_name = "DIR")]
    dbt_project_dir: Option<PathBuf>,

    /// Directory containing profiles.yml (auto-detected when omitted)
    #[arg(long, value_name = "DIR")]
    profiles_dir: Option<PathBuf>,

    /// dbt target name
    #[arg(short, long)]
    target: Option<String>,

    /// Where dbt runs: local or docker
    #[arg(short, long)]
    runner: Option<RunnerKind>,

    /// dbt subcommand to run on the selection: run, test, build, seed or snapshot
    #[arg(long)]
    mode: Option<DbtCommand>,

    /// YAML dictionary passed to dbt --vars
    #[arg(long)]
    vars: Option<String>,

    /// How modified models are found: dbt or manifest
    #[arg(long)]
    selection_method: Option<SelectionMethod>,

    /// dbt binary used by the local runner
    #[arg(long, value_name = "PATH")]
    dbt_executable: Option<String>,

    /// Docker image containing dbt
    #[arg(long, value_name = "IMAGE")]
    docker_image: Option<String>,

    /// Docker platform, e.g. linux/amd64 (auto-detected when omitted)
    #[arg(long)]
    docker_platform: Option<String>,

    /// Extra volume mount, repeatable
    #[arg(long = "docker-volumes", value_name = "HOST:CONTAINER[:MODE]")]
    docker_volumes: Vec<String>,

    /// Environment variable for the container, repeatable
    #[arg(long = "docker-env", value_name = "KEY=VALUE")]
    docker_env: Vec<String>,

    /// Docker network mode [default: host]
    #[arg(long)]
    docker_network: Option<String>,

    /// Container user as uid:gid (auto-detected when omitted)
    #[arg(long, value_name = "UID:GID")]
    docker_user: Option<String>,

    /// Extra arguments for docker run, split like a shell would
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    docker_args: Option<String>,

    /// Print the dbt command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Path to config file (default: dbt-ci.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (falls back to RUST_LOG, then warn)
    #[arg(long, value_parser = ["off", "error", "warn", "info", "debug", "trace"])]
    log_level: Option<String>,
}

impl Cli {
    fn into_options(self) -> RunOptions {
        RunOptions {
            prod_manifest_dir: self.prod_manifest_dir,
            project_dir: self.dbt_project_dir,
            profiles_dir: self.profiles_dir,
            target: self.target,
            vars: self.vars,
            mode: self.mode,
            runner: self.runner,
            selection_method: self.selection_method,
            dbt_executable: self.dbt_executable,
            docker_image: self.docker_image,
            docker_platform: self.docker_platform,
            docker_volumes: self.docker_volumes,
            docker_env: self.docker_env,
            docker_network: self.docker_network,
            docker_user: self.docker_user,
            docker_args: self.docker_args,
            dry_run: self.dry_run,
        }
    }
}

fn main() -> std::process::ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Ok(path) = &dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    match execute(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            exit_code_for(&err).into()
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let file_config = load_file_config(cli.config.as_deref())?;
    let config = RunConfig::resolve(cli.into_options().with_file_config(file_config))?;
    let launcher = SystemLauncher;

    if config.dry_run {
        eprintln!("{}", "Dry run: the dbt command is printed, not executed".yellow());
    }

    let selection = SelectorBuilder::new(&config, &launcher).build()?;
    let Selection::Modified(selector) = &selection else {
        eprintln!("{}", "No modified models; nothing to run".green());
        return Ok(ExitCode::SUCCESS);
    };

    if !config.dry_run {
        eprintln!(
            "{} dbt {} --select {} ({})",
            "Running".cyan(),
            config.command,
            selector,
            config.runner.kind()
        );
    }

    let code = CommandRunner::new(&config, &launcher).run(&selection)?;
    if !code.is_success() {
        eprintln!("{} dbt exited with code {}", "✗".red(), code);
    }

    Ok(code)
}

/// Load `--config`, or `dbt-ci.toml` from the working directory if present
fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path,
        None if Path::new(CONFIG_FILE_NAME).is_file() => Path::new(CONFIG_FILE_NAME),
        None => {
            tracing::debug!("No config file found, using defaults");
            return Ok(FileConfig::default());
        }
    };

    tracing::debug!(path = %path.display(), "Loading config file");
    let config = FileConfig::from_file(path)?;
    Ok(config)
}

/// Map an error to the process exit code
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<ConfigError>().is_some() {
        ExitCode::CONFIG_ERROR
    } else if let Some(err) = err.downcast_ref::<StateComparisonError>() {
        err.exit_code()
    } else if let Some(err) = err.downcast_ref::<ExecutionError>() {
        err.exit_code()
    } else {
        ExitCode::new(1)
    }
}
