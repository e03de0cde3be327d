//! dbt inside `docker run`

use dbt_ci_core::{DockerOptions, RunConfig};

use crate::command::{DbtInvocation, ExternalCommand};
use crate::runner::CommandBuilder;

/// Where the project directory is mounted; also the container working directory
pub const CONTAINER_PROJECT_DIR: &str = "/usr/app";

/// Where profiles.yml is mounted, exported as `DBT_PROFILES_DIR`
pub const CONTAINER_PROFILES_DIR: &str = "/profiles";

/// Where the production state directory is mounted
pub const CONTAINER_STATE_DIR: &str = "/state";

/// dbt executable inside the image
pub const CONTAINER_DBT: &str = "dbt";

/// Builds `docker run ... <image> dbt <subcommand> ...`
///
/// Argument order:
/// 1. `--rm --entrypoint=` (the image's own entrypoint is cleared so the
///    explicit `dbt` token runs)
/// 2. `--platform`, `--network`, `--user`
/// 3. the project mount and working directory
/// 4. profiles and state mounts, when needed
/// 5. user volumes then user env, each in the order given
/// 6. raw extra args, the image, then the dbt command
#[derive(Debug, Clone, Copy)]
pub struct DockerCommandBuilder<'a> {
    options: &'a DockerOptions,
}

impl<'a> DockerCommandBuilder<'a> {
    pub fn new(options: &'a DockerOptions) -> Self {
        Self { options }
    }
}

impl CommandBuilder for DockerCommandBuilder<'_> {
    fn build(&self, config: &RunConfig, invocation: &DbtInvocation) -> ExternalCommand {
        let options = self.options;
        let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "--entrypoint=".into()];

        if let Some(platform) = &options.platform {
            args.extend(["--platform".to_string(), platform.clone()]);
        }
        args.extend(["--network".to_string(), options.network.clone()]);
        if let Some(user) = &options.user {
            args.extend(["--user".to_string(), user.clone()]);
        }

        args.extend([
            "-v".to_string(),
            format!("{}:{}", config.project_dir.display(), CONTAINER_PROJECT_DIR),
            "-w".to_string(),
            CONTAINER_PROJECT_DIR.to_string(),
        ]);

        if let Some(profiles_dir) = &config.profiles_dir {
            args.extend([
                "-v".to_string(),
                format!("{}:{}:ro", profiles_dir.display(), CONTAINER_PROFILES_DIR),
                "-e".to_string(),
                format!("DBT_PROFILES_DIR={}", CONTAINER_PROFILES_DIR),
            ]);
        }

        let state_dir = invocation
            .selector
            .as_ref()
            .and_then(|selector| selector.state_dir());
        if let Some(state_dir) = state_dir {
            args.extend([
                "-v".to_string(),
                format!("{}:{}:ro", state_dir.display(), CONTAINER_STATE_DIR),
            ]);
        }

        for volume in &options.volumes {
            args.extend(["-v".to_string(), volume.to_string()]);
        }
        for env in &options.env {
            args.extend(["-e".to_string(), env.to_string()]);
        }

        args.extend(options.extra_args.iter().cloned());
        args.push(options.image.clone());
        args.push(CONTAINER_DBT.to_string());
        args.extend(invocation.render(
            config,
            state_dir.map(|_| CONTAINER_STATE_DIR.to_string()),
            None,
        ));

        ExternalCommand::new("docker").args(args)
    }
}
