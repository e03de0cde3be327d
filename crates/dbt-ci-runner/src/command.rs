//! Command values
//!
//! [`DbtInvocation`] describes a dbt call independently of where it runs;
//! command builders render it into an [`ExternalCommand`].

use std::fmt;
use std::path::{Path, PathBuf};

use dbt_ci_core::{DbtCommand, RunConfig, Selector};

/// A program plus its arguments, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory for the child; inherited when unset
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Program followed by every argument
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Shell-quoted command line, suitable for copy and paste
    pub fn command_line(&self) -> String {
        shell_words::join(self.tokens())
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// One dbt call: `dbt [global flags] <subcommand> [--select ...] [args]`
///
/// Target, profiles and vars come from the [`RunConfig`] at render time, so
/// every call of one invocation shares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbtInvocation {
    pub global_flags: Vec<String>,
    pub subcommand: String,
    pub selector: Option<Selector>,
    pub args: Vec<String>,
}

impl DbtInvocation {
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            global_flags: Vec::new(),
            subcommand: subcommand.into(),
            selector: None,
            args: Vec::new(),
        }
    }

    pub fn for_command(command: DbtCommand) -> Self {
        Self::new(command.as_str())
    }

    /// Flag placed before the subcommand, e.g. `--quiet`
    pub fn global_flag(mut self, flag: impl Into<String>) -> Self {
        self.global_flags.push(flag.into());
        self
    }

    pub fn select(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Render the dbt argument list
    ///
    /// `state_dir` replaces the selector's own state directory (docker uses the
    /// container path); `profiles_dir` is omitted when `None`.
    pub(crate) fn render(
        &self,
        config: &RunConfig,
        state_dir: Option<String>,
        profiles_dir: Option<String>,
    ) -> Vec<String> {
        let mut rendered = self.global_flags.clone();
        rendered.push(self.subcommand.clone());

        if let Some(selector) = &self.selector {
            rendered.push("--select".to_string());
            rendered.push(selector.expression().to_string());
        }
        if let Some(state_dir) = state_dir {
            rendered.push("--state".to_string());
            rendered.push(state_dir);
        }

        rendered.extend(self.args.iter().cloned());

        if let Some(target) = &config.target {
            rendered.push("--target".to_string());
            rendered.push(target.clone());
        }
        if let Some(profiles_dir) = profiles_dir {
            rendered.push("--profiles-dir".to_string());
            rendered.push(profiles_dir);
        }
        if let Some(vars) = &config.vars {
            rendered.push("--vars".to_string());
            rendered.push(vars.clone());
        }

        rendered
    }
}
