//! Docker option values parsed from `--docker-volumes` and `--docker-env`

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::ConfigError;

/// A bind mount in `host:container[:mode]` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Host path or named volume
    pub host: String,

    /// Mount point inside the container
    pub container: String,

    /// Mount options such as `ro` or `rw,z`
    pub mode: Option<String>,
}

impl VolumeMount {
    pub fn new(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: None,
        }
    }

    /// Set the mount mode
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

impl FromStr for VolumeMount {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidVolume(spec.to_string());

        let parts: Vec<&str> = spec.split(':').collect();
        let (host, container, mode) = match parts.as_slice() {
            [host, container] => (*host, *container, None),
            [host, container, mode] => (*host, *container, Some(*mode)),
            _ => return Err(invalid()),
        };

        if host.is_empty() || container.is_empty() || mode.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            container: container.to_string(),
            mode: mode.map(str::to_string),
        })
    }
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)?;
        if let Some(mode) = &self.mode {
            write!(f, ":{}", mode)?;
        }
        Ok(())
    }
}

/// An environment variable forwarded into the container as `KEY=VALUE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

fn env_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key pattern is a valid regex")
    })
}

impl FromStr for EnvVar {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (key, value) = spec
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidEnv(spec.to_string()))?;

        if !env_key_pattern().is_match(key) {
            return Err(ConfigError::InvalidEnv(spec.to_string()));
        }

        Ok(Self::new(key, value))
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Split a raw `--docker-args` string into tokens using shell quoting rules
pub fn split_docker_args(raw: &str) -> Result<Vec<String>, ConfigError> {
    shell_words::split(raw).map_err(|e| ConfigError::InvalidDockerArgs(format!("{raw}: {e}")))
}
