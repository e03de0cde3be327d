//! Process exit codes

use std::fmt;

/// Exit status of a dbt-ci invocation
///
/// Codes of a wrapped dbt or docker process pass through unchanged; the
/// constants below cover failures detected by dbt-ci itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Invalid flags or config file; nothing was executed
    pub const CONFIG_ERROR: ExitCode = ExitCode(2);

    /// Manifests could not be compared
    pub const STATE_COMPARISON_ERROR: ExitCode = ExitCode(3);

    /// Executable exists but could not be launched
    pub const CANNOT_EXECUTE: ExitCode = ExitCode(126);

    /// Executable not found on PATH
    pub const NOT_FOUND: ExitCode = ExitCode(127);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// Shell convention for a child killed by `signal`
    pub const fn from_signal(signal: i32) -> Self {
        Self(128 + signal)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        // Out-of-range codes (e.g. Windows NTSTATUS values) collapse to a generic failure
        std::process::ExitCode::from(u8::try_from(code.0).unwrap_or(1))
    }
}
