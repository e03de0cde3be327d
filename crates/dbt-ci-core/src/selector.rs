//! dbt selector values
//!
//! A selector is opaque to dbt-ci: it is only ever handed to dbt's `--select`.

use std::fmt;
use std::path::{Path, PathBuf};

/// dbt's own state-comparison selector: modified models plus their children
pub const STATE_MODIFIED: &str = "state:modified+";

/// A non-empty selection expression in dbt's selection grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    expression: String,

    /// Production state directory required by `state:` selection methods
    state_dir: Option<PathBuf>,
}

impl Selector {
    /// Create a selector from a raw expression; `None` if the expression is blank
    pub fn new(expression: impl Into<String>) -> Option<Self> {
        let expression = expression.into().trim().to_string();
        if expression.is_empty() {
            return None;
        }

        Some(Self {
            expression,
            state_dir: None,
        })
    }

    /// `state:modified+` against the given production state directory
    pub fn state_modified(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            expression: STATE_MODIFIED.to_string(),
            state_dir: Some(state_dir.into()),
        }
    }

    /// Select each named node and everything downstream of it
    ///
    /// Names are emitted in the order given; `None` if there are no names.
    pub fn from_models<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let expression = names
            .into_iter()
            .map(|name| format!("{}+", name.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");

        Self::new(expression)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Directory to pass as `--state`, if the expression needs one
    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Outcome of comparing local state against production
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No modified models; nothing to run
    Empty,

    /// Models to hand to dbt
    Modified(Selector),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        matches!(self, Selection::Empty)
    }

    pub fn selector(&self) -> Option<&Selector> {
        match self {
            Selection::Empty => None,
            Selection::Modified(selector) => Some(selector),
        }
    }
}

impl From<Option<Selector>> for Selection {
    fn from(selector: Option<Selector>) -> Self {
        selector.map_or(Selection::Empty, Selection::Modified)
    }
}
