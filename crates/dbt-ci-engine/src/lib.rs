//! dbt-ci engine
//!
//! Works out which models differ from production:
//! - State comparison between two manifests
//! - Selector construction, either natively or by asking dbt

pub mod state_comparison;
pub mod selector;

pub use state_comparison::{diff_manifests, ChangeKind, ManifestDiff, NodeChange};
pub use selector::{build_selector, SelectorBuilder, StateComparisonError};
