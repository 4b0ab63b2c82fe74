//! Build errors for the state stack builder.

use crate::config::ConfigViolation;
use crate::engine::StackError;
use thiserror::Error;

/// Errors that can occur when building a state stack.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid configuration: {}", format_violations(.0))]
    InvalidConfig(Vec<ConfigViolation>),

    #[error("State '{0}' was added twice. Use .replace_state(state) to overwrite")]
    DuplicateState(String),

    #[error("State registration failed: {0}")]
    Registration(#[from] StackError),
}

fn format_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(|violation| violation.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
