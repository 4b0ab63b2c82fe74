//! Configuration violations.

use thiserror::Error;

/// A single invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigViolation {
    #[error("Progress split '{name}' must lie in [0, 1] (got {value})")]
    SplitOutOfRange { name: &'static str, value: f32 },
}
