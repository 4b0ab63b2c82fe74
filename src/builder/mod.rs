//! Builder API for ergonomic state stack construction.
//!
//! This module provides a fluent builder that validates configuration and
//! pre-registers states before the stack's driver task starts.

pub mod error;
pub mod stack;

pub use error::BuildError;
pub use stack::StateStackBuilder;
