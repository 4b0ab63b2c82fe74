//! Runtime errors raised by stack commands and transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle phase a hook failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionPhase {
    Enter,
    Exit,
    Remove,
    EnterRollback,
    ExitRollback,
    RemoveRollback,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Remove => "remove",
            Self::EnterRollback => "enter rollback",
            Self::ExitRollback => "exit rollback",
            Self::RemoveRollback => "remove rollback",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when issuing or executing transitions.
#[derive(Debug, Clone, Error)]
pub enum StackError {
    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("No state registered under '{0}'")]
    StateNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("The {phase} hook of state '{state}' failed: {cause}")]
    Failed {
        phase: TransitionPhase,
        state: String,
        #[source]
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("Transition was canceled")]
    Canceled,

    #[error("Transition timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("State stack driver has stopped")]
    Stopped,
}

impl StackError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Phase of a hook failure, if this is one.
    pub fn phase(&self) -> Option<TransitionPhase> {
        match self {
            Self::Failed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
