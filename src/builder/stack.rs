//! Builder for constructing state stacks.

use crate::builder::error::BuildError;
use crate::config::{ProgressSplits, StackConfig, ThreadAffinity};
use crate::core::StateRef;
use crate::engine::StateStack;
use stillwater::validation::Validation;
use tracing::debug;

/// Builder for a [`StateStack`] with a fluent API.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use statestack::builder::StateStackBuilder;
/// use statestack::core::State;
/// use std::sync::Arc;
///
/// struct Loading;
///
/// #[async_trait]
/// impl State for Loading {
///     fn name(&self) -> &str {
///         "Loading"
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let stack = StateStackBuilder::new()
///     .history_capacity(16)
///     .state(Arc::new(Loading))
///     .build()
///     .unwrap();
///
/// assert_eq!(stack.registered_states(), vec!["Loading".to_string()]);
/// # }
/// ```
pub struct StateStackBuilder {
    config: StackConfig,
    states: Vec<(StateRef, bool)>,
}

impl StateStackBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: StackConfig::default(),
            states: Vec::new(),
        }
    }

    /// Start from an existing configuration.
    pub fn with_config(config: StackConfig) -> Self {
        Self {
            config,
            states: Vec::new(),
        }
    }

    /// Number of committed transitions kept; zero selects the default.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    /// Number of faults kept; zero selects the default.
    pub fn fault_history_capacity(mut self, capacity: usize) -> Self {
        self.config.fault_history_capacity = capacity;
        self
    }

    pub fn splits(mut self, splits: ProgressSplits) -> Self {
        self.config.splits = splits;
        self
    }

    pub fn thread_affinity(mut self, affinity: ThreadAffinity) -> Self {
        self.config.thread_affinity = affinity;
        self
    }

    /// Register a state; adding a second state with the same name fails.
    pub fn state(mut self, state: StateRef) -> Self {
        self.states.push((state, false));
        self
    }

    /// Register a state, replacing any earlier one with the same name.
    pub fn replace_state(mut self, state: StateRef) -> Self {
        self.states.push((state, true));
        self
    }

    /// Validate the configuration and spawn the stack's driver task.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn build(self) -> Result<StateStack, BuildError> {
        if let Validation::Failure(violations) = self.config.validate() {
            return Err(BuildError::InvalidConfig(
                violations.iter().cloned().collect(),
            ));
        }

        let stack = StateStack::spawn(self.config);
        for (state, force) in self.states {
            let name = state.name().to_string();
            if !stack.register(state, force)? {
                return Err(BuildError::DuplicateState(name));
            }
        }
        debug!(states = stack.registered_states().len(), "State stack built");
        Ok(stack)
    }
}

impl Default for StateStackBuilder {
    fn default() -> Self {
        Self::new()
    }
}
