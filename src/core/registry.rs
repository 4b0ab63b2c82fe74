//! Name to state binding with uniqueness enforcement.

use super::state::{same_state, StateRef};
use crate::engine::StackError;
use std::collections::HashMap;

/// Registry of states addressable by name.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use statestack::core::{State, StateRegistry, StateRef};
/// use std::sync::Arc;
///
/// struct Level;
///
/// #[async_trait]
/// impl State for Level {
///     fn name(&self) -> &str {
///         "Level"
///     }
/// }
///
/// let mut registry = StateRegistry::new();
/// let level: StateRef = Arc::new(Level);
/// assert!(registry.register(level.clone(), false).unwrap());
/// assert!(!registry.register(level, false).unwrap());
/// assert!(registry.contains("Level"));
/// ```
#[derive(Default)]
pub struct StateRegistry {
    states: HashMap<String, StateRef>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `state` under its name.
    ///
    /// Returns `Ok(false)` when the name is taken and `force` is not set;
    /// with `force` the existing binding is replaced.
    pub fn register(&mut self, state: StateRef, force: bool) -> Result<bool, StackError> {
        let name = state.name();
        if name.is_empty() {
            return Err(StackError::Validation(
                "state name must not be empty".to_string(),
            ));
        }
        if self.states.contains_key(name) && !force {
            return Ok(false);
        }
        self.states.insert(name.to_string(), state);
        Ok(true)
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.states.remove(name).is_some()
    }

    /// Remove the binding for `state` if that exact instance is registered.
    pub fn unregister_state(&mut self, state: &StateRef) -> bool {
        let registered = self
            .states
            .get(state.name())
            .is_some_and(|existing| same_state(existing, state));
        if registered {
            self.states.remove(state.name());
        }
        registered
    }

    pub fn get(&self, name: &str) -> Option<&StateRef> {
        self.states.get(name)
    }

    /// Look up `name`, failing with `StateNotFound` on a miss.
    pub fn resolve(&self, name: &str) -> Result<StateRef, StackError> {
        if name.is_empty() {
            return Err(StackError::Validation(
                "state name must not be empty".to_string(),
            ));
        }
        self.states
            .get(name)
            .cloned()
            .ok_or_else(|| StackError::StateNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.states.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn states(&self) -> Vec<StateRef> {
        self.states.values().cloned().collect()
    }
}
