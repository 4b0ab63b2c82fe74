//! Core State trait for stack layers.
//!
//! A state is an externally owned unit (a menu, a level, a loading phase) that
//! the stack enters, exits, removes and ticks. The engine only ever holds
//! shared references to it.

use super::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared reference to a state held by the stack and the registry.
pub type StateRef = Arc<dyn State>;

/// Error type returned by state hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single enter/exit/remove hook.
pub type HookResult = Result<(), HookError>;

/// Which way the stack is moving when a hook runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// A new layer is being added on top.
    Forward,
    /// A layer above is going away and this one is exposed again.
    Backward,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Tick entry point a state is being driven from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickMode {
    Update,
    FixedUpdate,
    LateUpdate,
}

/// Trait for stack states.
///
/// Only [`State::name`] is required. The lifecycle hooks default to reporting
/// completion immediately, so a state overrides just the phases it cares
/// about.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use statestack::core::{Direction, HookResult, ProgressSink, State, StateRef};
///
/// struct MainMenu;
///
/// #[async_trait]
/// impl State for MainMenu {
///     fn name(&self) -> &str {
///         "MainMenu"
///     }
///
///     async fn enter(
///         &self,
///         _previous: Option<&StateRef>,
///         progress: &dyn ProgressSink,
///         _direction: Direction,
///     ) -> HookResult {
///         progress.report(0.5);
///         progress.report(1.0);
///         Ok(())
///     }
/// }
///
/// assert_eq!(MainMenu.name(), "MainMenu");
/// ```
#[async_trait]
pub trait State: Send + Sync {
    /// Unique name used by the registry and in diagnostics.
    fn name(&self) -> &str;

    /// Called when this state becomes the top of the stack.
    ///
    /// `previous` is the layer that was on top before (or the layer that is
    /// going away when `direction` is [`Direction::Backward`]).
    async fn enter(
        &self,
        _previous: Option<&StateRef>,
        progress: &dyn ProgressSink,
        _direction: Direction,
    ) -> HookResult {
        progress.report(1.0);
        Ok(())
    }

    /// Called when this state stops being the top of the stack.
    async fn exit(
        &self,
        _next: Option<&StateRef>,
        progress: &dyn ProgressSink,
        _direction: Direction,
    ) -> HookResult {
        progress.report(1.0);
        Ok(())
    }

    /// Called when this state is surgically removed from the stack.
    async fn remove(
        &self,
        _below: &[StateRef],
        _above: &[StateRef],
        progress: &dyn ProgressSink,
    ) -> HookResult {
        progress.report(1.0);
        Ok(())
    }

    /// Per-frame callback, only invoked while no transition is running.
    fn tick(&self, _mode: TickMode, _delta: Duration) {}

    /// Whether this state keeps ticking while another layer covers it.
    fn ticks_when_inactive(&self) -> bool {
        false
    }

    /// Extended capability: hooks that observe a cancellation token.
    ///
    /// Implementors of [`CancellableState`] return `Some(self)`.
    fn as_cancellable(&self) -> Option<&dyn CancellableState> {
        None
    }
}

/// States whose hooks cooperate with cancellation and timeouts.
///
/// Each method defaults to the plain hook, so implementors override only
/// the phases that can actually stop early.
#[async_trait]
pub trait CancellableState: State {
    async fn enter_cancellable(
        &self,
        previous: Option<&StateRef>,
        progress: &dyn ProgressSink,
        direction: Direction,
        _cancel: &CancellationToken,
    ) -> HookResult {
        self.enter(previous, progress, direction).await
    }

    async fn exit_cancellable(
        &self,
        next: Option<&StateRef>,
        progress: &dyn ProgressSink,
        direction: Direction,
        _cancel: &CancellationToken,
    ) -> HookResult {
        self.exit(next, progress, direction).await
    }

    async fn remove_cancellable(
        &self,
        below: &[StateRef],
        above: &[StateRef],
        progress: &dyn ProgressSink,
        _cancel: &CancellationToken,
    ) -> HookResult {
        self.remove(below, above, progress).await
    }
}

impl fmt::Debug for dyn State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&self.name()).finish()
    }
}

/// Pointer identity between two state references.
pub fn same_state(a: &StateRef, b: &StateRef) -> bool {
    Arc::ptr_eq(a, b)
}
