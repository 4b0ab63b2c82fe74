//! Core stack types.
//!
//! This module contains the building blocks the transition engine works with:
//! - the `State` trait and its optional cancellable capability
//! - progress sinks and nested progress scopes
//! - the name registry
//! - bounded history buffers and transition records

mod history;
mod progress;
mod registry;
mod state;

pub use history::{
    FaultRecord, RecordedOptions, RingBuffer, TransitionOperation, TransitionRecord,
    DEFAULT_HISTORY_CAPACITY,
};
pub use progress::{clamp01, NullProgress, ProgressSink, ScopedProgress};
pub use registry::StateRegistry;
pub use state::{
    same_state, CancellableState, Direction, HookError, HookResult, State, StateRef, TickMode,
};
