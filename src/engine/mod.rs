//! Transition engine: the effectful shell around the core types.
//!
//! # Key Concepts
//!
//! - **Queue**: every command is admitted into one FIFO mailbox; exactly one
//!   request executes at a time, and requests issued while busy are deferred
//! - **Executor**: push/pop/flatten/clear/remove lifecycles with rollback
//! - **Cancellation**: a caller token and a timeout merged per request
//! - **Events**: synchronous listeners for lifecycle, progress and queue
//!   changes

mod cancellation;
mod error;
mod events;
mod executor;
mod options;
mod queue;
mod stack;

pub use cancellation::CancellationScope;
pub use error::{StackError, TransitionPhase};
pub use events::{DeferredMetrics, StackEvent, SubscriptionId};
pub use options::TransitionOptions;
pub use queue::{IdleWait, TransitionHandle};
pub use stack::StateStack;
