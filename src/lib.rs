//! Statestack: an async, layered state stack with serialized transitions
//!
//! States are layered like screens: pushing a state exits the current top and
//! enters the new one, popping exits the top and re-enters whatever it
//! exposed. Every command is admitted into a single FIFO queue and executed by
//! one driver task, so transitions never overlap, even when a state issues a
//! new command from inside its own hook.
//!
//! # Core Concepts
//!
//! - **State**: asynchronous enter/exit/remove hooks via the `State` trait
//! - **Engine**: push, pop, flatten, clear and remove with rollback,
//!   cancellation, timeouts and monotonic progress
//! - **History**: bounded logs of committed transitions and faults
//! - **Builder**: validated configuration and pre-registered states
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use statestack::{State, StateStackBuilder, TransitionOptions};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Screen(&'static str);
//!
//! #[async_trait]
//! impl State for Screen {
//!     fn name(&self) -> &str {
//!         self.0
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stack = StateStackBuilder::new()
//!     .state(Arc::new(Screen("Menu")))
//!     .state(Arc::new(Screen("Game")))
//!     .build()?;
//!
//! stack.push_named("Menu", TransitionOptions::new())?.await?;
//! stack
//!     .push_named(
//!         "Game",
//!         TransitionOptions::new().timeout(Duration::from_secs(1)),
//!     )?
//!     .await?;
//!
//! assert_eq!(stack.depth(), 2);
//! assert_eq!(stack.previous_state().unwrap().name(), "Menu");
//!
//! stack.clear(TransitionOptions::new())?.await?;
//! assert!(stack.current_state().is_none());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod engine;

// Re-export commonly used types
pub use builder::{BuildError, StateStackBuilder};
pub use config::{ProgressSplits, StackConfig, ThreadAffinity};
pub use core::{CancellableState, Direction, ProgressSink, State, StateRef, TransitionOperation};
pub use engine::{StackError, StackEvent, StateStack, TransitionOptions, TransitionPhase};
