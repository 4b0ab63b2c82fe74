//! Stack configuration and its validation.
//!
//! Validation uses Stillwater's `Validation` so that every violation is
//! reported in one pass instead of stopping at the first bad value.

mod violations;

pub use violations::ConfigViolation;

use crate::core::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Default size of the fault log.
pub const DEFAULT_FAULT_HISTORY_CAPACITY: usize = 16;

/// How a request's progress range is divided between its phases.
///
/// Each value is the fraction of the (per-step) range given to the first
/// phase; the remainder goes to the phase that follows it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSplits {
    /// Push: exit of the current top, then enter of the target
    pub push_exit: f32,
    /// Pop: exit of the top, then re-enter of the exposed layer
    pub pop_exit: f32,
    /// Flatten: all layer exits, then the final enter
    pub flatten_exit: f32,
    /// Clear, per layer: exit, then re-enter of the exposed layer
    pub clear_exit: f32,
    /// Remove of the top: removal hook, then re-enter of the exposed layer
    pub remove_top: f32,
}

impl Default for ProgressSplits {
    fn default() -> Self {
        Self {
            push_exit: 0.5,
            pop_exit: 0.5,
            flatten_exit: 0.9,
            clear_exit: 0.7,
            remove_top: 0.4,
        }
    }
}

/// Which threads may issue commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadAffinity {
    /// Only the thread that created the stack
    Owner,
    /// Any thread
    Any,
}

/// Full stack configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub history_capacity: usize,
    pub fault_history_capacity: usize,
    pub splits: ProgressSplits,
    pub thread_affinity: ThreadAffinity,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            fault_history_capacity: DEFAULT_FAULT_HISTORY_CAPACITY,
            splits: ProgressSplits::default(),
            thread_affinity: ThreadAffinity::Owner,
        }
    }
}

impl StackConfig {
    /// Validate every setting, accumulating ALL violations.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<ConfigViolation>> {
        let splits = [
            ("push_exit", self.splits.push_exit),
            ("pop_exit", self.splits.pop_exit),
            ("flatten_exit", self.splits.flatten_exit),
            ("clear_exit", self.splits.clear_exit),
            ("remove_top", self.splits.remove_top),
        ];

        let checks: Vec<Validation<(), NonEmptyVec<ConfigViolation>>> = splits
            .into_iter()
            .map(|(name, value)| {
                if (0.0..=1.0).contains(&value) {
                    Validation::success(())
                } else {
                    Validation::fail(ConfigViolation::SplitOutOfRange { name, value })
                }
            })
            .collect();

        Validation::all_vec(checks).map(|_| ())
    }
}
