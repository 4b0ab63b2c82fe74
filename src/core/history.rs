//! Bounded transition history.
//!
//! A generic fixed-capacity ring buffer backs every bounded log the stack
//! keeps: committed transitions and recent faults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Capacity used when a caller asks for zero.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Kind of stack mutation a request performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionOperation {
    Push,
    Pop,
    Flatten,
    Clear,
    Remove,
}

impl fmt::Display for TransitionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Flatten => "flatten",
            Self::Clear => "clear",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Fixed-capacity circular buffer: oldest entries are overwritten once full.
///
/// # Example
///
/// ```rust
/// use statestack::core::RingBuffer;
///
/// let mut buffer = RingBuffer::new(2);
/// buffer.push("a");
/// buffer.push("b");
/// buffer.push("c");
///
/// assert_eq!(buffer.len(), 2);
/// assert_eq!(buffer.get(0), Some(&"b"));
/// assert_eq!(buffer.get(1), Some(&"c"));
/// ```
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries.
    ///
    /// A capacity of zero is coerced to [`DEFAULT_HISTORY_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_HISTORY_CAPACITY
        } else {
            capacity
        };
        Self {
            items: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Entry at `index`, where 0 is the oldest and `len() - 1` the newest.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.items.len() {
            return None;
        }
        self.items.get((self.head + index) % self.items.len())
    }

    pub fn newest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|last| self.get(last))
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (wrapped, fresh) = self.items.split_at(self.head);
        fresh.iter().chain(wrapped.iter())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Clear `target` and refill it oldest to newest.
    pub fn copy_to(&self, target: &mut Vec<T>) {
        target.clear();
        target.extend(self.iter().cloned());
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Options a committed request ran with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedOptions {
    pub timeout: Option<Duration>,
    pub throw_on_timeout: bool,
    pub cancellable: bool,
}

/// Record of a single committed transition.
///
/// States are captured by name so records stay serializable and never keep a
/// state alive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: TransitionOperation,
    /// Top of the stack before the transition
    pub previous: Option<String>,
    /// Top of the stack after the transition
    pub current: Option<String>,
    pub requested_target: Option<String>,
    pub options: RecordedOptions,
    pub raised_events: bool,
}

/// Record of a request that faulted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FaultRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: TransitionOperation,
    pub target: Option<String>,
    pub error: String,
}
