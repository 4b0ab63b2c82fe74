//! Stack events and listener registration.

use super::error::StackError;
use crate::core::{StateRef, TransitionOperation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing requests that had to wait their turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredMetrics {
    /// Requests ever queued behind another transition; never decreases
    pub lifetime_deferred: u64,
    /// Deferred requests still waiting in the queue
    pub pending_deferred: usize,
}

/// Notifications emitted by the stack.
#[derive(Clone, Debug)]
pub enum StackEvent {
    TransitionStarted {
        operation: TransitionOperation,
        from: Option<StateRef>,
        target: Option<StateRef>,
    },
    TransitionCompleted {
        operation: TransitionOperation,
        previous: Option<StateRef>,
        current: Option<StateRef>,
    },
    TransitionFaulted {
        operation: TransitionOperation,
        target: Option<StateRef>,
        error: StackError,
    },
    StatePushed(StateRef),
    StatePopped(StateRef),
    StateManuallyRemoved(StateRef),
    Flattened(StateRef),
    ProgressChanged {
        state: Option<StateRef>,
        value: f32,
    },
    QueueDepthChanged(usize),
    DeferredMetricsChanged(DeferredMetrics),
}

/// Handle returned by `subscribe`, used to remove the listener again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&StackEvent) + Send + Sync>;

/// Synchronous fan-out of stack events.
///
/// Listeners run inline on the emitting task, outside of any internal lock,
/// so they may call back into the stack.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StackEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: StackEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }
}
