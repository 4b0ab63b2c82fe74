//! Public state stack handle.

use super::error::StackError;
use super::events::{DeferredMetrics, EventBus, StackEvent, SubscriptionId};
use super::executor::TransitionExecutor;
use super::options::TransitionOptions;
use super::queue::{
    IdleWait, Outcome, PendingTransition, RequestKind, TransitionHandle, TransitionQueue,
    TransitionRequest, ACTIVE_OPERATION,
};
use crate::config::{StackConfig, ThreadAffinity};
use crate::core::{
    same_state, FaultRecord, RingBuffer, StateRef, StateRegistry, TickMode, TransitionRecord,
};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// State shared between the public handles and the driver task.
pub(crate) struct Shared {
    pub config: StackConfig,
    pub registry: RwLock<StateRegistry>,
    pub snapshot: ArcSwap<Vec<StateRef>>,
    pub previous: RwLock<Option<StateRef>>,
    pub progress: AtomicU32,
    pub history: Mutex<RingBuffer<TransitionRecord>>,
    pub faults: Mutex<RingBuffer<FaultRecord>>,
    pub events: EventBus,
    pub queue: TransitionQueue,
    pub owner: ThreadId,
}

impl Shared {
    fn new(config: StackConfig) -> Self {
        Self {
            registry: RwLock::new(StateRegistry::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            previous: RwLock::new(None),
            progress: AtomicU32::new(0.0f32.to_bits()),
            history: Mutex::new(RingBuffer::new(config.history_capacity)),
            faults: Mutex::new(RingBuffer::new(config.fault_history_capacity)),
            events: EventBus::default(),
            queue: TransitionQueue::default(),
            owner: thread::current().id(),
            config,
        }
    }

    pub fn publish(&self, stack: Vec<StateRef>) {
        self.snapshot.store(Arc::new(stack));
    }

    pub fn current_state(&self) -> Option<StateRef> {
        self.snapshot.load().last().cloned()
    }

    pub fn set_previous(&self, previous: Option<StateRef>) {
        *self.previous.write() = previous;
    }

    pub fn set_progress(&self, value: f32) {
        self.progress.store(value.to_bits(), Ordering::Release);
    }
}

/// Handle to an ordered stack of states.
///
/// Commands validate synchronously and return a [`TransitionHandle`] that
/// resolves once the request has executed. Requests run strictly one at a
/// time, in the order they were accepted, on a driver task spawned when the
/// stack is created. Handles are cheap to clone; states may keep one to issue
/// follow-up requests from their own hooks.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use statestack::core::{State, StateRef};
/// use statestack::engine::{StateStack, TransitionOptions};
/// use std::sync::Arc;
///
/// struct Screen(&'static str);
///
/// #[async_trait]
/// impl State for Screen {
///     fn name(&self) -> &str {
///         self.0
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), statestack::engine::StackError> {
/// let stack = StateStack::new();
/// stack.register(Arc::new(Screen("Menu")), false)?;
/// stack.register(Arc::new(Screen("Game")), false)?;
///
/// stack.push_named("Menu", TransitionOptions::new())?.await?;
/// stack.push_named("Game", TransitionOptions::new())?.await?;
/// let popped = stack.pop(TransitionOptions::new())?.await?;
///
/// assert_eq!(popped.name(), "Game");
/// assert_eq!(stack.current_state().unwrap().name(), "Menu");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StateStack {
    shared: Arc<Shared>,
    mailbox: mpsc::UnboundedSender<PendingTransition>,
}

impl StateStack {
    /// Create a stack with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn new() -> Self {
        Self::spawn(StackConfig::default())
    }

    pub(crate) fn spawn(config: StackConfig) -> Self {
        let shared = Arc::new(Shared::new(config));
        let (mailbox, inbox) = mpsc::unbounded_channel();
        tokio::spawn(drive(Arc::clone(&shared), inbox));
        Self { shared, mailbox }
    }

    pub fn config(&self) -> &StackConfig {
        &self.shared.config
    }

    // Queries

    /// Top of the stack.
    pub fn current_state(&self) -> Option<StateRef> {
        self.shared.current_state()
    }

    /// The state that was on top before the most recent committed transition
    /// that changed the top.
    pub fn previous_state(&self) -> Option<StateRef> {
        self.shared.previous.read().clone()
    }

    /// Progress of the active (or last) request, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Acquire))
    }

    pub fn is_transitioning(&self) -> bool {
        self.shared.queue.is_active()
    }

    /// Snapshot of the stack, bottom first.
    pub fn stack(&self) -> Vec<StateRef> {
        self.shared.snapshot.load().as_ref().clone()
    }

    pub fn depth(&self) -> usize {
        self.shared.snapshot.load().len()
    }

    pub fn contains(&self, state: &StateRef) -> bool {
        self.count_of(state) > 0
    }

    /// How many times this instance currently appears on the stack.
    pub fn count_of(&self, state: &StateRef) -> usize {
        self.shared
            .snapshot
            .load()
            .iter()
            .filter(|entry| same_state(entry, state))
            .count()
    }

    /// Registered names in sorted order.
    pub fn registered_states(&self) -> Vec<String> {
        self.shared.registry.read().names()
    }

    pub fn registered(&self, name: &str) -> Option<StateRef> {
        self.shared.registry.read().get(name).cloned()
    }

    /// Committed transitions, oldest first.
    pub fn transition_history(&self) -> Vec<TransitionRecord> {
        self.shared.history.lock().to_vec()
    }

    /// Refill `target` with the committed transitions, oldest first.
    pub fn copy_history_to(&self, target: &mut Vec<TransitionRecord>) {
        self.shared.history.lock().copy_to(target);
    }

    /// Recent faults, oldest first.
    pub fn recent_faults(&self) -> Vec<FaultRecord> {
        self.shared.faults.lock().to_vec()
    }

    /// Requests accepted but not yet started.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.depth()
    }

    pub fn deferred_metrics(&self) -> DeferredMetrics {
        self.shared.queue.metrics()
    }

    // Registry

    pub fn register(&self, state: StateRef, force: bool) -> Result<bool, StackError> {
        self.ensure_owner()?;
        self.shared.registry.write().register(state, force)
    }

    pub fn unregister(&self, name: &str) -> Result<bool, StackError> {
        self.ensure_owner()?;
        Ok(self.shared.registry.write().unregister(name))
    }

    pub fn unregister_state(&self, state: &StateRef) -> Result<bool, StackError> {
        self.ensure_owner()?;
        Ok(self.shared.registry.write().unregister_state(state))
    }

    // Commands

    /// Make `state` the new top.
    pub fn push(
        &self,
        state: &StateRef,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<()>, StackError> {
        Self::check_target(state)?;
        let reply = self.submit(RequestKind::Push(Arc::clone(state)), options)?;
        Ok(TransitionHandle::new(reply, |_| Ok(())))
    }

    pub fn push_named(
        &self,
        name: &str,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<()>, StackError> {
        let state = self.resolve(name)?;
        self.push(&state, options)
    }

    /// Remove the top; fails with `InvalidOperation` if the stack is empty
    /// when the request runs.
    pub fn pop(&self, options: TransitionOptions) -> Result<TransitionHandle<StateRef>, StackError> {
        let reply = self.submit(RequestKind::Pop { allow_empty: false }, options)?;
        Ok(TransitionHandle::new(reply, |popped| {
            popped.ok_or_else(|| StackError::InvalidOperation("cannot pop an empty stack".to_string()))
        }))
    }

    /// Remove the top if there is one.
    pub fn try_pop(
        &self,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<Option<StateRef>>, StackError> {
        let reply = self.submit(RequestKind::Pop { allow_empty: true }, options)?;
        Ok(TransitionHandle::new(reply, Ok))
    }

    /// Reduce the stack to contain only `state`.
    pub fn flatten(
        &self,
        state: &StateRef,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<()>, StackError> {
        Self::check_target(state)?;
        let reply = self.submit(RequestKind::Flatten(Arc::clone(state)), options)?;
        Ok(TransitionHandle::new(reply, |_| Ok(())))
    }

    pub fn flatten_named(
        &self,
        name: &str,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<()>, StackError> {
        let state = self.resolve(name)?;
        self.flatten(&state, options)
    }

    /// Pop every layer, top to bottom.
    pub fn clear(&self, options: TransitionOptions) -> Result<TransitionHandle<()>, StackError> {
        let reply = self.submit(RequestKind::Clear, options)?;
        Ok(TransitionHandle::new(reply, |_| Ok(())))
    }

    /// Splice `state` out of the stack wherever it sits.
    pub fn remove(
        &self,
        state: &StateRef,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<()>, StackError> {
        Self::check_target(state)?;
        let reply = self.submit(RequestKind::Remove(Arc::clone(state)), options)?;
        Ok(TransitionHandle::new(reply, |_| Ok(())))
    }

    pub fn remove_named(
        &self,
        name: &str,
        options: TransitionOptions,
    ) -> Result<TransitionHandle<()>, StackError> {
        let state = self.resolve(name)?;
        self.remove(&state, options)
    }

    /// Resolves once the active request and the whole queue have drained.
    ///
    /// If a request faulted during this busy period, the first fault is
    /// returned.
    pub fn wait_for_idle(&self) -> IdleWait {
        self.shared.queue.wait_for_idle()
    }

    // Events

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StackEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    // Ticks

    pub fn update(&self, delta: Duration) {
        self.tick(TickMode::Update, delta);
    }

    pub fn fixed_update(&self, delta: Duration) {
        self.tick(TickMode::FixedUpdate, delta);
    }

    pub fn late_update(&self, delta: Duration) {
        self.tick(TickMode::LateUpdate, delta);
    }

    /// Tick the top state and any covered layers that opted in, bottom first.
    /// Skipped entirely while a transition is running.
    fn tick(&self, mode: TickMode, delta: Duration) {
        if self.is_transitioning() {
            return;
        }
        let stack = self.shared.snapshot.load_full();
        let Some((top, covered)) = stack.split_last() else {
            return;
        };
        for state in covered.iter().filter(|state| state.ticks_when_inactive()) {
            state.tick(mode, delta);
        }
        top.tick(mode, delta);
    }

    fn submit(
        &self,
        kind: RequestKind,
        options: TransitionOptions,
    ) -> Result<oneshot::Receiver<Outcome>, StackError> {
        self.ensure_owner()?;
        options.validate()?;
        let request = TransitionRequest::new(kind, options);
        self.shared
            .queue
            .submit(&self.mailbox, request, &self.shared.events)
    }

    fn resolve(&self, name: &str) -> Result<StateRef, StackError> {
        self.shared.registry.read().resolve(name)
    }

    fn check_target(state: &StateRef) -> Result<(), StackError> {
        if state.name().is_empty() {
            return Err(StackError::Validation(
                "target state must have a name".to_string(),
            ));
        }
        Ok(())
    }

    /// Hooks and listeners run on the driver task, which may live on any
    /// worker thread; calls made from there count as owner calls.
    fn ensure_owner(&self) -> Result<(), StackError> {
        let on_driver = ACTIVE_OPERATION.try_with(|_| ()).is_ok();
        match self.shared.config.thread_affinity {
            ThreadAffinity::Owner
                if !on_driver && thread::current().id() != self.shared.owner =>
            {
                Err(StackError::InvalidOperation(
                    "stack commands must be issued from the thread that created the stack"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStack")
            .field("stack", &self.stack())
            .field("queue_depth", &self.queue_depth())
            .field("transitioning", &self.is_transitioning())
            .finish()
    }
}

/// Driver task: the only place requests execute.
async fn drive(shared: Arc<Shared>, mut inbox: mpsc::UnboundedReceiver<PendingTransition>) {
    let mut executor = TransitionExecutor::new(Arc::clone(&shared));
    while let Some(entry) = inbox.recv().await {
        let operation = entry.request.operation();
        let outcome = ACTIVE_OPERATION
            .scope(operation, async {
                shared.queue.begin(&entry, &shared.events);
                executor.execute(&entry.request).await
            })
            .await;
        let PendingTransition { reply, .. } = entry;
        shared.queue.complete(outcome.as_ref().err());
        let _ = reply.send(outcome);
    }
    debug!("State stack driver stopped");
}
