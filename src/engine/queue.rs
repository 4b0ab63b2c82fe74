//! FIFO admission control for transition requests.
//!
//! Exactly one request executes at a time. A request that arrives while the
//! engine is busy (including one issued from inside a running hook) is counted
//! as deferred and waits in the mailbox behind everything accepted before it.

use super::error::StackError;
use super::events::{DeferredMetrics, EventBus, StackEvent};
use super::options::TransitionOptions;
use crate::core::{StateRef, TransitionOperation};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

tokio::task_local! {
    /// Set on the driver task while a request executes.
    pub(crate) static ACTIVE_OPERATION: TransitionOperation;
}

/// What a request asks the executor to do.
#[derive(Clone, Debug)]
pub(crate) enum RequestKind {
    Push(StateRef),
    Pop { allow_empty: bool },
    Flatten(StateRef),
    Clear,
    Remove(StateRef),
}

#[derive(Clone, Debug)]
pub(crate) struct TransitionRequest {
    pub kind: RequestKind,
    pub options: TransitionOptions,
}

impl TransitionRequest {
    pub fn new(kind: RequestKind, options: TransitionOptions) -> Self {
        Self { kind, options }
    }

    pub fn operation(&self) -> TransitionOperation {
        match self.kind {
            RequestKind::Push(_) => TransitionOperation::Push,
            RequestKind::Pop { .. } => TransitionOperation::Pop,
            RequestKind::Flatten(_) => TransitionOperation::Flatten,
            RequestKind::Clear => TransitionOperation::Clear,
            RequestKind::Remove(_) => TransitionOperation::Remove,
        }
    }

    pub fn target(&self) -> Option<&StateRef> {
        match &self.kind {
            RequestKind::Push(target) | RequestKind::Flatten(target) | RequestKind::Remove(target) => {
                Some(target)
            }
            RequestKind::Pop { .. } | RequestKind::Clear => None,
        }
    }
}

/// Result delivered to a request's handle; pops carry the removed state.
pub(crate) type Outcome = Result<Option<StateRef>, StackError>;

/// Mailbox entry: the request, its reply slot and whether it was deferred.
pub(crate) struct PendingTransition {
    pub request: TransitionRequest,
    pub reply: oneshot::Sender<Outcome>,
    pub deferred: bool,
}

#[derive(Default)]
struct Admission {
    active: bool,
    queued: usize,
    lifetime_deferred: u64,
    idle_waiters: Vec<oneshot::Sender<Result<(), StackError>>>,
    cycle_fault: Option<StackError>,
}

impl Admission {
    fn metrics(&self) -> DeferredMetrics {
        DeferredMetrics {
            lifetime_deferred: self.lifetime_deferred,
            pending_deferred: self.queued,
        }
    }
}

/// Admission bookkeeping shared by the public handle and the driver task.
#[derive(Default)]
pub(crate) struct TransitionQueue {
    admission: Mutex<Admission>,
}

impl TransitionQueue {
    /// Accept a request, running it next if idle or queueing it otherwise.
    pub fn submit(
        &self,
        mailbox: &mpsc::UnboundedSender<PendingTransition>,
        request: TransitionRequest,
        events: &EventBus,
    ) -> Result<oneshot::Receiver<Outcome>, StackError> {
        let reentrant = ACTIVE_OPERATION.try_with(|_| ()).is_ok();
        let operation = request.operation();
        let (reply, receiver) = oneshot::channel();

        let deferred_update = {
            let mut admission = self.admission.lock();
            let deferred = admission.active || admission.queued > 0 || reentrant;
            let entry = PendingTransition {
                request,
                reply,
                deferred,
            };
            if mailbox.send(entry).is_err() {
                return Err(StackError::Stopped);
            }
            if deferred {
                admission.queued += 1;
                admission.lifetime_deferred += 1;
                Some((admission.queued, admission.metrics()))
            } else {
                admission.active = true;
                None
            }
        };

        match deferred_update {
            Some((depth, metrics)) => {
                debug!(%operation, depth, reentrant, "Transition deferred");
                events.emit(StackEvent::QueueDepthChanged(depth));
                events.emit(StackEvent::DeferredMetricsChanged(metrics));
            }
            None => debug!(%operation, "Transition admitted"),
        }
        Ok(receiver)
    }

    /// Called by the driver when it takes an entry out of the mailbox.
    pub fn begin(&self, entry: &PendingTransition, events: &EventBus) {
        if !entry.deferred {
            return;
        }
        let (depth, metrics) = {
            let mut admission = self.admission.lock();
            admission.active = true;
            admission.queued = admission.queued.saturating_sub(1);
            (admission.queued, admission.metrics())
        };
        events.emit(StackEvent::QueueDepthChanged(depth));
        events.emit(StackEvent::DeferredMetricsChanged(metrics));
    }

    /// Called by the driver after an entry finished executing.
    ///
    /// When nothing else is queued the engine goes idle and every idle-waiter
    /// resolves, receiving the first fault of this busy cycle if there was one.
    pub fn complete(&self, fault: Option<&StackError>) {
        let (waiters, fault) = {
            let mut admission = self.admission.lock();
            if let Some(fault) = fault {
                if admission.cycle_fault.is_none() {
                    admission.cycle_fault = Some(fault.clone());
                }
            }
            if admission.queued > 0 {
                return;
            }
            admission.active = false;
            (
                std::mem::take(&mut admission.idle_waiters),
                admission.cycle_fault.take(),
            )
        };

        for waiter in waiters {
            let result = match &fault {
                Some(fault) => Err(fault.clone()),
                None => Ok(()),
            };
            let _ = waiter.send(result);
        }
    }

    /// Future resolving once the active request and the queue have drained.
    pub fn wait_for_idle(&self) -> IdleWait {
        if ACTIVE_OPERATION.try_with(|_| ()).is_ok() {
            return IdleWait::Ready(Some(Err(StackError::InvalidOperation(
                "waiting for idle from inside a transition hook would deadlock".to_string(),
            ))));
        }
        let mut admission = self.admission.lock();
        if !admission.active {
            return IdleWait::Ready(Some(Ok(())));
        }
        let (waiter, receiver) = oneshot::channel();
        admission.idle_waiters.push(waiter);
        IdleWait::Waiting(receiver)
    }

    pub fn is_active(&self) -> bool {
        self.admission.lock().active
    }

    pub fn depth(&self) -> usize {
        self.admission.lock().queued
    }

    pub fn metrics(&self) -> DeferredMetrics {
        self.admission.lock().metrics()
    }
}

/// Future returned by `StateStack::wait_for_idle`.
pub enum IdleWait {
    #[doc(hidden)]
    Ready(Option<Result<(), StackError>>),
    #[doc(hidden)]
    Waiting(oneshot::Receiver<Result<(), StackError>>),
}

impl Future for IdleWait {
    type Output = Result<(), StackError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            IdleWait::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            IdleWait::Waiting(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(StackError::Stopped))),
        }
    }
}

/// Future resolving to the result of one accepted request.
///
/// Dropping the handle does not withdraw the request; it still runs in order
/// and its result is discarded.
pub struct TransitionHandle<T> {
    reply: oneshot::Receiver<Outcome>,
    map: fn(Option<StateRef>) -> Result<T, StackError>,
}

impl<T> TransitionHandle<T> {
    pub(crate) fn new(
        reply: oneshot::Receiver<Outcome>,
        map: fn(Option<StateRef>) -> Result<T, StackError>,
    ) -> Self {
        Self { reply, map }
    }
}

impl<T> Future for TransitionHandle<T> {
    type Output = Result<T, StackError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Ok(operation) = ACTIVE_OPERATION.try_with(|operation| *operation) {
            return Poll::Ready(Err(StackError::InvalidOperation(format!(
                "awaiting a queued request from inside a running {operation} would deadlock"
            ))));
        }
        let this = self.get_mut();
        let map = this.map;
        Pin::new(&mut this.reply).poll(cx).map(|received| match received {
            Ok(outcome) => outcome.and_then(map),
            Err(_) => Err(StackError::Stopped),
        })
    }
}

impl<T> std::fmt::Debug for TransitionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionHandle").finish_non_exhaustive()
    }
}
