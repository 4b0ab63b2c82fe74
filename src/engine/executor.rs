//! Per-operation lifecycle orchestration.
//!
//! The executor is owned by the driver task and is the only code that mutates
//! the stack vector. After every mutation it republishes a snapshot for
//! readers.

use super::cancellation::CancellationScope;
use super::error::{StackError, TransitionPhase};
use super::events::StackEvent;
use super::queue::{Outcome, RequestKind, TransitionRequest};
use super::stack::Shared;
use crate::config::ProgressSplits;
use crate::core::{
    clamp01, same_state, Direction, FaultRecord, HookError, HookResult, NullProgress,
    ProgressSink, ScopedProgress, StateRef, TransitionRecord,
};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Root sink for one request: clamps, keeps progress monotonic, publishes it
/// and raises `ProgressChanged`.
pub(crate) struct RootProgress<'a> {
    shared: &'a Shared,
    high_water: AtomicU32,
}

impl<'a> RootProgress<'a> {
    fn start(shared: &'a Shared) -> Self {
        shared.set_progress(0.0);
        Self {
            shared,
            high_water: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    fn finish(&self) {
        self.report(1.0);
    }
}

impl ProgressSink for RootProgress<'_> {
    fn report(&self, value: f32) {
        let value = clamp01(value);
        let current = f32::from_bits(self.high_water.load(Ordering::Acquire));
        if value <= current {
            return;
        }
        self.high_water.store(value.to_bits(), Ordering::Release);
        self.shared.set_progress(value);
        self.shared.events.emit(StackEvent::ProgressChanged {
            state: self.shared.current_state(),
            value,
        });
    }
}

/// Executes requests one at a time against the owned stack.
pub(crate) struct TransitionExecutor {
    shared: Arc<Shared>,
    stack: Vec<StateRef>,
    splits: ProgressSplits,
}

impl TransitionExecutor {
    pub fn new(shared: Arc<Shared>) -> Self {
        let splits = shared.config.splits.clone();
        Self {
            shared,
            stack: Vec::new(),
            splits,
        }
    }

    /// Run one request through its full lifecycle.
    ///
    /// Progress resolves to 1.0 on every path; successes are recorded in the
    /// transition history, faults in the fault history.
    pub async fn execute(&mut self, request: &TransitionRequest) -> Outcome {
        let shared = Arc::clone(&self.shared);
        let operation = request.operation();
        let target = request.target().cloned();
        let raise_events = request.options.raise_events;
        let previous_top = self.stack.last().cloned();

        // Interior removals are not transitions of the active layer.
        let announce = raise_events
            && match &request.kind {
                RequestKind::Remove(target) => previous_top
                    .as_ref()
                    .is_some_and(|top| same_state(top, target)),
                _ => true,
            };

        let scope = CancellationScope::start(&request.options);
        let progress = RootProgress::start(&shared);

        if announce {
            shared.events.emit(StackEvent::TransitionStarted {
                operation,
                from: previous_top.clone(),
                target: target.clone(),
            });
        }
        debug!(
            %operation,
            requested = target.as_ref().map(|t| t.name()),
            depth = self.stack.len(),
            "Executing transition"
        );

        let result = match &request.kind {
            RequestKind::Push(target) => self
                .push(target, &scope, &progress, raise_events)
                .await
                .map(|()| None),
            RequestKind::Pop { allow_empty } => {
                self.pop(*allow_empty, &scope, &progress, raise_events)
                    .await
            }
            RequestKind::Flatten(target) => self
                .flatten(target, &scope, &progress, raise_events)
                .await
                .map(|()| None),
            RequestKind::Clear => self
                .clear(&scope, &progress, raise_events)
                .await
                .map(|()| None),
            RequestKind::Remove(target) => self
                .remove(target, &scope, &progress, raise_events)
                .await
                .map(|()| None),
        };

        progress.finish();
        let current_top = self.stack.last().cloned();

        match &result {
            Ok(_) => {
                let top_changed = match (&previous_top, &current_top) {
                    (Some(before), Some(after)) => !same_state(before, after),
                    (None, None) => false,
                    _ => true,
                };
                if top_changed {
                    shared.set_previous(previous_top.clone());
                }
                shared.history.lock().push(TransitionRecord {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    operation,
                    previous: previous_top.as_ref().map(|s| s.name().to_string()),
                    current: current_top.as_ref().map(|s| s.name().to_string()),
                    requested_target: target.as_ref().map(|s| s.name().to_string()),
                    options: request.options.summary(),
                    raised_events: raise_events,
                });
                info!(
                    %operation,
                    current = current_top.as_ref().map(|s| s.name()),
                    depth = self.stack.len(),
                    "Transition completed"
                );
                if announce {
                    shared.events.emit(StackEvent::TransitionCompleted {
                        operation,
                        previous: previous_top,
                        current: current_top,
                    });
                }
            }
            Err(error) => {
                warn!(%operation, %error, depth = self.stack.len(), "Transition faulted");
                shared.faults.lock().push(FaultRecord {
                    timestamp: Utc::now(),
                    operation,
                    target: target.as_ref().map(|s| s.name().to_string()),
                    error: error.to_string(),
                });
                if raise_events {
                    shared.events.emit(StackEvent::TransitionFaulted {
                        operation,
                        target,
                        error: error.clone(),
                    });
                }
            }
        }

        result
    }

    async fn push(
        &mut self,
        target: &StateRef,
        scope: &CancellationScope,
        progress: &dyn ProgressSink,
        raise_events: bool,
    ) -> Result<(), StackError> {
        let previous = self.stack.last().cloned();
        if previous.as_ref().is_some_and(|p| same_state(p, target)) {
            progress.report(1.0);
            return Ok(());
        }

        let enter_progress = match &previous {
            Some(previous) => {
                let split = self.splits.push_exit;
                invoke_exit(
                    previous,
                    Some(target),
                    &ScopedProgress::range(progress, 0.0, split),
                    Direction::Forward,
                    TransitionPhase::Exit,
                    scope,
                )
                .await?;
                ScopedProgress::range(progress, split, 1.0)
            }
            None => ScopedProgress::new(progress, 0.0, 1.0),
        };

        self.stack.push(Arc::clone(target));
        self.publish();

        let direction = Direction::Forward;
        let entered = invoke_enter(
            target,
            previous.as_ref(),
            &enter_progress,
            direction,
            TransitionPhase::Enter,
            scope,
        )
        .await;

        if let Err(error) = entered {
            self.stack.pop();
            self.publish();
            if let Some(previous) = &previous {
                self.rollback_enter(previous, target, direction).await;
            }
            return Err(error);
        }

        if raise_events {
            self.shared
                .events
                .emit(StackEvent::StatePushed(Arc::clone(target)));
        }
        Ok(())
    }

    async fn pop(
        &mut self,
        allow_empty: bool,
        scope: &CancellationScope,
        progress: &dyn ProgressSink,
        raise_events: bool,
    ) -> Outcome {
        let Some(top) = self.stack.last().cloned() else {
            if allow_empty {
                progress.report(1.0);
                return Ok(None);
            }
            return Err(StackError::InvalidOperation(
                "cannot pop an empty stack".to_string(),
            ));
        };
        let next = self.below_top();
        let split = self.splits.pop_exit;

        invoke_exit(
            &top,
            next.as_ref(),
            &ScopedProgress::range(progress, 0.0, split),
            Direction::Backward,
            TransitionPhase::Exit,
            scope,
        )
        .await?;

        self.stack.pop();
        self.publish();
        if raise_events {
            self.shared
                .events
                .emit(StackEvent::StatePopped(Arc::clone(&top)));
        }

        match &next {
            Some(next) => {
                invoke_enter(
                    next,
                    Some(&top),
                    &ScopedProgress::range(progress, split, 1.0),
                    Direction::Backward,
                    TransitionPhase::Enter,
                    scope,
                )
                .await?
            }
            None => progress.report(1.0),
        }
        Ok(Some(top))
    }

    async fn flatten(
        &mut self,
        target: &StateRef,
        scope: &CancellationScope,
        progress: &dyn ProgressSink,
        raise_events: bool,
    ) -> Result<(), StackError> {
        let keeps_bottom = self
            .stack
            .first()
            .is_some_and(|bottom| same_state(bottom, target));
        let exits = if keeps_bottom {
            self.stack.len() - 1
        } else {
            self.stack.len()
        };
        let exit_share = self.splits.flatten_exit;
        let per_layer = if exits > 0 {
            exit_share / exits as f32
        } else {
            0.0
        };

        let mut step = 0usize;
        while !self.is_sole(target) && !self.stack.is_empty() {
            let Some(top) = self.stack.last().cloned() else {
                break;
            };
            let below = self.below_top();
            let next = below.clone().unwrap_or_else(|| Arc::clone(target));

            invoke_exit(
                &top,
                Some(&next),
                &ScopedProgress::new(progress, per_layer * step as f32, per_layer),
                Direction::Backward,
                TransitionPhase::Exit,
                scope,
            )
            .await?;

            self.stack.pop();
            self.publish();
            if raise_events {
                self.shared
                    .events
                    .emit(StackEvent::StatePopped(Arc::clone(&top)));
            }

            if let Some(below) = &below {
                invoke_enter(
                    below,
                    Some(&top),
                    &NullProgress,
                    Direction::Backward,
                    TransitionPhase::EnterRollback,
                    scope,
                )
                .await?;
            }
            step += 1;
        }

        if self.stack.is_empty() {
            self.stack.push(Arc::clone(target));
            self.publish();
            let entered = invoke_enter(
                target,
                None,
                &ScopedProgress::range(progress, exit_share, 1.0),
                Direction::Forward,
                TransitionPhase::Enter,
                scope,
            )
            .await;
            if let Err(error) = entered {
                self.stack.pop();
                self.publish();
                return Err(error);
            }
            if raise_events {
                self.shared
                    .events
                    .emit(StackEvent::StatePushed(Arc::clone(target)));
            }
        }

        progress.report(1.0);
        if raise_events {
            self.shared
                .events
                .emit(StackEvent::Flattened(Arc::clone(target)));
        }
        Ok(())
    }

    async fn clear(
        &mut self,
        scope: &CancellationScope,
        progress: &dyn ProgressSink,
        raise_events: bool,
    ) -> Result<(), StackError> {
        let depth = self.stack.len();
        if depth == 0 {
            progress.report(1.0);
            return Ok(());
        }

        let share = 1.0 / depth as f32;
        for step in 0..depth {
            let Some(top) = self.stack.last().cloned() else {
                break;
            };
            let next = self.below_top();
            let base = share * step as f32;
            let exit_share = if next.is_some() {
                share * self.splits.clear_exit
            } else {
                share
            };

            invoke_exit(
                &top,
                next.as_ref(),
                &ScopedProgress::new(progress, base, exit_share),
                Direction::Backward,
                TransitionPhase::Exit,
                scope,
            )
            .await?;

            self.stack.pop();
            self.publish();
            if raise_events {
                self.shared
                    .events
                    .emit(StackEvent::StatePopped(Arc::clone(&top)));
            }

            if let Some(next) = &next {
                invoke_enter(
                    next,
                    Some(&top),
                    &ScopedProgress::new(progress, base + exit_share, share - exit_share),
                    Direction::Backward,
                    TransitionPhase::EnterRollback,
                    scope,
                )
                .await?;
            }
        }

        progress.report(1.0);
        Ok(())
    }

    async fn remove(
        &mut self,
        target: &StateRef,
        scope: &CancellationScope,
        progress: &dyn ProgressSink,
        raise_events: bool,
    ) -> Result<(), StackError> {
        let Some(index) = self.stack.iter().rposition(|s| same_state(s, target)) else {
            return Err(StackError::Validation(format!(
                "state '{}' is not on the stack",
                target.name()
            )));
        };
        let below: Vec<StateRef> = self.stack[..index].to_vec();
        let above: Vec<StateRef> = self.stack[index + 1..].to_vec();

        if above.is_empty() {
            let split = self.splits.remove_top;
            invoke_remove(
                target,
                &below,
                &[],
                &ScopedProgress::range(progress, 0.0, split),
                TransitionPhase::Remove,
                scope,
            )
            .await?;

            self.stack.pop();
            self.publish();
            if raise_events {
                self.shared
                    .events
                    .emit(StackEvent::StateManuallyRemoved(Arc::clone(target)));
            }

            // The exposed layer is re-entered under the rollback phase tag.
            match below.last() {
                Some(exposed) => {
                    invoke_enter(
                        exposed,
                        Some(target),
                        &ScopedProgress::range(progress, split, 1.0),
                        Direction::Backward,
                        TransitionPhase::EnterRollback,
                        scope,
                    )
                    .await?
                }
                None => progress.report(1.0),
            }
        } else {
            invoke_remove(
                target,
                &below,
                &above,
                progress,
                TransitionPhase::Remove,
                scope,
            )
            .await?;

            self.stack.remove(index);
            self.publish();
            if raise_events {
                self.shared
                    .events
                    .emit(StackEvent::StateManuallyRemoved(Arc::clone(target)));
            }
        }
        Ok(())
    }

    /// Re-enter `previous` after `failed` could not be entered, moving
    /// against the direction of the failed step.
    async fn rollback_enter(&self, previous: &StateRef, failed: &StateRef, direction: Direction) {
        let scope = CancellationScope::inert();
        let restored = invoke_enter(
            previous,
            Some(failed),
            &NullProgress,
            direction.reversed(),
            TransitionPhase::EnterRollback,
            &scope,
        )
        .await;
        if let Err(error) = restored {
            warn!(state = previous.name(), %error, "Rollback re-enter failed");
        }
    }

    fn is_sole(&self, target: &StateRef) -> bool {
        self.stack.len() == 1 && same_state(&self.stack[0], target)
    }

    fn below_top(&self) -> Option<StateRef> {
        self.stack
            .len()
            .checked_sub(2)
            .map(|index| Arc::clone(&self.stack[index]))
    }

    fn publish(&self) {
        self.shared.publish(self.stack.clone());
    }
}

async fn invoke_enter(
    state: &StateRef,
    previous: Option<&StateRef>,
    progress: &dyn ProgressSink,
    direction: Direction,
    phase: TransitionPhase,
    scope: &CancellationScope,
) -> Result<(), StackError> {
    let hook = async {
        match state.as_cancellable() {
            Some(cancellable) => {
                cancellable
                    .enter_cancellable(previous, progress, direction, scope.token())
                    .await
            }
            None => state.enter(previous, progress, direction).await,
        }
    };
    guard_hook(state, phase, scope, hook).await
}

async fn invoke_exit(
    state: &StateRef,
    next: Option<&StateRef>,
    progress: &dyn ProgressSink,
    direction: Direction,
    phase: TransitionPhase,
    scope: &CancellationScope,
) -> Result<(), StackError> {
    let hook = async {
        match state.as_cancellable() {
            Some(cancellable) => {
                cancellable
                    .exit_cancellable(next, progress, direction, scope.token())
                    .await
            }
            None => state.exit(next, progress, direction).await,
        }
    };
    guard_hook(state, phase, scope, hook).await
}

async fn invoke_remove(
    state: &StateRef,
    below: &[StateRef],
    above: &[StateRef],
    progress: &dyn ProgressSink,
    phase: TransitionPhase,
    scope: &CancellationScope,
) -> Result<(), StackError> {
    let hook = async {
        match state.as_cancellable() {
            Some(cancellable) => {
                cancellable
                    .remove_cancellable(below, above, progress, scope.token())
                    .await
            }
            None => state.remove(below, above, progress).await,
        }
    };
    guard_hook(state, phase, scope, hook).await
}

/// Check cancellation around a hook, race it against scope expiry and tag
/// its failure with the phase and state.
async fn guard_hook<F>(
    state: &StateRef,
    phase: TransitionPhase,
    scope: &CancellationScope,
    hook: F,
) -> Result<(), StackError>
where
    F: Future<Output = HookResult>,
{
    scope.check()?;
    debug!(state = state.name(), %phase, "Invoking hook");

    let result = tokio::select! {
        biased;
        result = AssertUnwindSafe(hook).catch_unwind() => result.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(state = state.name(), %phase, %message, "Hook panicked");
            Err(HookError::from(format!("hook panicked: {message}")))
        }),
        () = scope.expired() => return Err(scope.error()),
    };

    match result {
        Ok(()) => scope.check(),
        Err(_) if scope.is_cancelled() => Err(scope.error()),
        Err(cause) => Err(StackError::Failed {
            phase,
            state: state.name().to_string(),
            cause: Arc::from(cause),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
