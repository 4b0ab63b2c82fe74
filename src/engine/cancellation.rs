//! Merges a caller cancellation token and an optional timeout into one signal.

use super::error::StackError;
use super::options::TransitionOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Effective cancellation signal for one executing request.
///
/// | caller token | timeout | effective token                 |
/// |--------------|---------|---------------------------------|
/// | no           | no      | inert token, never cancelled    |
/// | no           | yes     | fresh token tripped at deadline |
/// | yes          | no      | the caller token itself         |
/// | yes          | yes     | child of the caller token       |
#[derive(Debug)]
pub struct CancellationScope {
    token: CancellationToken,
    caller: Option<CancellationToken>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    throw_on_timeout: bool,
    timed_out: AtomicBool,
}

impl CancellationScope {
    /// Start the scope; the timeout clock begins now.
    pub fn start(options: &TransitionOptions) -> Self {
        let caller = options.cancellation.clone();
        let timeout = options.timeout;
        let token = match (&caller, timeout) {
            (Some(caller), Some(_)) => caller.child_token(),
            (Some(caller), None) => caller.clone(),
            (None, _) => CancellationToken::new(),
        };
        Self {
            token,
            caller,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            timeout,
            throw_on_timeout: options.throw_on_timeout,
            timed_out: AtomicBool::new(false),
        }
    }

    /// Scope that never cancels, used for rollback hooks.
    pub fn inert() -> Self {
        Self::start(&TransitionOptions::new())
    }

    /// Token handed to cancellable hooks.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True only if the deadline tripped and the caller did not cancel.
    pub fn is_timeout(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
            && !self.caller.as_ref().is_some_and(|caller| caller.is_cancelled())
    }

    /// Poll the deadline and report whether the effective token is cancelled.
    pub fn is_cancelled(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.trip_deadline();
            }
        }
        self.token.is_cancelled()
    }

    /// Fail with the matching error if the scope has been cancelled.
    pub fn check(&self) -> Result<(), StackError> {
        if self.is_cancelled() {
            Err(self.error())
        } else {
            Ok(())
        }
    }

    /// Resolves once the caller cancels or the deadline passes.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => self.trip_deadline(),
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Error describing why the scope is cancelled.
    pub fn error(&self) -> StackError {
        match self.timeout {
            Some(timeout) if self.is_timeout() && self.throw_on_timeout => {
                StackError::Timeout { timeout }
            }
            _ => StackError::Canceled,
        }
    }

    fn trip_deadline(&self) {
        if !self.token.is_cancelled() {
            self.timed_out.store(true, Ordering::Release);
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inert_scope_never_cancels() {
        let scope = CancellationScope::start(&TransitionOptions::new());
        assert!(scope.check().is_ok());
        assert!(!scope.is_timeout());
    }

    #[tokio::test]
    async fn caller_token_passes_through() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::start(&TransitionOptions::new().cancellation(caller.clone()));

        caller.cancel();
        assert!(scope.is_cancelled());
        assert!(!scope.is_timeout());
        assert!(matches!(scope.check(), Err(StackError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_trips_scope() {
        let timeout = Duration::from_millis(50);
        let scope = CancellationScope::start(&TransitionOptions::new().timeout(timeout));

        scope.expired().await;

        assert!(scope.is_timeout());
        assert!(scope.token().is_cancelled());
        assert!(matches!(
            scope.check(),
            Err(StackError::Timeout { timeout: t }) if t == timeout
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn linked_scope_does_not_cancel_caller() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::start(
            &TransitionOptions::new()
                .cancellation(caller.clone())
                .timeout(Duration::from_millis(5)),
        );

        scope.expired().await;

        assert!(scope.is_timeout());
        assert!(!caller.is_cancelled());
    }

    #[tokio::test]
    async fn caller_cancel_wins_over_timeout() {
        let caller = CancellationToken::new();
        let scope = CancellationScope::start(
            &TransitionOptions::new()
                .cancellation(caller.clone())
                .timeout(Duration::from_secs(60)),
        );

        caller.cancel();
        scope.expired().await;

        assert!(!scope.is_timeout());
        assert!(matches!(scope.error(), StackError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_can_surface_as_cancel() {
        let scope = CancellationScope::start(
            &TransitionOptions::new()
                .timeout(Duration::from_millis(1))
                .throw_on_timeout(false),
        );

        scope.expired().await;

        assert!(scope.is_timeout());
        assert!(matches!(scope.error(), StackError::Canceled));
    }
}
