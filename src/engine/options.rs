//! Per-request transition options.

use super::error::StackError;
use crate::core::RecordedOptions;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options accepted by every stack command.
///
/// # Example
///
/// ```rust
/// use statestack::engine::TransitionOptions;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = TransitionOptions::new()
///     .cancellation(token.clone())
///     .timeout(Duration::from_secs(5))
///     .throw_on_timeout(false);
///
/// assert_eq!(options.timeout_duration(), Some(Duration::from_secs(5)));
/// ```
#[derive(Clone, Debug)]
pub struct TransitionOptions {
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) throw_on_timeout: bool,
    pub(crate) raise_events: bool,
}

impl TransitionOptions {
    pub fn new() -> Self {
        Self {
            cancellation: None,
            timeout: None,
            throw_on_timeout: true,
            raise_events: true,
        }
    }

    /// Caller-owned token; cancelling it aborts this request only.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Budget for the whole request, measured from when it starts executing.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// When false, an expired timeout surfaces as `Canceled` instead of
    /// `Timeout`.
    pub fn throw_on_timeout(mut self, throw: bool) -> Self {
        self.throw_on_timeout = throw;
        self
    }

    /// When false, lifecycle events are not emitted for this request.
    /// Progress events are still reported.
    pub fn raise_events(mut self, raise: bool) -> Self {
        self.raise_events = raise;
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn raises_events(&self) -> bool {
        self.raise_events
    }

    pub(crate) fn validate(&self) -> Result<(), StackError> {
        match self.timeout {
            Some(timeout) if timeout.is_zero() => Err(StackError::Validation(
                "timeout must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn summary(&self) -> RecordedOptions {
        RecordedOptions {
            timeout: self.timeout,
            throw_on_timeout: self.throw_on_timeout,
            cancellable: self.cancellation.is_some(),
        }
    }
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self::new()
    }
}
