//! Progress sinks and nested progress scoping.
//!
//! Every hook reports its own completion on a `[0, 1]` scale. The executor
//! maps those local ranges onto sub-ranges of the request's overall progress
//! with [`ScopedProgress`], so a hook never needs to know which slice of the
//! transition it owns.

/// Receiver of fractional progress in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, value: f32);
}

/// Clamp a fraction into `[0, 1]`, mapping NaN to zero.
pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Sink that discards every report. Used for rollback re-entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _value: f32) {}
}

/// A view mapping a sub-range of `[0, 1]` onto a parent sink.
///
/// `report(v)` forwards `offset + clamp01(v) * scale` to the parent. Scopes
/// are plain `Copy` values and nest freely.
///
/// # Example
///
/// ```rust
/// use statestack::core::{ProgressSink, ScopedProgress};
/// use std::sync::Mutex;
///
/// struct Last(Mutex<f32>);
///
/// impl ProgressSink for Last {
///     fn report(&self, value: f32) {
///         *self.0.lock().unwrap() = value;
///     }
/// }
///
/// let root = Last(Mutex::new(0.0));
/// let second_half = ScopedProgress::new(&root, 0.5, 0.5);
/// second_half.report(0.5);
/// assert_eq!(*root.0.lock().unwrap(), 0.75);
/// ```
#[derive(Clone, Copy)]
pub struct ScopedProgress<'a> {
    parent: &'a dyn ProgressSink,
    offset: f32,
    scale: f32,
}

impl<'a> ScopedProgress<'a> {
    pub fn new(parent: &'a dyn ProgressSink, offset: f32, scale: f32) -> Self {
        Self {
            parent,
            offset: clamp01(offset),
            scale: clamp01(scale),
        }
    }

    /// Scope covering `[start, end)` of the parent range.
    pub fn range(parent: &'a dyn ProgressSink, start: f32, end: f32) -> Self {
        let start = clamp01(start);
        Self::new(parent, start, clamp01(end) - start)
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Nested scope relative to this one.
    pub fn child(&self, offset: f32, scale: f32) -> ScopedProgress<'_> {
        ScopedProgress::new(self, offset, scale)
    }
}

impl ProgressSink for ScopedProgress<'_> {
    fn report(&self, value: f32) {
        self.parent.report(self.offset + clamp01(value) * self.scale);
    }
}

impl std::fmt::Debug for ScopedProgress<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedProgress")
            .field("offset", &self.offset)
            .field("scale", &self.scale)
            .finish()
    }
}
