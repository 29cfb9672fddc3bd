//! Progress reporting and cooperative cancellation.
//!
//! Engines report once per chunk. A reporter answers with
//! [`ControlFlow::Break`] to request cancellation; the engine then stops
//! reading, records `aborted = true` and returns normally.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives per-chunk progress and may request cancellation.
///
/// Implemented for any `FnMut(usize, usize, &str) -> ControlFlow<()>`.
pub trait Progress {
    fn report(&mut self, samples_processed: usize, total_samples: usize, message: &str)
        -> ControlFlow<()>;
}

impl<F> Progress for F
where
    F: FnMut(usize, usize, &str) -> ControlFlow<()>,
{
    fn report(
        &mut self,
        samples_processed: usize,
        total_samples: usize,
        message: &str,
    ) -> ControlFlow<()> {
        self(samples_processed, total_samples, message)
    }
}

/// Reporter that ignores updates and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _: usize, _: usize, _: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Shared cancellation flag, checkable from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Progress for CancelToken {
    fn report(&mut self, _: usize, _: usize, _: &str) -> ControlFlow<()> {
        if self.is_cancelled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// How an engine invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Done,
    Aborted,
}

/// Outcome of an engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub status: CompletionStatus,
    /// Samples whose chunk cores were fully processed.
    pub samples_processed: usize,
    pub total_samples: usize,
}

impl Completion {
    pub fn new(aborted: bool, samples_processed: usize, total_samples: usize) -> Self {
        Self {
            status: if aborted {
                CompletionStatus::Aborted
            } else {
                CompletionStatus::Done
            },
            samples_processed,
            total_samples,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.status == CompletionStatus::Aborted
    }
}
