//! Shared plumbing for the batch stages: cancellation, progress events and
//! stage outcomes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::Row;

/// Cooperative cancellation flag.
///
/// Stages poll it before starting each row and after each streamed update.
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the next stage can run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Progress notification delivered to the rendering collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    RowStarted { index: usize, total: usize },
    RowUpdated { index: usize },
    RowFinished { index: usize, total: usize },
    RowFailed { index: usize, error: String },
    SimilarityScored { rows: usize },
}

/// Read-only observer of row state. May be called with partially updated rows.
pub trait StageObserver {
    fn on_event(&mut self, event: &StageEvent, rows: &[Row]);
}

impl<F> StageObserver for F
where
    F: FnMut(&StageEvent, &[Row]),
{
    fn on_event(&mut self, event: &StageEvent, rows: &[Row]) {
        self(event, rows)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_event(&mut self, _event: &StageEvent, _rows: &[Row]) {}
}

/// Summary of one batch stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Rows the stage started work on.
    pub processed: usize,
    /// Rows whose model call failed and was absorbed.
    pub failed: usize,
    /// Whether the stage stopped early on cancellation.
    pub cancelled: bool,
}
