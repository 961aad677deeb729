//! Structured observability hooks for session lifecycle events.
//!
//! This module provides:
//! - Session-scoped tracing spans via `SessionSpan` RAII guard
//! - Emission functions for stage start/finish, row failures, recorded
//!   experiments and proposed revisions
//!
//! Events are emitted at `info!` level (`warn!` for row failures). Set
//! `RUST_LOG` to filter them and pass `--json` to the CLI for JSON lines.

use tracing::{info, warn};

use crate::stage::StageOutcome;

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter(&session.id().to_string());
/// // every event below is tagged with session_id
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("prompt_evals.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a batch stage started over `rows` rows.
pub fn emit_stage_started(stage: &str, rows: usize) {
    info!(event = "stage.started", stage = %stage, rows = rows);
}

/// Emit event: a batch stage finished.
pub fn emit_stage_finished(stage: &str, outcome: &StageOutcome, duration_ms: u64) {
    info!(
        event = "stage.finished",
        stage = %stage,
        processed = outcome.processed,
        failed = outcome.failed,
        cancelled = outcome.cancelled,
        duration_ms = duration_ms,
    );
}

/// Emit event: one row's model call failed and was absorbed.
pub fn emit_row_failed(stage: &str, index: usize, error: &dyn std::fmt::Display) {
    warn!(event = "row.failed", stage = %stage, index = index, error = %error);
}

/// Emit event: an experiment was written to the ledger.
pub fn emit_experiment_recorded(prompt_digest: &str, score: f64, experiments: usize) {
    info!(
        event = "experiment.recorded",
        prompt_digest = %prompt_digest,
        score = score,
        experiments = experiments,
    );
}

/// Emit event: a revised prompt is pending review.
pub fn emit_revision_proposed(prompt_digest: &str, examples: usize, changed_segments: usize) {
    info!(
        event = "revision.proposed",
        prompt_digest = %prompt_digest,
        examples = examples,
        changed_segments = changed_segments,
    );
}
