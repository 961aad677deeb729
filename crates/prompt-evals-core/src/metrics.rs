//! Global atomic counters for model calls and failures.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI session).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Process-wide counters for model traffic and absorbed failures.
pub struct Metrics {
    model_calls: AtomicU64,
    similarity_calls: AtomicU64,
    row_failures: AtomicU64,
    parse_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            model_calls: AtomicU64::new(0),
            similarity_calls: AtomicU64::new(0),
            row_failures: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
        }
    }

    /// Increment the streaming-completion counter by one.
    pub fn inc_model_calls(&self) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_calls", "counter incremented");
    }

    /// Increment the similarity-request counter by one.
    pub fn inc_similarity_calls(&self) {
        self.similarity_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "similarity_calls", "counter incremented");
    }

    /// Increment the absorbed per-row failure counter by one.
    pub fn inc_row_failures(&self) {
        self.row_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "row_failures", "counter incremented");
    }

    /// Increment the structured-output parse failure counter by one.
    pub fn inc_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "parse_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a session, end of a loop)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            model_calls = self.model_calls(),
            similarity_calls = self.similarity_calls(),
            row_failures = self.row_failures(),
            parse_failures = self.parse_failures(),
        );
    }

    pub fn model_calls(&self) -> u64 {
        self.model_calls.load(Ordering::Relaxed)
    }

    pub fn similarity_calls(&self) -> u64 {
        self.similarity_calls.load(Ordering::Relaxed)
    }

    pub fn row_failures(&self) -> u64 {
        self.row_failures.load(Ordering::Relaxed)
    }

    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.model_calls.store(0, Ordering::Relaxed);
        self.similarity_calls.store(0, Ordering::Relaxed);
        self.row_failures.store(0, Ordering::Relaxed);
        self.parse_failures.store(0, Ordering::Relaxed);
    }
}
