//! Experiment ledger: one snapshot per evaluated prompt text.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::{aggregate_score, prompt_digest, Criteria, Row};

/// Frozen result of evaluating one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub prompt: String,
    /// SHA-256 of `prompt`, hex encoded.
    pub prompt_digest: String,
    pub score: f64,
    pub data: Vec<Row>,
    pub criteria: Criteria,
    pub recorded_at: DateTime<Utc>,
}

impl Experiment {
    /// Snapshot `rows` and `criteria` as evaluated under `prompt`.
    pub fn new(prompt: impl Into<String>, rows: &[Row], criteria: &Criteria) -> Self {
        let prompt = prompt.into();
        Self {
            prompt_digest: prompt_digest(&prompt),
            score: aggregate_score(rows, criteria),
            data: rows.to_vec(),
            criteria: criteria.clone(),
            recorded_at: Utc::now(),
            prompt,
        }
    }

    /// Rows passing `name`, out of all rows.
    pub fn pass_count(&self, name: &str) -> usize {
        self.data
            .iter()
            .filter(|row| row.criterion(name).is_some_and(|r| r.success))
            .count()
    }
}

/// Insertion-ordered experiments keyed by exact prompt text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentLedger {
    entries: IndexMap<String, Experiment>,
}

impl ExperimentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an experiment, replacing any entry for the same prompt text in
    /// place. Returns the stored experiment.
    pub fn record(&mut self, prompt: &str, rows: &[Row], criteria: &Criteria) -> &Experiment {
        let experiment = Experiment::new(prompt, rows, criteria);
        let (index, _) = self.entries.insert_full(prompt.to_string(), experiment);
        &self.entries[index]
    }

    pub fn get(&self, prompt: &str) -> Option<&Experiment> {
        self.entries.get(prompt)
    }

    /// Experiments in first-recorded order.
    pub fn list(&self) -> impl Iterator<Item = &Experiment> {
        self.entries.values()
    }

    /// Highest-scoring experiment; the earliest wins a tie.
    pub fn best(&self) -> Option<&Experiment> {
        self.entries
            .values()
            .fold(None, |best: Option<&Experiment>, e| match best {
                Some(b) if b.score >= e.score => Some(b),
                _ => Some(e),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
