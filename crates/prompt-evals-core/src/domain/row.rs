//! Dataset rows and the score derived from their evaluation fields.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::criteria::Criteria;

/// Verdict for one criterion on one row.
///
/// Both fields default so that a partially streamed judgment (explanation
/// still arriving, `success` not yet emitted) can be represented.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CriterionResult {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub explanation: String,
}

impl CriterionResult {
    pub fn new(success: bool, explanation: impl Into<String>) -> Self {
        Self {
            success,
            explanation: explanation.into(),
        }
    }
}

/// One input/expected-output example plus its derived fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    /// Input sent as the user message. Never empty.
    pub input: String,

    /// Expected output. May be empty.
    pub output: String,

    /// Latest cumulative model output for this row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,

    /// Similarity of `generated` to `output`, in `[0, 1]`.
    ///
    /// `None` means "not computed", which is distinct from a computed zero.
    #[serde(
        default,
        rename = "embeddingSimilarity",
        skip_serializing_if = "Option::is_none"
    )]
    pub embedding_similarity: Option<f64>,

    /// Per-criterion verdicts keyed by criterion name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub criteria: IndexMap<String, CriterionResult>,
}

impl Row {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    /// Drop everything a generation or evaluation pass produced.
    pub fn clear_derived(&mut self) {
        self.generated = None;
        self.embedding_similarity = None;
        self.criteria.clear();
    }

    /// Verdict for `name`, if one has been recorded.
    pub fn criterion(&self, name: &str) -> Option<&CriterionResult> {
        self.criteria.get(name)
    }

    /// Number of criteria from `criteria` this row currently passes.
    pub fn passed_count(&self, criteria: &Criteria) -> usize {
        criteria
            .iter()
            .filter(|name| self.criterion(name).is_some_and(|r| r.success))
            .count()
    }

    /// `embedding_similarity (or 0) + number of passing criteria`.
    pub fn score(&self, criteria: &Criteria) -> f64 {
        self.embedding_similarity.unwrap_or(0.0) + self.passed_count(criteria) as f64
    }
}

/// Sum of row scores.
pub fn aggregate_score(rows: &[Row], criteria: &Criteria) -> f64 {
    rows.iter().map(|row| row.score(criteria)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(names: &[&str]) -> Criteria {
        Criteria::new(names.iter().map(|s| s.to_string())).expect("valid criteria")
    }

    #[test]
    fn test_score_defaults_missing_similarity_to_zero() {
        let row = Row::new("2+2", "4");
        assert_eq!(row.score(&criteria(&[])), 0.0);
    }

    #[test]
    fn test_score_counts_only_listed_passing_criteria() {
        let mut row = Row::new("2+2", "4");
        row.embedding_similarity = Some(0.5);
        row.criteria
            .insert("concise".into(), CriterionResult::new(true, "one token"));
        row.criteria
            .insert("polite".into(), CriterionResult::new(false, "curt"));
        row.criteria
            .insert("stale".into(), CriterionResult::new(true, "not listed"));

        let c = criteria(&["concise", "polite"]);
        assert_eq!(row.passed_count(&c), 1);
        assert!((row.score(&c) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_monotonic_in_successes() {
        let c = criteria(&["a", "b", "c"]);
        let mut row = Row::new("x", "y");
        row.embedding_similarity = Some(0.2);
        let mut last = row.score(&c);
        assert!(last >= 0.0);
        for name in ["a", "b", "c"] {
            row.criteria
                .insert(name.into(), CriterionResult::new(true, "ok"));
            let next = row.score(&c);
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_clear_derived_keeps_example() {
        let mut row = Row::new("in", "out");
        row.generated = Some("gen".into());
        row.embedding_similarity = Some(0.9);
        row.criteria
            .insert("concise".into(), CriterionResult::new(true, ""));
        row.clear_derived();
        assert_eq!(row, Row::new("in", "out"));
    }

    #[test]
    fn test_absent_similarity_is_not_serialized() {
        let row = Row::new("in", "out");
        let v = serde_json::to_value(&row).expect("serialize");
        assert!(v.get("embeddingSimilarity").is_none());

        let mut scored = row.clone();
        scored.embedding_similarity = Some(0.0);
        let v = serde_json::to_value(&scored).expect("serialize");
        assert_eq!(v["embeddingSimilarity"], serde_json::json!(0.0));
    }

    #[test]
    fn test_aggregate_score_sums_rows() {
        let c = criteria(&[]);
        let mut a = Row::new("2+2", "4");
        a.embedding_similarity = Some(1.0);
        let mut b = Row::new("3+3", "6");
        b.embedding_similarity = Some(1.0);
        assert!((aggregate_score(&[a, b], &c) - 2.0).abs() < 1e-9);
    }
}
