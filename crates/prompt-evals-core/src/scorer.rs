//! Scorer: embedding similarity for the whole batch, then rubric judgments
//! one row at a time.
//!
//! The similarity pass is all-or-nothing: a failed call leaves every row
//! untouched and the error goes to the caller. The criteria pass streams a
//! structured judgment per row and merges each decodable prefix into the row,
//! so partial verdicts are visible while the judge is still writing.

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::domain::{Criteria, CriterionResult, PromptEvalsError, Result, Row};
use crate::gateway::{ChatMessage, CompletionRequest, CriteriaSchema, ModelGateway};
use crate::metrics::METRICS;
use crate::obs::emit_row_failed;
use crate::partial_json::parse_partial;
use crate::stage::{CancelFlag, StageEvent, StageObserver, StageOutcome};

const JUDGE_INSTRUCTIONS: &str =
    "Given the <EXPECTED> text and the <GENERATED> output, evaluate the criteria.";

/// User message framing the expected and generated text for the judge.
pub fn judge_message(row: &Row) -> String {
    format!(
        "<EXPECTED>\n{}\n</EXPECTED>\n\n<GENERATED>\n{}\n</GENERATED>",
        row.output,
        row.generated.as_deref().unwrap_or_default()
    )
}

/// Score `generated` against `output` for every row in one call.
pub async fn score_similarity(
    gateway: &dyn ModelGateway,
    rows: &mut [Row],
    observer: &mut dyn StageObserver,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let candidates: Vec<String> = rows
        .iter()
        .map(|row| row.generated.clone().unwrap_or_default())
        .collect();
    let references: Vec<String> = rows.iter().map(|row| row.output.clone()).collect();

    let scores = gateway
        .compute_similarity(&candidates, &references)
        .await?;
    if scores.len() != rows.len() {
        return Err(PromptEvalsError::Transport(format!(
            "similarity returned {} scores for {} rows",
            scores.len(),
            rows.len()
        )));
    }

    for (row, score) in rows.iter_mut().zip(scores) {
        row.embedding_similarity = Some(score);
    }
    debug!(rows = rows.len(), "similarity scored");
    observer.on_event(&StageEvent::SimilarityScored { rows: rows.len() }, rows);
    Ok(())
}

/// Merge the verdicts found in `value` into `row`.
///
/// Only names in `criteria` are taken. A verdict replaces the row's previous
/// one for that name; fields not emitted yet take their defaults.
pub fn merge_verdicts(row: &mut Row, criteria: &Criteria, value: &Value) {
    let Some(object) = value.as_object() else {
        return;
    };
    for name in criteria.iter() {
        let Some(verdict) = object.get(name) else {
            continue;
        };
        match serde_json::from_value::<CriterionResult>(verdict.clone()) {
            Ok(result) => {
                row.criteria.insert(name.to_string(), result);
            }
            Err(err) => debug!(criterion = %name, error = %err, "skipping malformed verdict"),
        }
    }
}

/// Judge every row against `criteria`. A no-op when `criteria` is empty.
pub async fn evaluate_criteria(
    gateway: &dyn ModelGateway,
    model: &str,
    criteria: &Criteria,
    rows: &mut [Row],
    cancel: &CancelFlag,
    observer: &mut dyn StageObserver,
) -> Result<StageOutcome> {
    let mut outcome = StageOutcome::default();
    if criteria.is_empty() {
        return Ok(outcome);
    }
    let total = rows.len();

    for index in 0..total {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        observer.on_event(&StageEvent::RowStarted { index, total }, rows);
        outcome.processed += 1;

        let span = info_span!("evaluate.row", index);
        let result = judge_row(gateway, model, criteria, rows, index, cancel, observer)
            .instrument(span)
            .await;

        match result {
            Ok(true) => {
                outcome.cancelled = true;
                break;
            }
            Ok(false) => {}
            Err(err) if err.is_model_failure() => {
                METRICS.inc_row_failures();
                emit_row_failed("evaluate", index, &err);
                outcome.failed += 1;
                observer.on_event(
                    &StageEvent::RowFailed {
                        index,
                        error: err.to_string(),
                    },
                    rows,
                );
            }
            Err(err) => return Err(err),
        }
        observer.on_event(&StageEvent::RowFinished { index, total }, rows);
    }

    Ok(outcome)
}

/// Stream one judgment. Returns `true` when cancellation stopped the stream.
async fn judge_row(
    gateway: &dyn ModelGateway,
    model: &str,
    criteria: &Criteria,
    rows: &mut [Row],
    index: usize,
    cancel: &CancelFlag,
    observer: &mut dyn StageObserver,
) -> Result<bool> {
    let request = CompletionRequest::new(
        model,
        vec![
            ChatMessage::system(JUDGE_INSTRUCTIONS),
            ChatMessage::user(judge_message(&rows[index])),
        ],
    )
    .with_schema(CriteriaSchema::new(criteria.clone()));
    let mut stream = gateway.stream_completion(request).await?;

    let mut latest = String::new();
    while let Some(event) = stream.next().await {
        if cancel.is_cancelled() {
            debug!(index, "evaluation cancelled mid-stream");
            return Ok(true);
        }
        latest = event?;
        if latest.is_empty() {
            continue;
        }
        // Prefixes that do not decode yet are expected mid-stream.
        if let Ok(value) = parse_partial(&latest) {
            merge_verdicts(&mut rows[index], criteria, &value);
            observer.on_event(&StageEvent::RowUpdated { index }, rows);
        }
    }

    match serde_json::from_str::<Value>(&latest) {
        Ok(value) => {
            merge_verdicts(&mut rows[index], criteria, &value);
            observer.on_event(&StageEvent::RowUpdated { index }, rows);
        }
        Err(err) => {
            METRICS.inc_parse_failures();
            warn!(index, error = %err, "final judgment is not valid JSON; keeping merged fields");
        }
    }
    Ok(false)
}
