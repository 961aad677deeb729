//! Batch generator: run the current prompt over every row, one row at a time.
//!
//! Rows are processed strictly in order with at most one model call in flight.
//! Cancellation is checked before each row and after each streamed snapshot;
//! once seen, the current row keeps its partial text and no later row starts.
//! A failed model call is written into the row as a placeholder and the batch
//! moves on.

use futures::StreamExt;
use tracing::{debug, info_span, Instrument};

use crate::domain::{PromptEvalsError, Result, Row};
use crate::gateway::{ChatMessage, CompletionRequest, ModelGateway};
use crate::metrics::METRICS;
use crate::obs::emit_row_failed;
use crate::stage::{CancelFlag, StageEvent, StageObserver, StageOutcome};

/// Placeholder stored in `generated` when a row's model call fails.
pub fn error_placeholder(err: &PromptEvalsError) -> String {
    format!("Error generating output: {}", err)
}

/// Fill `generated` for every row using `prompt` as the system message.
pub async fn generate_outputs(
    gateway: &dyn ModelGateway,
    model: &str,
    prompt: &str,
    rows: &mut [Row],
    cancel: &CancelFlag,
    observer: &mut dyn StageObserver,
) -> Result<StageOutcome> {
    let total = rows.len();
    let mut outcome = StageOutcome::default();

    for index in 0..total {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        observer.on_event(&StageEvent::RowStarted { index, total }, rows);
        outcome.processed += 1;

        let span = info_span!("generate.row", index);
        let result = generate_row(gateway, model, prompt, rows, index, cancel, observer)
            .instrument(span)
            .await;

        match result {
            Ok(stopped) => {
                if stopped {
                    outcome.cancelled = true;
                    break;
                }
            }
            Err(err) if err.is_model_failure() => {
                METRICS.inc_row_failures();
                emit_row_failed("generate", index, &err);
                rows[index].generated = Some(error_placeholder(&err));
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

/// Stream one row. Returns `true` when cancellation stopped the stream.
async fn generate_row(
    gateway: &dyn ModelGateway,
    model: &str,
    prompt: &str,
    rows: &mut [Row],
    index: usize,
    cancel: &CancelFlag,
    observer: &mut dyn StageObserver,
) -> Result<bool> {
    let request = CompletionRequest::new(
        model,
        vec![
            ChatMessage::system(prompt),
            ChatMessage::user(rows[index].input.clone()),
        ],
    );
    let mut stream = gateway.stream_completion(request).await?;
    let mut seen = false;

    while let Some(event) = stream.next().await {
        if cancel.is_cancelled() {
            debug!(index, "generation cancelled mid-stream");
            return Ok(true);
        }
        rows[index].generated = Some(event?);
        seen = true;
        observer.on_event(&StageEvent::RowUpdated { index }, rows);
    }

    // An empty reply still counts as generated.
    if !seen {
        debug!(index, "model returned no content");
        rows[index].generated = Some(String::new());
        observer.on_event(&StageEvent::RowUpdated { index }, rows);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedGateway, ScriptedReply};
    use crate::gateway::Role;
    use crate::stage::NoopObserver;

    fn rows() -> Vec<Row> {
        vec![Row::new("2+2", "4"), Row::new("3+3", "6")]
    }

    #[tokio::test]
    async fn test_generates_each_row_in_order() {
        let gateway = ScriptedGateway::new().reply("4").reply("6");
        let mut data = rows();
        let outcome = generate_outputs(
            &gateway,
            "m",
            "Answer with just the number.",
            &mut data,
            &CancelFlag::new(),
            &mut NoopObserver,
        )
        .await
        .expect("generate");

        assert_eq!(outcome.processed, 2);
        assert!(!outcome.cancelled);
        assert_eq!(data[0].generated.as_deref(), Some("4"));
        assert_eq!(data[1].generated.as_deref(), Some("6"));

        let requests = gateway.requests();
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, "Answer with just the number.");
        assert_eq!(requests[1].messages[1].content, "3+3");
    }

    #[tokio::test]
    async fn test_failed_row_gets_placeholder_and_batch_continues() {
        let gateway = ScriptedGateway::new()
            .push(ScriptedReply::Fail(PromptEvalsError::Transport(
                "connection reset".into(),
            )))
            .reply("6");
        let mut data = rows();
        let outcome = generate_outputs(
            &gateway,
            "m",
            "p",
            &mut data,
            &CancelFlag::new(),
            &mut NoopObserver,
        )
        .await
        .expect("generate");

        assert_eq!(outcome.failed, 1);
        let placeholder = data[0].generated.as_deref().expect("placeholder");
        assert!(placeholder.starts_with("Error generating output:"));
        assert!(placeholder.contains("connection reset"));
        assert_eq!(data[1].generated.as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_replaces_partial_text() {
        let gateway = ScriptedGateway::new().push(ScriptedReply::FailMidStream(
            vec!["par".into()],
            PromptEvalsError::Transport("eof".into()),
        ));
        let mut data = vec![Row::new("x", "y")];
        generate_outputs(
            &gateway,
            "m",
            "p",
            &mut data,
            &CancelFlag::new(),
            &mut NoopObserver,
        )
        .await
        .expect("generate");
        assert!(data[0]
            .generated
            .as_deref()
            .is_some_and(|g| g.starts_with("Error generating output:")));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial_text() {
        let gateway = ScriptedGateway::new()
            .push(ScriptedReply::Snapshots(vec![
                "one".into(),
                "one two".into(),
                "one two three".into(),
            ]))
            .reply("unused");
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let mut observer = |event: &StageEvent, rows: &[Row]| {
            if matches!(event, StageEvent::RowUpdated { index: 0 })
                && rows[0].generated.as_deref() == Some("one two")
            {
                trigger.cancel();
            }
        };
        let mut data = rows();
        let outcome = generate_outputs(&gateway, "m", "p", &mut data, &cancel, &mut observer)
            .await
            .expect("generate");

        assert!(outcome.cancelled);
        assert_eq!(data[0].generated.as_deref(), Some("one two"));
        assert!(data[1].generated.is_none());
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_reply_is_stored_as_empty_output() {
        let gateway = ScriptedGateway::new()
            .push(ScriptedReply::Snapshots(vec![]))
            .reply("6");
        let mut data = rows();
        data[0].generated = Some("stale".into());
        let outcome = generate_outputs(
            &gateway,
            "m",
            "p",
            &mut data,
            &CancelFlag::new(),
            &mut NoopObserver,
        )
        .await
        .expect("generate");

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.cancelled);
        assert_eq!(data[0].generated.as_deref(), Some(""));
        assert_eq!(data[1].generated.as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let gateway = ScriptedGateway::new().reply("4");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut data = rows();
        let outcome = generate_outputs(&gateway, "m", "p", &mut data, &cancel, &mut NoopObserver)
            .await
            .expect("generate");
        assert!(outcome.cancelled);
        assert_eq!(outcome.processed, 0);
        assert_eq!(gateway.call_count(), 0);
    }
}
