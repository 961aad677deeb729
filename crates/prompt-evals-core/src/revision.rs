//! Revision engine: feed the worst-scoring rows back to the model and diff
//! the improved prompt against the current one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diff::{word_diff, DiffSegment};
use crate::domain::{Criteria, Result, Row};
use crate::gateway::{collect_final, ChatMessage, CompletionRequest, ModelGateway};
use crate::synthesize::{extract_prompt, synthesis_messages};

const REVISION_REQUEST: &str =
    "Improve this prompt using feedback from these evals and try to improve similarity. Think step by step.";

/// A proposed prompt and its word diff against the prompt it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub previous: String,
    pub text: String,
    pub diff: Vec<DiffSegment>,
}

/// The `n` lowest-scoring rows, ascending. Ties keep dataset order.
pub fn select_worst<'a>(rows: &'a [Row], criteria: &Criteria, n: usize) -> Vec<&'a Row> {
    let mut ranked: Vec<&Row> = rows.iter().collect();
    ranked.sort_by(|a, b| a.score(criteria).total_cmp(&b.score(criteria)));
    ranked.truncate(n);
    ranked
}

fn eval_block(row: &Row, criteria: &Criteria) -> String {
    let similarity = row
        .embedding_similarity
        .map(|s| s.to_string())
        .unwrap_or_default();
    let mut block = format!(
        "<EVAL>\n<INPUT>{}</INPUT>\n<EXPECTED>{}</EXPECTED>\n<GENERATED>{}</GENERATED>\n<SIMILARITY>{}</SIMILARITY>\n",
        row.input,
        row.output,
        row.generated.as_deref().unwrap_or_default(),
        similarity
    );
    let checks = criteria
        .iter()
        .map(|name| {
            let verdict = row.criterion(name);
            let mark = if verdict.is_some_and(|v| v.success) {
                "YES"
            } else {
                "NO"
            };
            let explanation = verdict.map(|v| v.explanation.as_str()).unwrap_or_default();
            format!(
                "<CHECK>\n  <CRITERION>{}</CRITERION>\n  <RESULT>{} {}</RESULT>\n</CHECK>",
                name, mark, explanation
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    block.push_str(&checks);
    block.push_str("\n</EVAL>");
    block
}

/// User message carrying one `<EVAL>` block per example.
pub fn feedback_message(examples: &[&Row], criteria: &Criteria) -> String {
    let evals = examples
        .iter()
        .map(|row| eval_block(row, criteria))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}", REVISION_REQUEST, evals)
}

/// The synthesis exchange, the current prompt as the assistant's answer, and
/// the feedback.
pub fn revision_messages(
    sample: &[Row],
    current_prompt: &str,
    examples: &[&Row],
    criteria: &Criteria,
) -> Vec<ChatMessage> {
    let mut messages = synthesis_messages(sample);
    messages.push(ChatMessage::assistant(format!(
        "<PROMPT>{}</PROMPT>",
        current_prompt
    )));
    messages.push(ChatMessage::user(feedback_message(examples, criteria)));
    messages
}

/// Ask the model for an improved prompt using the `examples` worst rows.
///
/// `on_text` sees the extracted prompt after every snapshot.
#[allow(clippy::too_many_arguments)]
pub async fn revise_prompt(
    gateway: &dyn ModelGateway,
    model: &str,
    current_prompt: &str,
    sample: &[Row],
    rows: &[Row],
    criteria: &Criteria,
    examples: usize,
    mut on_text: impl FnMut(&str),
) -> Result<Revision> {
    let worst = select_worst(rows, criteria, examples);
    let request = CompletionRequest::new(
        model,
        revision_messages(sample, current_prompt, &worst, criteria),
    );
    let stream = gateway.stream_completion(request).await?;
    let raw = collect_final(stream, |text| on_text(&extract_prompt(text))).await?;

    let text = extract_prompt(&raw);
    let diff = word_diff(current_prompt, &text);
    debug!(examples = worst.len(), segments = diff.len(), "revision received");
    Ok(Revision {
        previous: current_prompt.to_string(),
        text,
        diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CriterionResult;
    use crate::fakes::ScriptedGateway;
    use crate::gateway::Role;

    fn scored(input: &str, similarity: f64, concise: Option<bool>) -> Row {
        let mut row = Row::new(input, "expected");
        row.generated = Some(format!("gen {}", input));
        row.embedding_similarity = Some(similarity);
        if let Some(success) = concise {
            row.criteria
                .insert("concise".into(), CriterionResult::new(success, "why"));
        }
        row
    }

    fn concise() -> Criteria {
        Criteria::parse("concise").expect("criteria")
    }

    #[test]
    fn test_select_worst_is_ascending_and_stable() {
        let rows = vec![
            scored("a", 0.5, Some(true)),
            scored("b", 0.2, Some(false)),
            scored("c", 0.9, Some(false)),
            scored("d", 0.2, None),
        ];
        let worst: Vec<&str> = select_worst(&rows, &concise(), 3)
            .iter()
            .map(|r| r.input.as_str())
            .collect();
        assert_eq!(worst, vec!["b", "d", "c"]);
    }

    #[test]
    fn test_select_worst_clamps_to_row_count() {
        let rows = vec![scored("a", 0.5, None)];
        assert_eq!(select_worst(&rows, &Criteria::empty(), 10).len(), 1);
        assert!(select_worst(&rows, &Criteria::empty(), 0).is_empty());
    }

    #[test]
    fn test_feedback_message_layout() {
        let mut row = Row::new("2+2", "4");
        row.generated = Some("four".into());
        row.embedding_similarity = Some(0.5);
        row.criteria
            .insert("concise".into(), CriterionResult::new(false, "spelled out"));
        let message = feedback_message(&[&row], &concise());
        assert_eq!(
            message,
            "Improve this prompt using feedback from these evals and try to improve similarity. Think step by step.\n\n\
<EVAL>\n<INPUT>2+2</INPUT>\n<EXPECTED>4</EXPECTED>\n<GENERATED>four</GENERATED>\n<SIMILARITY>0.5</SIMILARITY>\n\
<CHECK>\n  <CRITERION>concise</CRITERION>\n  <RESULT>NO spelled out</RESULT>\n</CHECK>\n</EVAL>"
        );
    }

    #[test]
    fn test_missing_verdict_renders_as_no() {
        let row = scored("a", 0.1, None);
        let message = feedback_message(&[&row], &concise());
        assert!(message.contains("<RESULT>NO </RESULT>"));
    }

    #[test]
    fn test_revision_messages_replay_synthesis_context() {
        let sample = vec![Row::new("2+2", "4")];
        let row = scored("a", 0.1, Some(true));
        let messages = revision_messages(&sample, "Old prompt", &[&row], &concise());
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], synthesis_messages(&sample)[0]);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "<PROMPT>Old prompt</PROMPT>");
        assert_eq!(messages[3].role, Role::User);
        assert!(messages[3].content.contains("<RESULT>YES why</RESULT>"));
    }

    #[tokio::test]
    async fn test_revise_extracts_prompt_and_diffs() {
        let gateway = ScriptedGateway::new()
            .reply("Let me think. <PROMPT>Answer with only the number.</PROMPT>");
        let rows = vec![scored("2+2", 0.4, None), scored("3+3", 0.9, None)];
        let revision = revise_prompt(
            &gateway,
            "reviser",
            "Answer with the number.",
            &rows[..1],
            &rows,
            &Criteria::empty(),
            1,
            |_| {},
        )
        .await
        .expect("revise");

        assert_eq!(revision.text, "Answer with only the number.");
        assert_eq!(revision.previous, "Answer with the number.");
        assert!(crate::diff::changed_segments(&revision.diff) > 0);

        let feedback = &gateway.requests()[0].messages[3].content;
        assert!(feedback.contains("<INPUT>2+2</INPUT>"));
        assert!(!feedback.contains("<INPUT>3+3</INPUT>"));
    }
}
