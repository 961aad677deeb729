//! Prompt synthesis from a sample of input/output pairs.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{Result, Row};
use crate::gateway::{collect_final, ChatMessage, CompletionRequest, ModelGateway};

const SYNTHESIS_INSTRUCTIONS: &str = "You'll get a set of <INPUT>...</INPUT> and <OUTPUT>...</OUTPUT> pairs.
Generate a detailed LLM system prompt that will generate the output possible when given only the input.
Mention the word count and style of writing.
Include ONE simplified example.
Write the prompt inside a <PROMPT>...</PROMPT> tag.";

static PROMPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<PROMPT>([\s\S]*?)</PROMPT>").expect("valid prompt tag regex"));

/// The fixed two-message synthesis exchange for `sample`.
pub fn synthesis_messages(sample: &[Row]) -> Vec<ChatMessage> {
    let pairs = sample
        .iter()
        .map(|row| format!("<INPUT>{}</INPUT>\n<OUTPUT>{}</OUTPUT>", row.input, row.output))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        ChatMessage::system(SYNTHESIS_INSTRUCTIONS),
        ChatMessage::user(pairs),
    ]
}

/// Text inside the first `<PROMPT>` tag, trimmed; the raw text when the tag
/// is missing or unterminated.
pub fn extract_prompt(text: &str) -> String {
    match PROMPT_TAG.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => text.to_string(),
    }
}

/// Stream a prompt for `sample`. `on_text` sees the extracted prompt after
/// every snapshot. An empty result is returned as-is.
pub async fn synthesize_prompt(
    gateway: &dyn ModelGateway,
    model: &str,
    sample: &[Row],
    mut on_text: impl FnMut(&str),
) -> Result<String> {
    let request = CompletionRequest::new(model, synthesis_messages(sample));
    let stream = gateway.stream_completion(request).await?;
    let raw = collect_final(stream, |text| on_text(&extract_prompt(text))).await?;
    let prompt = extract_prompt(&raw);
    debug!(sample = sample.len(), chars = prompt.len(), "synthesized prompt");
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedGateway;
    use crate::gateway::Role;

    #[test]
    fn test_extract_prompt_inside_tag() {
        let text = "Thinking...\n<PROMPT>\n  Answer with just the number.\n</PROMPT>\nDone";
        assert_eq!(extract_prompt(text), "Answer with just the number.");
    }

    #[test]
    fn test_extract_prompt_takes_first_tag() {
        assert_eq!(extract_prompt("<PROMPT>a</PROMPT><PROMPT>b</PROMPT>"), "a");
    }

    #[test]
    fn test_extract_prompt_falls_back_to_raw_text() {
        assert_eq!(extract_prompt("Just answer."), "Just answer.");
        assert_eq!(extract_prompt("<PROMPT>unterminated"), "<PROMPT>unterminated");
    }

    #[test]
    fn test_messages_tag_each_pair() {
        let messages = synthesis_messages(&[Row::new("2+2", "4"), Row::new("3+3", "6")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("<PROMPT>...</PROMPT>"));
        assert_eq!(
            messages[1].content,
            "<INPUT>2+2</INPUT>\n<OUTPUT>4</OUTPUT>\n<INPUT>3+3</INPUT>\n<OUTPUT>6</OUTPUT>"
        );
    }

    #[tokio::test]
    async fn test_synthesize_without_tag_returns_raw_text() {
        let gateway = ScriptedGateway::new().reply("Answer with just the number.");
        let prompt = synthesize_prompt(&gateway, "m", &[Row::new("2+2", "4")], |_| {})
            .await
            .expect("synthesize");
        assert_eq!(prompt, "Answer with just the number.");
    }

    #[tokio::test]
    async fn test_synthesize_extracts_tagged_prompt() {
        let gateway =
            ScriptedGateway::new().reply("Here you go: <PROMPT> Reply tersely. </PROMPT>");
        let mut partials = Vec::new();
        let prompt = synthesize_prompt(&gateway, "m", &[Row::new("a", "b")], |t| {
            partials.push(t.to_string())
        })
        .await
        .expect("synthesize");
        assert_eq!(prompt, "Reply tersely.");
        assert_eq!(partials.last().map(String::as_str), Some("Reply tersely."));
        assert_eq!(gateway.requests()[0].model, "m");
    }
}
