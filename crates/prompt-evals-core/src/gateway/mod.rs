//! Model gateway: the one seam between the pipeline and a language model.
//!
//! - `stream_completion` yields *cumulative* text snapshots: every item is the
//!   full answer so far, never a delta. Consumers keep only the latest item.
//! - `compute_similarity` scores each candidate against its paired reference.
//!
//! `OpenAiGateway` talks to a chat-completions endpoint over HTTP; the
//! `fakes` module provides a scripted in-memory gateway for tests.

pub mod config;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{Criteria, Result};

pub use config::GatewayConfig;
pub use openai::OpenAiGateway;

/// Finite, non-restartable sequence of cumulative text snapshots.
pub type CompletionStream = BoxStream<'static, Result<String>>;

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Structured-output schema: one `{explanation, success}` object per criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaSchema {
    pub name: String,
    pub criteria: Criteria,
}

impl CriteriaSchema {
    pub fn new(criteria: Criteria) -> Self {
        Self {
            name: "criteria_evaluation".to_string(),
            criteria,
        }
    }

    /// Render as an OpenAI `response_format` value.
    pub fn to_response_format(&self) -> Value {
        let verdict = json!({
            "type": "object",
            "properties": {
                "explanation": { "type": "string" },
                "success": { "type": "boolean" }
            },
            "required": ["explanation", "success"],
            "additionalProperties": false
        });
        let properties: IndexMap<&str, Value> = self
            .criteria
            .iter()
            .map(|name| (name, verdict.clone()))
            .collect();

        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": true,
                "schema": {
                    "type": "object",
                    "properties": properties,
                    "required": self.criteria.as_slice(),
                    "additionalProperties": false
                }
            }
        })
    }
}

/// One streaming chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub schema: Option<CriteriaSchema>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: CriteriaSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Request body for a chat-completions endpoint, always streaming.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
            "stream": true,
        });
        if let Some(schema) = &self.schema {
            body["response_format"] = schema.to_response_format();
        }
        body
    }
}

/// Abstraction over a streaming chat model and a similarity scorer.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Start a streaming completion. Fails with `Auth` or `Transport`.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream>;

    /// One similarity score per `(candidates[i], references[i])` pair.
    async fn compute_similarity(
        &self,
        candidates: &[String],
        references: &[String],
    ) -> Result<Vec<f64>>;
}

/// Drain a stream, calling `on_text` with every snapshot, and return the
/// final text (empty when the model produced nothing).
pub async fn collect_final(
    mut stream: CompletionStream,
    mut on_text: impl FnMut(&str),
) -> Result<String> {
    let mut latest = String::new();
    while let Some(event) = stream.next().await {
        latest = event?;
        on_text(&latest);
    }
    Ok(latest)
}
