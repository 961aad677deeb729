//! HTTP gateway for OpenAI-compatible chat-completions and similarity APIs.
//!
//! Streaming responses are Server-Sent Events. Each `data:` payload carries a
//! `choices[0].delta.content` fragment; fragments are accumulated so that the
//! stream handed to callers yields cumulative text. `[DONE]` ends the stream.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionStream, GatewayConfig, ModelGateway};
use crate::domain::{PromptEvalsError, Result};
use crate::metrics::METRICS;

/// Gateway backed by `reqwest`.
pub struct OpenAiGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SimilarityResponse {
    similarity: Vec<Vec<f64>>,
}

impl OpenAiGateway {
    /// Create a new gateway
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("prompt-evals/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(OpenAiGateway {
            config,
            http_client,
        })
    }

    /// Create gateway from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| PromptEvalsError::Auth("no API key configured".to_string()))
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(self.api_key()?)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

/// Map non-success statuses to `Auth` or `Transport`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PromptEvalsError::Auth(format!(
            "{}: {}",
            status,
            body.trim()
        ))),
        _ => Err(PromptEvalsError::Transport(format!(
            "{}: {}",
            status,
            body.trim()
        ))),
    }
}

/// Decode one SSE `data:` payload into its content fragment, if any.
pub(crate) fn decode_chunk(data: &str) -> Result<Option<String>> {
    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| PromptEvalsError::Transport(format!("malformed stream chunk: {}", e)))?;

    if let Some(error) = chunk.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(PromptEvalsError::Transport(message));
    }

    Ok(chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Turn an SSE byte stream into cumulative text snapshots.
///
/// Chunks without content (role-only, empty deltas) yield nothing. The stream
/// ends at `[DONE]`; anything after it is never read.
pub(crate) fn cumulative_events<S, B, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send + 'static,
{
    bytes
        .eventsource()
        .take_while(|event| future::ready(!matches!(event, Ok(e) if e.data == "[DONE]")))
        .scan(String::new(), |content, event| {
            let item = match event {
                Err(e) => Err(PromptEvalsError::Transport(format!("stream error: {}", e))),
                Ok(e) => decode_chunk(&e.data).map(|delta| {
                    delta.map(|delta| {
                        content.push_str(&delta);
                        content.clone()
                    })
                }),
            };
            future::ready(Some(item))
        })
        .filter_map(|item| future::ready(item.transpose()))
        .boxed()
}

/// Take the diagonal of a similarity matrix.
pub(crate) fn diagonal(matrix: &[Vec<f64>], expected: usize) -> Result<Vec<f64>> {
    (0..expected)
        .map(|i| {
            matrix.get(i).and_then(|row| row.get(i)).copied().ok_or_else(|| {
                PromptEvalsError::Transport(format!("similarity matrix has no entry [{}][{}]", i, i))
            })
        })
        .collect()
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let url = self.config.completions_url();
        debug!(model = %request.model, messages = request.messages.len(), "starting completion");
        METRICS.inc_model_calls();

        let response = self.post(&url, &request.to_body()).await?;

        Ok(cumulative_events(response.bytes_stream()))
    }

    async fn compute_similarity(
        &self,
        candidates: &[String],
        references: &[String],
    ) -> Result<Vec<f64>> {
        if candidates.len() != references.len() {
            return Err(PromptEvalsError::NotReady(format!(
                "similarity needs paired inputs, got {} candidates and {} references",
                candidates.len(),
                references.len()
            )));
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        METRICS.inc_similarity_calls();
        let body = json!({
            "docs": candidates,
            "topics": references,
            "model": self.config.similarity_model,
        });
        let response = self.post(&self.config.similarity_url(), &body).await?;
        let parsed: SimilarityResponse = response.json().await?;

        if parsed.similarity.len() != candidates.len() {
            warn!(
                rows = parsed.similarity.len(),
                expected = candidates.len(),
                "similarity matrix size differs from request"
            );
        }
        diagonal(&parsed.similarity, candidates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunk_extracts_delta() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(decode_chunk(data).expect("decode"), Some("Hel".to_string()));
    }

    #[test]
    fn test_decode_chunk_without_content_is_none() {
        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(decode_chunk(role_only).expect("decode"), None);

        let finish = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(decode_chunk(finish).expect("decode"), None);
    }

    #[test]
    fn test_decode_chunk_error_payload_is_transport() {
        let data = r#"{"error":{"message":"rate limited"}}"#;
        let err = decode_chunk(data).unwrap_err();
        assert!(matches!(err, PromptEvalsError::Transport(ref m) if m == "rate limited"));
    }

    #[test]
    fn test_decode_chunk_garbage_is_transport() {
        assert!(matches!(
            decode_chunk("not json").unwrap_err(),
            PromptEvalsError::Transport(_)
        ));
    }

    fn sse(chunks: Vec<&'static str>) -> CompletionStream {
        cumulative_events(futures::stream::iter(
            chunks.into_iter().map(Ok::<_, std::io::Error>),
        ))
    }

    #[tokio::test]
    async fn test_cumulative_events_accumulate_deltas() {
        let stream = sse(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\nda",
            "ta: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n",
        ]);
        let events: Vec<String> = stream
            .map(|event| event.expect("event"))
            .collect()
            .await;
        assert_eq!(events, vec!["Hel".to_string(), "Hello".to_string()]);
    }

    #[tokio::test]
    async fn test_cumulative_events_surface_in_stream_error() {
        let stream = sse(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
        ]);
        let events: Vec<Result<String>> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_deref().expect("first"), "Hi");
        assert!(matches!(
            &events[1],
            Err(PromptEvalsError::Transport(m)) if m == "overloaded"
        ));
    }

    #[tokio::test]
    async fn test_cumulative_events_map_body_errors_to_transport() {
        let body = futures::stream::iter(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n"),
            Err(std::io::Error::other("connection reset")),
        ]);
        let events: Vec<Result<String>> = cumulative_events(body).collect().await;
        assert_eq!(events[0].as_deref().expect("first"), "a");
        assert!(events.iter().any(
            |e| matches!(e, Err(PromptEvalsError::Transport(m)) if m.contains("connection reset"))
        ));
    }

    #[tokio::test]
    async fn test_cumulative_events_empty_body_yields_nothing() {
        let events: Vec<Result<String>> = sse(vec!["data: [DONE]\n\n"]).collect().await;
        assert!(events.is_empty());
    }

    #[test]
    fn test_diagonal_reads_paired_scores() {
        let matrix = vec![vec![0.9, 0.1], vec![0.2, 0.8]];
        assert_eq!(diagonal(&matrix, 2).expect("diagonal"), vec![0.9, 0.8]);
    }

    #[test]
    fn test_diagonal_missing_entry_is_transport() {
        let matrix = vec![vec![0.9]];
        assert!(diagonal(&matrix, 2).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let gateway = OpenAiGateway::new(GatewayConfig::new("http://127.0.0.1:9")).expect("client");
        let err = gateway
            .stream_completion(CompletionRequest::new("m", vec![]))
            .await
            .err()
            .expect("auth failure");
        assert!(matches!(err, PromptEvalsError::Auth(_)));
    }

    #[tokio::test]
    async fn test_similarity_empty_input_skips_network() {
        let gateway = OpenAiGateway::new(GatewayConfig::new("http://127.0.0.1:9")).expect("client");
        let scores = gateway.compute_similarity(&[], &[]).await.expect("empty");
        assert!(scores.is_empty());
    }
}
