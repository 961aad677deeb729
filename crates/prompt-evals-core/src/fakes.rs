//! In-memory fake model gateway (testing only)
//!
//! `ScriptedGateway` replays queued replies in call order and records every
//! request, so pipeline stages can be exercised without any network access.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use crate::domain::{PromptEvalsError, Result};
use crate::gateway::{CompletionRequest, CompletionStream, ModelGateway};

/// One queued completion reply.
#[derive(Debug)]
pub enum ScriptedReply {
    /// Streamed word by word as cumulative snapshots.
    Text(String),
    /// Explicit cumulative snapshots, emitted as given.
    Snapshots(Vec<String>),
    /// The call itself fails.
    Fail(PromptEvalsError),
    /// Snapshots are emitted, then the stream fails.
    FailMidStream(Vec<String>, PromptEvalsError),
}

/// Split `text` into cumulative snapshots at whitespace boundaries.
pub fn cumulative_words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut acc = String::new();
    for piece in text.split_inclusive(char::is_whitespace) {
        acc.push_str(piece);
        out.push(acc.clone());
    }
    out
}

/// Gateway that replays scripted replies.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<ScriptedReply>>,
    similarity: Mutex<VecDeque<Result<Vec<f64>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    similarity_requests: Mutex<Vec<(Vec<String>, Vec<String>)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()))
    }

    /// Queue any reply.
    pub fn push(self, reply: ScriptedReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Queue a similarity response.
    pub fn similarity(self, scores: Vec<f64>) -> Self {
        self.similarity.lock().unwrap().push_back(Ok(scores));
        self
    }

    /// Queue a similarity failure.
    pub fn similarity_error(self, err: PromptEvalsError) -> Self {
        self.similarity.lock().unwrap().push_back(Err(err));
        self
    }

    /// Completion requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of completion calls received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Similarity requests received so far, as `(candidates, references)`.
    pub fn similarity_requests(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.similarity_requests.lock().unwrap().clone()
    }

    /// Replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front().ok_or_else(|| {
            PromptEvalsError::Transport("no scripted reply left".to_string())
        })?;

        let events: Vec<Result<String>> = match reply {
            ScriptedReply::Text(text) => cumulative_words(&text).into_iter().map(Ok).collect(),
            ScriptedReply::Snapshots(snapshots) => snapshots.into_iter().map(Ok).collect(),
            ScriptedReply::Fail(err) => return Err(err),
            ScriptedReply::FailMidStream(snapshots, err) => snapshots
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(err)))
                .collect(),
        };
        Ok(futures::stream::iter(events).boxed())
    }

    async fn compute_similarity(
        &self,
        candidates: &[String],
        references: &[String],
    ) -> Result<Vec<f64>> {
        self.similarity_requests
            .lock()
            .unwrap()
            .push((candidates.to_vec(), references.to_vec()));
        self.similarity.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(PromptEvalsError::Transport(
                "no scripted similarity left".to_string(),
            ))
        })
    }
}
