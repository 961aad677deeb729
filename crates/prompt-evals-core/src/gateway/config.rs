//! Gateway configuration: endpoint URLs, credentials and timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chat-completions base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model used by the similarity endpoint.
pub const DEFAULT_SIMILARITY_MODEL: &str = "text-embedding-3-small";

/// Model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL; `/chat/completions` is appended for completions
    pub base_url: String,
    /// Bearer token (absent key fails calls with `Auth`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Explicit similarity endpoint; derived from `base_url` when unset
    pub similarity_url: Option<String>,
    /// Embedding model name sent to the similarity endpoint
    pub similarity_model: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            base_url: std::env::var("PROMPT_EVALS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("PROMPT_EVALS_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|key| !key.is_empty()),
            similarity_url: std::env::var("PROMPT_EVALS_SIMILARITY_URL").ok(),
            similarity_model: std::env::var("PROMPT_EVALS_SIMILARITY_MODEL")
                .unwrap_or_else(|_| DEFAULT_SIMILARITY_MODEL.to_string()),
            timeout: Duration::from_secs(300),
        }
    }
}

impl GatewayConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific endpoint, ignoring the environment
    pub fn new(base_url: &str) -> Self {
        GatewayConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            similarity_url: None,
            similarity_model: DEFAULT_SIMILARITY_MODEL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Set authentication token
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Set an explicit similarity endpoint
    pub fn with_similarity_url(mut self, url: &str) -> Self {
        self.similarity_url = Some(url.to_string());
        self
    }

    /// Set the embedding model
    pub fn with_similarity_model(mut self, model: &str) -> Self {
        self.similarity_model = model.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<base_url>/chat/completions`
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Similarity endpoint. A base URL ending in `openai/v1` maps to the
    /// sibling `similarity` route; anything else gets `/similarity` appended.
    pub fn similarity_url(&self) -> String {
        if let Some(url) = &self.similarity_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        match base.strip_suffix("openai/v1") {
            Some(prefix) => format!("{}similarity", prefix),
            None => format!("{}/similarity", base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_handles_trailing_slash() {
        let config = GatewayConfig::new("https://example.com/v1/");
        assert_eq!(
            config.completions_url(),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_similarity_url_replaces_openai_segment() {
        let config = GatewayConfig::new("https://llm.example.com/openai/v1");
        assert_eq!(config.similarity_url(), "https://llm.example.com/similarity");
    }

    #[test]
    fn test_similarity_url_appends_for_other_bases() {
        let config = GatewayConfig::new("http://localhost:8080/v1");
        assert_eq!(config.similarity_url(), "http://localhost:8080/v1/similarity");
    }

    #[test]
    fn test_explicit_similarity_url_wins() {
        let config = GatewayConfig::new("https://llm.example.com/openai/v1")
            .with_similarity_url("http://sim.local/score");
        assert_eq!(config.similarity_url(), "http://sim.local/score");
    }

    #[test]
    fn test_new_has_no_key() {
        let config = GatewayConfig::new("http://localhost").with_timeout(Duration::from_secs(5));
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
