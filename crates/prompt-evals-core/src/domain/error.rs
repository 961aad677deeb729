//! Domain-level error taxonomy for Prompt Evals.

/// Prompt Evals domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptEvalsError {
    #[error("format error: {0}")]
    Format(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PromptEvalsError {
    /// Row-level failures that the batch stages absorb instead of aborting.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            PromptEvalsError::Transport(_) | PromptEvalsError::Auth(_) | PromptEvalsError::Parse(_)
        )
    }
}

impl From<reqwest::Error> for PromptEvalsError {
    fn from(err: reqwest::Error) -> Self {
        PromptEvalsError::Transport(err.to_string())
    }
}

impl From<csv::Error> for PromptEvalsError {
    fn from(err: csv::Error) -> Self {
        PromptEvalsError::Format(err.to_string())
    }
}

/// Result type for Prompt Evals domain operations.
pub type Result<T> = std::result::Result<T, PromptEvalsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PromptEvalsError::Format("expected at least 2 columns".to_string());
        assert!(err.to_string().contains("format error"));

        let err = PromptEvalsError::Auth("missing API key".to_string());
        assert!(err.to_string().contains("auth error"));
        assert!(err.to_string().contains("missing API key"));
    }

    #[test]
    fn test_model_failures_are_absorbable() {
        assert!(PromptEvalsError::Transport("reset".into()).is_model_failure());
        assert!(PromptEvalsError::Auth("401".into()).is_model_failure());
        assert!(PromptEvalsError::Parse("eof".into()).is_model_failure());
        assert!(!PromptEvalsError::Format("1 column".into()).is_model_failure());
        assert!(!PromptEvalsError::NotReady("no prompt".into()).is_model_failure());
    }

    #[test]
    fn test_serialization_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PromptEvalsError = bad.into();
        assert!(err.to_string().contains("serialization error"));
    }
}
