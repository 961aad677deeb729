//! Ordered, unique list of rubric criterion names.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{PromptEvalsError, Result};

/// Row field names a criterion may not shadow.
pub const RESERVED_FIELDS: [&str; 4] = ["input", "output", "generated", "embeddingSimilarity"];

/// Criteria in user order, unique by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Criteria(Vec<String>);

impl Criteria {
    /// Build from names. Names are trimmed; blanks and duplicates are dropped.
    pub fn new<I>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if RESERVED_FIELDS.contains(&name) {
                return Err(PromptEvalsError::InvalidCriterion(format!(
                    "'{}' is a reserved row field",
                    name
                )));
            }
            if out.iter().any(|existing| existing == name) {
                warn!(criterion = %name, "duplicate criterion dropped");
                continue;
            }
            out.push(name.to_string());
        }
        Ok(Self(out))
    }

    /// Parse newline-separated criterion names.
    pub fn parse(raw: &str) -> Result<Self> {
        Self::new(raw.lines().map(str::to_string))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
