//! Domain models for Prompt Evals.
//!
//! Canonical definitions for the core entities:
//! - `Row`: One example with its generated output and evaluation fields
//! - `Criteria`: Ordered rubric criterion names
//! - `PromptEvalsError`: Error taxonomy shared by every stage

pub mod criteria;
pub mod digest;
pub mod error;
pub mod row;

pub use criteria::{Criteria, RESERVED_FIELDS};
pub use digest::{prompt_digest, short_digest};
pub use error::{PromptEvalsError, Result};
pub use row::{aggregate_score, CriterionResult, Row};
