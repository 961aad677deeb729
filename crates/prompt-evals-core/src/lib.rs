//! Prompt Evals Core Library
//!
//! Synthesize a prompt from labeled examples, run it over the dataset,
//! score the outputs and feed the worst cases back for a revision.

pub mod dataset;
pub mod diff;
pub mod domain;
pub mod fakes;
pub mod gateway;
pub mod generate;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod partial_json;
pub mod reporting;
pub mod revision;
pub mod scorer;
pub mod session;
pub mod stage;
pub mod store;
pub mod synthesize;
pub mod telemetry;

pub use dataset::{parse_dataset, sample, Lcg, Shuffler, DEFAULT_SEED};
pub use diff::{changed_segments, render_word_diff, word_diff, DiffKind, DiffSegment};
pub use domain::{
    aggregate_score, prompt_digest, short_digest, Criteria, CriterionResult, PromptEvalsError,
    Result, Row, RESERVED_FIELDS,
};
pub use gateway::{
    collect_final, ChatMessage, CompletionRequest, CompletionStream, CriteriaSchema,
    GatewayConfig, ModelGateway, OpenAiGateway, Role,
};
pub use generate::generate_outputs;
pub use ledger::{Experiment, ExperimentLedger};
pub use partial_json::parse_partial;
pub use reporting::{
    format_similarity, render_experiments_md, render_rows_table, write_experiments_json,
    write_experiments_md, ExperimentsArtifact,
};
pub use revision::{revise_prompt, select_worst, Revision};
pub use scorer::{evaluate_criteria, score_similarity};
pub use session::{Evaluation, ModelSelection, Session, SessionConfig};
pub use stage::{CancelFlag, NoopObserver, StageEvent, StageObserver, StageOutcome};
pub use store::{InputStore, SavedInputs, DEFAULT_STORE_DIR};
pub use synthesize::{extract_prompt, synthesize_prompt};

pub use metrics::METRICS;
pub use obs::{
    emit_experiment_recorded, emit_revision_proposed, emit_row_failed, emit_stage_finished,
    emit_stage_started, SessionSpan,
};
pub use telemetry::init_tracing;

/// Prompt Evals version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
