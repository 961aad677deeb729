//! Session: the explicit state one prompt-engineering loop runs against.
//!
//! A `Session` owns the dataset, criteria, current prompt, the sample used
//! for synthesis, any pending revision and the experiment ledger. Each stage
//! borrows it mutably, so only one stage can touch the rows at a time.
//! Operations that fail leave the prompt and rows as they were.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dataset::{self, DEFAULT_SEED};
use crate::diff::changed_segments;
use crate::domain::{aggregate_score, prompt_digest, Criteria, PromptEvalsError, Result, Row};
use crate::gateway::ModelGateway;
use crate::generate::generate_outputs;
use crate::ledger::{Experiment, ExperimentLedger};
use crate::obs::{
    emit_experiment_recorded, emit_revision_proposed, emit_stage_finished, emit_stage_started,
};
use crate::revision::{revise_prompt, Revision};
use crate::scorer::{evaluate_criteria, score_similarity};
use crate::stage::{CancelFlag, StageObserver, StageOutcome};
use crate::synthesize::synthesize_prompt;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SAMPLE_SIZE: usize = 5;
pub const DEFAULT_REVISION_EXAMPLES: usize = 5;

/// Model used by each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub prompt: String,
    pub output: String,
    pub evaluation: String,
    pub revision: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_MODEL.to_string(),
            output: DEFAULT_MODEL.to_string(),
            evaluation: DEFAULT_MODEL.to_string(),
            revision: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub models: ModelSelection,
    /// Rows drawn for synthesis and replayed during revision.
    pub sample_size: usize,
    pub seed: u32,
    /// Worst rows fed back to the reviser.
    pub revision_examples: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            models: ModelSelection::default(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: DEFAULT_SEED,
            revision_examples: DEFAULT_REVISION_EXAMPLES,
        }
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub criteria: StageOutcome,
    pub score: f64,
    /// Whether the pass completed and was written to the ledger.
    pub recorded: bool,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    rows: Vec<Row>,
    criteria: Criteria,
    prompt: String,
    /// Prompt that produced the current `generated` values.
    generated_with: Option<String>,
    sample: Vec<Row>,
    pending: Option<Revision>,
    ledger: ExperimentLedger,
}

impl Session {
    pub fn new(rows: Vec<Row>, criteria: Criteria, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            rows,
            criteria,
            prompt: String::new(),
            generated_with: None,
            sample: Vec::new(),
            pending: None,
            ledger: ExperimentLedger::new(),
        }
    }

    /// Parse raw TSV and newline-separated criteria into a new session.
    pub fn from_inputs(raw_data: &str, raw_criteria: &str, config: SessionConfig) -> Result<Self> {
        let rows = dataset::parse_dataset(raw_data)?;
        let criteria = Criteria::parse(raw_criteria)?;
        Ok(Self::new(rows, criteria, config))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn sample(&self) -> &[Row] {
        &self.sample
    }

    pub fn pending_revision(&self) -> Option<&Revision> {
        self.pending.as_ref()
    }

    pub fn ledger(&self) -> &ExperimentLedger {
        &self.ledger
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Replace the criteria. Existing verdicts stay on the rows but only
    /// names in the new list count toward the score.
    pub fn set_criteria(&mut self, criteria: Criteria) {
        self.criteria = criteria;
    }

    /// Clear `generated`, similarity and verdicts on every row.
    pub fn reset_derived(&mut self) {
        for row in &mut self.rows {
            row.clear_derived();
        }
        self.generated_with = None;
    }

    pub fn aggregate_score(&self) -> f64 {
        aggregate_score(&self.rows, &self.criteria)
    }

    fn require_rows(&self) -> Result<()> {
        if self.rows.is_empty() {
            return Err(PromptEvalsError::NotReady("dataset has no rows".to_string()));
        }
        Ok(())
    }

    fn require_generated(&self) -> Result<&str> {
        self.require_rows()?;
        match &self.generated_with {
            Some(prompt) if self.rows.iter().all(|r| r.generated.is_some()) => Ok(prompt.as_str()),
            _ => Err(PromptEvalsError::NotReady(
                "generate outputs for every row first".to_string(),
            )),
        }
    }

    fn require_evaluated(&self) -> Result<&str> {
        let prompt = self.require_generated()?;
        if self.rows.iter().any(|r| r.embedding_similarity.is_none()) {
            return Err(PromptEvalsError::NotReady(
                "evaluate the prompt first".to_string(),
            ));
        }
        Ok(prompt)
    }

    /// Draw the sample and stream a new prompt from it.
    pub async fn synthesize(
        &mut self,
        gateway: &dyn ModelGateway,
        on_text: impl FnMut(&str),
    ) -> Result<&str> {
        self.require_rows()?;
        let sample = dataset::sample(&self.rows, self.config.seed, self.config.sample_size);
        emit_stage_started("synthesize", sample.len());

        let prompt =
            synthesize_prompt(gateway, &self.config.models.prompt, &sample, on_text).await?;
        self.sample = sample;
        self.prompt = prompt;
        Ok(self.prompt.as_str())
    }

    /// Run the current prompt over every row. Derived fields from earlier
    /// passes are cleared first.
    pub async fn generate(
        &mut self,
        gateway: &dyn ModelGateway,
        cancel: &CancelFlag,
        observer: &mut dyn StageObserver,
    ) -> Result<StageOutcome> {
        self.require_rows()?;
        if self.prompt.trim().is_empty() {
            return Err(PromptEvalsError::NotReady(
                "set or synthesize a prompt first".to_string(),
            ));
        }

        self.reset_derived();
        self.generated_with = Some(self.prompt.clone());
        emit_stage_started("generate", self.rows.len());
        let started = Instant::now();

        let outcome = generate_outputs(
            gateway,
            &self.config.models.output,
            &self.prompt,
            &mut self.rows,
            cancel,
            observer,
        )
        .await?;
        emit_stage_finished("generate", &outcome, elapsed_ms(started));
        Ok(outcome)
    }

    /// Similarity pass, then criteria pass; records an experiment when both
    /// complete without cancellation.
    pub async fn evaluate(
        &mut self,
        gateway: &dyn ModelGateway,
        cancel: &CancelFlag,
        observer: &mut dyn StageObserver,
    ) -> Result<Evaluation> {
        let prompt = self.require_generated()?.to_string();
        emit_stage_started("evaluate", self.rows.len());
        let started = Instant::now();

        score_similarity(gateway, &mut self.rows, observer).await?;
        for row in &mut self.rows {
            row.criteria.clear();
        }

        let outcome = evaluate_criteria(
            gateway,
            &self.config.models.evaluation,
            &self.criteria,
            &mut self.rows,
            cancel,
            observer,
        )
        .await?;
        emit_stage_finished("evaluate", &outcome, elapsed_ms(started));

        let recorded = !outcome.cancelled;
        if recorded {
            let experiment = self.ledger.record(&prompt, &self.rows, &self.criteria);
            let (digest, score) = (experiment.prompt_digest.clone(), experiment.score);
            emit_experiment_recorded(&digest, score, self.ledger.len());
        } else {
            debug!("evaluation cancelled; experiment not recorded");
        }

        Ok(Evaluation {
            criteria: outcome,
            score: self.aggregate_score(),
            recorded,
        })
    }

    /// Ask for an improved prompt using the worst rows of the last
    /// evaluation. The result is held as the pending revision.
    pub async fn revise(
        &mut self,
        gateway: &dyn ModelGateway,
        on_text: impl FnMut(&str),
    ) -> Result<&Revision> {
        let current = self.require_evaluated()?.to_string();
        if self.sample.is_empty() {
            self.sample = dataset::sample(&self.rows, self.config.seed, self.config.sample_size);
        }

        let revision = revise_prompt(
            gateway,
            &self.config.models.revision,
            &current,
            &self.sample,
            &self.rows,
            &self.criteria,
            self.config.revision_examples,
            on_text,
        )
        .await?;
        emit_revision_proposed(
            &prompt_digest(&revision.text),
            self.config.revision_examples.min(self.rows.len()),
            changed_segments(&revision.diff),
        );
        Ok(self.pending.insert(revision))
    }

    /// Adopt the pending revision and clear every row's derived fields.
    pub fn apply_revision(&mut self) -> Result<&str> {
        let revision = self
            .pending
            .take()
            .ok_or_else(|| PromptEvalsError::NotReady("revise the prompt first".to_string()))?;
        self.prompt = revision.text;
        self.reset_derived();
        info!(prompt_digest = %prompt_digest(&self.prompt), "revision applied");
        Ok(self.prompt.as_str())
    }

    /// Most recent ledger entry for the current prompt, if any.
    pub fn current_experiment(&self) -> Option<&Experiment> {
        self.ledger.get(&self.prompt)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
