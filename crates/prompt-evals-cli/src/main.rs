//! Prompt Evals CLI
//!
//! The `prompt-evals` command drives the prompt-engineering loop from a
//! terminal.
//!
//! ## Commands
//!
//! - `synthesize`: Draw a sample and stream a prompt from it
//! - `evaluate`: Generate outputs for a prompt and score them once
//! - `run`: Synthesize (if needed), then generate, evaluate and revise in a loop
//! - `save-inputs`: Persist the raw dataset and criteria for later sessions
//! - `show-inputs`: Print the saved dataset and criteria

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use prompt_evals_core::{
    render_experiments_md, render_rows_table, render_word_diff, write_experiments_json,
    write_experiments_md, CancelFlag, ExperimentsArtifact, GatewayConfig, InputStore,
    ModelSelection, OpenAiGateway, Row, Session, SessionConfig, SessionSpan, StageEvent,
    StageOutcome, DEFAULT_SEED, DEFAULT_STORE_DIR, METRICS,
};

#[derive(Parser)]
#[command(name = "prompt-evals")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Iterative prompt engineering: synthesize, evaluate, revise", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding saved inputs
    #[arg(long, global = true, env = "PROMPT_EVALS_STORE", default_value = DEFAULT_STORE_DIR)]
    store_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a prompt from a sample of the dataset
    Synthesize {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Generate outputs for a prompt and evaluate them once
    Evaluate {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        prompt: PromptArgs,

        /// Write experiments.json and experiments.md here
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Run the full loop: generate, evaluate, revise, apply
    Run {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        prompt: PromptArgs,

        /// Number of generate/evaluate/revise rounds
        #[arg(short = 'n', long, default_value = "1")]
        iterations: usize,

        /// Write experiments.json and experiments.md here
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Save the raw dataset and criteria text
    SaveInputs {
        /// Tab-separated dataset file
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Newline-separated criteria file
        #[arg(short, long)]
        criteria: Option<PathBuf>,
    },

    /// Show the saved dataset and criteria text
    ShowInputs,
}

#[derive(Args)]
struct InputArgs {
    /// Tab-separated dataset file (defaults to the saved dataset)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Newline-separated criteria file (defaults to the saved criteria)
    #[arg(short, long)]
    criteria: Option<PathBuf>,
}

#[derive(Args)]
struct PromptArgs {
    /// Prompt text to start from
    #[arg(short, long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// File holding the prompt to start from
    #[arg(long)]
    prompt_file: Option<PathBuf>,
}

#[derive(Args)]
struct SessionArgs {
    /// Model used to synthesize prompts
    #[arg(long, env = "PROMPT_EVALS_PROMPT_MODEL", default_value = "gpt-4o-mini")]
    prompt_model: String,

    /// Model used to generate outputs
    #[arg(long, env = "PROMPT_EVALS_OUTPUT_MODEL", default_value = "gpt-4o-mini")]
    output_model: String,

    /// Model used to judge criteria
    #[arg(long, env = "PROMPT_EVALS_EVALUATION_MODEL", default_value = "gpt-4o-mini")]
    evaluation_model: String,

    /// Model used to revise prompts
    #[arg(long, env = "PROMPT_EVALS_REVISION_MODEL", default_value = "gpt-4o-mini")]
    revision_model: String,

    /// Rows drawn for synthesis
    #[arg(long, default_value = "5")]
    sample_size: usize,

    /// Sampling seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u32,

    /// Worst rows fed back when revising
    #[arg(long, default_value = "5")]
    examples: usize,

    /// Similarity below this is flagged in the row table
    #[arg(long, default_value = "0.5")]
    min_similarity: f64,

    /// Chat-completions base URL
    #[arg(long, env = "PROMPT_EVALS_BASE_URL")]
    base_url: Option<String>,
}

impl SessionArgs {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            models: ModelSelection {
                prompt: self.prompt_model.clone(),
                output: self.output_model.clone(),
                evaluation: self.evaluation_model.clone(),
                revision: self.revision_model.clone(),
            },
            sample_size: self.sample_size,
            seed: self.seed,
            revision_examples: self.examples,
        }
    }

    fn gateway(&self) -> Result<OpenAiGateway> {
        let mut config = GatewayConfig::from_env();
        if let Some(url) = &self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        OpenAiGateway::new(config).context("Failed to build model gateway")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    prompt_evals_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Synthesize { inputs, session } => {
            cmd_synthesize(&cli.store_dir, &inputs, &session).await
        }
        Commands::Evaluate {
            inputs,
            session,
            prompt,
            report_dir,
        } => {
            cmd_run(
                &cli.store_dir,
                &inputs,
                &session,
                &prompt,
                1,
                false,
                report_dir.as_deref(),
            )
            .await
        }
        Commands::Run {
            inputs,
            session,
            prompt,
            iterations,
            report_dir,
        } => {
            cmd_run(
                &cli.store_dir,
                &inputs,
                &session,
                &prompt,
                iterations,
                true,
                report_dir.as_deref(),
            )
            .await
        }
        Commands::SaveInputs { data, criteria } => {
            cmd_save_inputs(&cli.store_dir, data.as_deref(), criteria.as_deref())
        }
        Commands::ShowInputs => cmd_show_inputs(&cli.store_dir),
    };

    METRICS.flush();
    result
}

/// Dataset and criteria text from explicit files, else from the store.
fn load_inputs(store_dir: &Path, inputs: &InputArgs) -> Result<(String, String)> {
    let store = InputStore::open(store_dir)
        .with_context(|| format!("Failed to open input store {:?}", store_dir))?;

    let data = match &inputs.data {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {:?}", path))?,
        None => match store.load_data()? {
            Some(saved) => saved,
            None => bail!("No dataset given; pass --data or run `prompt-evals save-inputs`"),
        },
    };
    let criteria = match &inputs.criteria {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read criteria {:?}", path))?,
        None => store.load_criteria()?.unwrap_or_default(),
    };
    Ok((data, criteria))
}

fn build_session(store_dir: &Path, inputs: &InputArgs, args: &SessionArgs) -> Result<Session> {
    let (data, criteria) = load_inputs(store_dir, inputs)?;
    let session = Session::from_inputs(&data, &criteria, args.session_config())
        .context("Failed to load dataset and criteria")?;
    info!(
        rows = session.rows().len(),
        criteria = session.criteria().len(),
        "session ready"
    );
    Ok(session)
}

fn resolve_prompt(prompt: &PromptArgs) -> Result<Option<String>> {
    if let Some(text) = &prompt.prompt {
        return Ok(Some(text.clone()));
    }
    match &prompt.prompt_file {
        Some(path) => Ok(Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt {:?}", path))?,
        )),
        None => Ok(None),
    }
}

/// Cancel flag wired to Ctrl-C.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current update...");
            flag.cancel();
        }
    });
    cancel
}

/// Progress lines on stderr while a stage runs.
fn progress(stage: &'static str) -> impl FnMut(&StageEvent, &[Row]) {
    move |event: &StageEvent, _rows: &[Row]| match event {
        StageEvent::RowFinished { index, total } => {
            eprint!("\r{}: {}/{}", stage, index + 1, total);
            let _ = std::io::stderr().flush();
            if index + 1 == *total {
                eprintln!();
            }
        }
        StageEvent::RowFailed { index, error } => {
            eprintln!("\r{}: row {} failed: {}", stage, index + 1, error);
        }
        StageEvent::SimilarityScored { rows } => {
            eprintln!("{}: similarity scored for {} rows", stage, rows);
        }
        StageEvent::RowStarted { .. } | StageEvent::RowUpdated { .. } => {}
    }
}

fn report_stopped(stage: &str, outcome: &StageOutcome) {
    warn!(
        stage,
        processed = outcome.processed,
        "stage cancelled; later rows were not processed"
    );
}

async fn cmd_synthesize(store_dir: &Path, inputs: &InputArgs, args: &SessionArgs) -> Result<()> {
    let mut session = build_session(store_dir, inputs, args)?;
    let _span = SessionSpan::enter(&session.id().to_string());
    let gateway = args.gateway()?;

    let prompt = session
        .synthesize(&gateway, |_| {})
        .await
        .context("Prompt synthesis failed")?;
    if prompt.trim().is_empty() {
        warn!("model returned an empty prompt");
    }
    println!("{}", prompt);
    Ok(())
}

async fn cmd_run(
    store_dir: &Path,
    inputs: &InputArgs,
    args: &SessionArgs,
    prompt: &PromptArgs,
    iterations: usize,
    revise: bool,
    report_dir: Option<&Path>,
) -> Result<()> {
    let mut session = build_session(store_dir, inputs, args)?;
    let _span = SessionSpan::enter(&session.id().to_string());
    let gateway = args.gateway()?;
    let cancel = cancel_on_ctrl_c();

    match resolve_prompt(prompt)? {
        Some(text) => session.set_prompt(text),
        None => {
            let text = session
                .synthesize(&gateway, |_| {})
                .await
                .context("Prompt synthesis failed")?;
            println!("Synthesized prompt:\n{}\n", text);
        }
    }

    for round in 1..=iterations.max(1) {
        info!(round, "starting round");

        let mut observer = progress("generate");
        let generated = session
            .generate(&gateway, &cancel, &mut observer)
            .await
            .context("Generation failed")?;
        if generated.cancelled {
            report_stopped("generate", &generated);
            break;
        }

        let mut observer = progress("evaluate");
        let evaluation = session
            .evaluate(&gateway, &cancel, &mut observer)
            .await
            .context("Evaluation failed")?;
        println!(
            "{}",
            render_rows_table(session.rows(), session.criteria(), args.min_similarity)
        );
        println!("Score: {:.2}\n", evaluation.score);
        if evaluation.criteria.cancelled {
            report_stopped("evaluate", &evaluation.criteria);
            break;
        }

        if !revise {
            break;
        }
        let revision = session
            .revise(&gateway, |_| {})
            .await
            .context("Prompt revision failed")?;
        println!("Revised prompt:\n{}\n", render_word_diff(&revision.diff));

        if round < iterations {
            session.apply_revision()?;
        }
    }

    let artifact = ExperimentsArtifact::from_ledger(session.ledger());
    println!("{}", render_experiments_md(&artifact));
    if let Some(dir) = report_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
        write_experiments_json(&dir.join("experiments.json"), &artifact)?;
        write_experiments_md(&dir.join("experiments.md"), &artifact)?;
        info!(dir = ?dir, experiments = artifact.experiments.len(), "report written");
    }
    Ok(())
}

fn cmd_save_inputs(store_dir: &Path, data: Option<&Path>, criteria: Option<&Path>) -> Result<()> {
    if data.is_none() && criteria.is_none() {
        bail!("Nothing to save; pass --data and/or --criteria");
    }
    let store = InputStore::open(store_dir)
        .with_context(|| format!("Failed to open input store {:?}", store_dir))?;

    if let Some(path) = data {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {:?}", path))?;
        // Validate before saving so a broken file never replaces a good one.
        prompt_evals_core::parse_dataset(&raw).context("Dataset is not valid")?;
        store.save_data(&raw)?;
        println!("Saved dataset to {:?}", store.root());
    }
    if let Some(path) = criteria {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read criteria {:?}", path))?;
        store.save_criteria(&raw)?;
        println!("Saved criteria to {:?}", store.root());
    }
    Ok(())
}

fn cmd_show_inputs(store_dir: &Path) -> Result<()> {
    let store = InputStore::open(store_dir)
        .with_context(|| format!("Failed to open input store {:?}", store_dir))?;
    let saved = store.load()?;

    let summary = serde_json::json!({
        "store": store.root(),
        "rows": saved
            .data
            .as_deref()
            .and_then(|raw| prompt_evals_core::parse_dataset(raw).ok())
            .map(|rows| rows.len()),
        "criteria": saved
            .criteria
            .as_deref()
            .and_then(|raw| prompt_evals_core::Criteria::parse(raw).ok()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(data) = saved.data {
        println!("\n# Dataset\n{}", data);
    }
    if let Some(criteria) = saved.criteria {
        println!("\n# Criteria\n{}", criteria);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_map_to_session_config() {
        let cli = Cli::parse_from([
            "prompt-evals",
            "run",
            "--data",
            "data.tsv",
            "--prompt",
            "Answer with just the number.",
            "--iterations",
            "3",
            "--seed",
            "7",
            "--output-model",
            "small-model",
        ]);
        let Commands::Run {
            session,
            prompt,
            iterations,
            ..
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(iterations, 3);
        assert_eq!(
            resolve_prompt(&prompt).unwrap().as_deref(),
            Some("Answer with just the number.")
        );
        let config = session.session_config();
        assert_eq!(config.seed, 7);
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.models.output, "small-model");
    }

    #[test]
    fn save_inputs_needs_something_to_save() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_save_inputs(dir.path(), None, None).is_err());
    }

    #[test]
    fn save_inputs_rejects_invalid_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("bad.tsv");
        std::fs::write(&data, "only-one-column\nx\n").unwrap();
        let store_dir = dir.path().join("store");
        assert!(cmd_save_inputs(&store_dir, Some(&data), None).is_err());
        let store = InputStore::open(&store_dir).unwrap();
        assert!(store.load_data().unwrap().is_none());
    }
}
