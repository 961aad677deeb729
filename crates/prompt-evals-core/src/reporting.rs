use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{short_digest, Criteria, Row};
use crate::ledger::{Experiment, ExperimentLedger};

pub const EXPERIMENTS_SCHEMA_VERSION: &str = "1.0";

/// Ledger export written as experiments.json.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentsArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub best_prompt_digest: Option<String>,
    pub experiments: Vec<Experiment>,
}

impl ExperimentsArtifact {
    pub fn from_ledger(ledger: &ExperimentLedger) -> Self {
        Self {
            schema_version: EXPERIMENTS_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            best_prompt_digest: ledger.best().map(|e| e.prompt_digest.clone()),
            experiments: ledger.list().cloned().collect(),
        }
    }
}

/// Write experiments.json in pretty JSON format.
pub fn write_experiments_json(path: &Path, artifact: &ExperimentsArtifact) -> Result<()> {
    let content =
        serde_json::to_string_pretty(artifact).context("serialize experiments artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn pass_mark(row: &Row, name: &str) -> &'static str {
    if row.criterion(name).is_some_and(|r| r.success) {
        "✅"
    } else {
        "❌"
    }
}

/// Render the experiment comparison as markdown, in recording order.
pub fn render_experiments_md(artifact: &ExperimentsArtifact) -> String {
    let mut out = String::new();
    out.push_str("# Experiments\n\n");
    if artifact.experiments.is_empty() {
        out.push_str("_No experiments recorded._\n");
        return out;
    }

    out.push_str("| Score | Prompt |\n|---:|---|\n");
    for e in &artifact.experiments {
        let first_line = e.prompt.lines().next().unwrap_or_default();
        out.push_str(&format!(
            "| {:.2} | `{}` {} |\n",
            e.score,
            short_digest(&e.prompt_digest),
            first_line.replace('|', "\\|")
        ));
    }

    for e in &artifact.experiments {
        out.push_str(&format!(
            "\n## `{}` score {:.2}\n\n",
            short_digest(&e.prompt_digest),
            e.score
        ));
        out.push_str("```text\n");
        out.push_str(&e.prompt);
        out.push_str("\n```\n");

        if !e.criteria.is_empty() {
            out.push_str("\n### Criteria\n");
            for name in e.criteria.iter() {
                let marks: String = e.data.iter().map(|row| pass_mark(row, name)).collect();
                out.push_str(&format!(
                    "- {}: {} ({}/{})\n",
                    name,
                    marks,
                    e.pass_count(name),
                    e.data.len()
                ));
            }
        }
    }
    out
}

/// Write experiments.md.
pub fn write_experiments_md(path: &Path, artifact: &ExperimentsArtifact) -> Result<()> {
    let md = render_experiments_md(artifact);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

const CELL_WIDTH: usize = 28;

fn cell(text: &str) -> String {
    let flat = text.replace(['\n', '\t'], " ");
    if flat.chars().count() <= CELL_WIDTH {
        flat
    } else {
        let cut: String = flat.chars().take(CELL_WIDTH - 1).collect();
        format!("{}…", cut)
    }
}

/// Similarity as a percentage; blank when it was never computed.
pub fn format_similarity(similarity: Option<f64>) -> String {
    similarity
        .map(|s| format!("{:.1}%", s * 100.0))
        .unwrap_or_default()
}

/// Tab-separated terminal table of the rows.
///
/// Similarity below `min_similarity` is flagged with `!`. Criterion columns
/// show a mark only once a verdict exists for that row.
pub fn render_rows_table(rows: &[Row], criteria: &Criteria, min_similarity: f64) -> String {
    let mut header = vec!["#", "Input", "Expected", "Generated", "Similarity", "Score"];
    header.extend(criteria.iter());
    let mut out = header.join("\t");
    out.push('\n');

    for (index, row) in rows.iter().enumerate() {
        let mut similarity = format_similarity(row.embedding_similarity);
        if row.embedding_similarity.is_some_and(|s| s < min_similarity) {
            similarity.push_str(" !");
        }
        let mut cells = vec![
            (index + 1).to_string(),
            cell(&row.input),
            cell(&row.output),
            cell(row.generated.as_deref().unwrap_or_default()),
            similarity,
            format!("{:.2}", row.score(criteria)),
        ];
        for name in criteria.iter() {
            cells.push(match row.criterion(name) {
                Some(_) => pass_mark(row, name).to_string(),
                None => String::new(),
            });
        }
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out
}
