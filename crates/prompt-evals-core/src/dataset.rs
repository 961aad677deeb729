//! Dataset store: tab-separated parsing and seeded sampling.
//!
//! The first two columns of the header row decide the semantic role of each
//! column (input, then expected output); the header text itself is discarded.
//! Sampling uses a 32-bit linear congruential generator so the same seed
//! always draws the same examples, which keeps prompt revisions comparable.

use tracing::debug;

use crate::domain::{PromptEvalsError, Result, Row};

/// Seed used when the caller does not supply one.
pub const DEFAULT_SEED: u32 = 12345;

const LCG_MUL: u32 = 0x0019_660D;
const LCG_INC: u32 = 0x3C6E_F35F;
const LCG_SCALE: f64 = 4_294_967_296.0;

/// Parse tab-separated text into rows.
///
/// Fails with `Format` when the header has fewer than two columns or a data
/// row has an empty input cell.
pub fn parse_dataset(raw: &str) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let columns = reader.headers()?.len();
    if columns < 2 {
        return Err(PromptEvalsError::Format(format!(
            "expected at least 2 tab-separated columns, found {}",
            columns
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let input = record.get(0).unwrap_or_default();
        if input.is_empty() {
            return Err(PromptEvalsError::Format(format!(
                "line {}: input column is empty",
                line
            )));
        }
        rows.push(Row::new(input, record.get(1).unwrap_or_default()));
    }

    debug!(rows = rows.len(), columns, "parsed dataset");
    Ok(rows)
}

/// 32-bit linear congruential generator producing floats in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
        f64::from(self.state) / LCG_SCALE
    }
}

/// Fisher-Yates shuffler that keeps its generator state between calls.
#[derive(Debug, Clone)]
pub struct Shuffler {
    rng: Lcg,
}

impl Shuffler {
    pub fn new(seed: u32) -> Self {
        Self { rng: Lcg::new(seed) }
    }

    /// Shuffle `items` in place, walking backwards from the last slot.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        let mut remaining = items.len();
        while remaining > 0 {
            let pick = (self.rng.next_f64() * remaining as f64) as usize;
            remaining -= 1;
            items.swap(remaining, pick);
        }
    }
}

/// Draw `k` rows (clamped to `[0, rows.len()]`) from a seeded shuffle of a
/// copy of `rows`. The input order is left untouched.
pub fn sample(rows: &[Row], seed: u32, k: usize) -> Vec<Row> {
    let mut shuffled = rows.to_vec();
    Shuffler::new(seed).shuffle(&mut shuffled);
    shuffled.truncate(k.min(rows.len()));
    shuffled
}
