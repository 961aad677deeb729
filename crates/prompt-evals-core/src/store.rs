//! On-disk store for the raw dataset and criteria text.
//!
//! These two strings are the only state kept between sessions. They are
//! stored verbatim; parsing happens when a session is built from them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::Result;

pub const DEFAULT_STORE_DIR: &str = ".prompt-evals";
const DATA_FILE: &str = "data.tsv";
const CRITERIA_FILE: &str = "criteria.txt";

/// Raw inputs as last saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedInputs {
    pub data: Option<String>,
    pub criteria: Option<String>,
}

/// Directory-backed store for raw inputs.
///
/// Layout: `<root>/data.tsv` and `<root>/criteria.txt`
#[derive(Debug, Clone)]
pub struct InputStore {
    root: PathBuf,
}

impl InputStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save_data(&self, raw: &str) -> Result<()> {
        self.write_atomic(DATA_FILE, raw)
    }

    pub fn save_criteria(&self, raw: &str) -> Result<()> {
        self.write_atomic(CRITERIA_FILE, raw)
    }

    pub fn load_data(&self) -> Result<Option<String>> {
        self.read_optional(DATA_FILE)
    }

    pub fn load_criteria(&self) -> Result<Option<String>> {
        self.read_optional(CRITERIA_FILE)
    }

    pub fn load(&self) -> Result<SavedInputs> {
        Ok(SavedInputs {
            data: self.load_data()?,
            criteria: self.load_criteria()?,
        })
    }

    fn write_atomic(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.root.join(name);
        // Temp file in the same directory so the rename stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %path.display(), bytes = contents.len(), "saved input");
        Ok(())
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
