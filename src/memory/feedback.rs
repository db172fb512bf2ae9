//! Raw feedback log
//!
//! Every rating lands here verbatim, whether or not it also produces a
//! correction entry. Append-only, rewritten whole-file on each append.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// User rating on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Positive,
    Negative,
}

/// One raw feedback event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub question: String,
    pub answer: String,
    pub rating: FeedbackRating,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    pub timestamp: String,
}

/// Append-only persisted feedback log.
#[derive(Debug)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Append one entry, tolerating a corrupt existing file by starting over.
    pub fn append(&self, entry: FeedbackEntry) -> Result<()> {
        let mut entries = self.read_all();
        entries.push(entry);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// All logged entries; missing or corrupt files read as empty.
    pub fn read_all(&self) -> Vec<FeedbackEntry> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Corrupt feedback log {:?}, starting empty: {}",
                        self.path, e
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }
}
