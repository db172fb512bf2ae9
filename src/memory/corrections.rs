//! Correction memory
//!
//! A small in-process store of validated question/answer pairs with their
//! question embeddings, consulted before any retrieval happens. Lookup is a
//! linear cosine scan over every stored entry, fine at single-user scale but
//! an explicit scalability ceiling: entries are never deleted or merged, so
//! lookup cost grows with feedback volume.

use crate::embed::cosine_similarity;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A match is only used when similarity strictly exceeds this.
pub const CORRECTION_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Whether a similarity score is strong enough to override retrieval.
pub fn passes_threshold(score: f32) -> bool {
    score > CORRECTION_SIMILARITY_THRESHOLD
}

/// How an entry entered the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionKind {
    /// A positively rated answer stored as-is
    Validation,
    /// User-supplied replacement text after a negative rating
    Correction,
}

/// One validated or corrected question/answer pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub question: String,
    pub correction: String,
    pub embedding: Vec<f32>,
    pub timestamp: String,
    pub kind: CorrectionKind,
}

/// Append-only persisted correction store.
#[derive(Debug)]
pub struct CorrectionStore {
    path: PathBuf,
    entries: Vec<Correction>,
}

impl CorrectionStore {
    /// Load the store, treating a missing or corrupt file as empty.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<Correction>>(&content) {
                Ok(entries) => {
                    debug!("Loaded {} corrections", entries.len());
                    entries
                }
                Err(e) => {
                    warn!("Corrupt correction store {:?}, starting empty: {}", path, e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Best stored entry for a query embedding, if it clears the threshold.
    ///
    /// Ties at the maximum resolve first-seen-wins: a later equal score does
    /// not replace the current best.
    pub fn best_match(&self, query_embedding: &[f32]) -> Option<&Correction> {
        let mut best_score = 0.0f32;
        let mut best: Option<&Correction> = None;

        for entry in &self.entries {
            if entry.embedding.is_empty() {
                continue;
            }
            let score = cosine_similarity(query_embedding, &entry.embedding);
            if score > best_score {
                best_score = score;
                best = Some(entry);
            }
        }

        if passes_threshold(best_score) {
            debug!("Correction match with similarity {:.3}", best_score);
            best
        } else {
            None
        }
    }

    /// Append a new entry and rewrite the whole store file.
    pub fn record(
        &mut self,
        question: &str,
        correction: &str,
        embedding: Vec<f32>,
        kind: CorrectionKind,
    ) -> Result<()> {
        self.entries.push(Correction {
            question: question.to_string(),
            correction: correction.to_string(),
            embedding,
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
        });
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(question: &str, embedding: Vec<f32>) -> Correction {
        Correction {
            question: question.to_string(),
            correction: format!("answer to {question}"),
            embedding,
            timestamp: "2025-06-01T00:00:00Z".to_string(),
            kind: CorrectionKind::Validation,
        }
    }

    fn store_with(entries: Vec<Correction>) -> (TempDir, CorrectionStore) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corrections.json");
        std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();
        let store = CorrectionStore::load(&path);
        (tmp, store)
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!passes_threshold(0.85));
        assert!(passes_threshold(0.8501));
        assert!(!passes_threshold(0.0));
    }

    #[test]
    fn test_no_entries_no_match() {
        let tmp = TempDir::new().unwrap();
        let store = CorrectionStore::load(&tmp.path().join("corrections.json"));
        assert!(store.best_match(&[1.0, 0.0]).is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_match_above_threshold() {
        // Near-parallel vector, similarity well above 0.85.
        let (_tmp, store) = store_with(vec![
            entry("far", vec![0.0, 1.0]),
            entry("near", vec![1.0, 0.1]),
        ]);

        let hit = store.best_match(&[1.0, 0.0]).unwrap();
        assert_eq!(hit.question, "near");
    }

    #[test]
    fn test_below_threshold_no_match() {
        // cos 45° ≈ 0.707 < 0.85.
        let (_tmp, store) = store_with(vec![entry("angled", vec![1.0, 1.0])]);
        assert!(store.best_match(&[1.0, 0.0]).is_none());
    }

    #[test]
    fn test_tie_resolves_first_seen() {
        // Identical embeddings score exactly equal; the first entry wins.
        let (_tmp, store) = store_with(vec![
            entry("first", vec![1.0, 0.05]),
            entry("second", vec![1.0, 0.05]),
        ]);

        let hit = store.best_match(&[1.0, 0.0]).unwrap();
        assert_eq!(hit.question, "first");
    }

    #[test]
    fn test_entry_without_embedding_is_skipped() {
        let (_tmp, store) = store_with(vec![
            entry("empty", vec![]),
            entry("usable", vec![1.0, 0.0]),
        ]);

        let hit = store.best_match(&[1.0, 0.0]).unwrap();
        assert_eq!(hit.question, "usable");
    }

    #[test]
    fn test_corrupt_store_treated_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corrections.json");
        std::fs::write(&path, "[{broken").unwrap();

        let store = CorrectionStore::load(&path);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_record_appends_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corrections.json");

        let mut store = CorrectionStore::load(&path);
        store
            .record("q1", "a1", vec![1.0, 0.0], CorrectionKind::Validation)
            .unwrap();
        store
            .record("q2", "better", vec![0.0, 1.0], CorrectionKind::Correction)
            .unwrap();

        let reloaded = CorrectionStore::load(&path);
        assert_eq!(reloaded.count(), 2);
        let hit = reloaded.best_match(&[0.0, 1.0]).unwrap();
        assert_eq!(hit.correction, "better");
        assert_eq!(hit.kind, CorrectionKind::Correction);
    }
}
