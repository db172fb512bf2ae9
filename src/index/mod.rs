//! Incremental index manager
//!
//! Owns the content-hash record and is the only writer to the vector index.
//! A full rebuild clears the collection and reprocesses every document; an
//! incremental update skips documents whose content hash matches the
//! persisted record. For a changed document the previously stored chunk ids
//! are deleted before new chunks are added. The record keeps the actual
//! indexed chunk count per document, so deletion addresses exactly the old
//! id range rather than guessing an upper bound.

use crate::chunk::chunk;
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::Result;
use crate::parse::parse_document;
use crate::progress::document_bar;
use crate::store::{ChunkPayload, ChunkPoint, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Persisted record for one indexed document: its content hash and how many
/// chunk ids were stored for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDoc {
    pub hash: String,
    pub chunk_count: usize,
}

/// The content-hash record, a whole-file JSON map keyed by document id.
#[derive(Debug, Default)]
pub struct HashRecord {
    path: PathBuf,
    entries: BTreeMap<String, IndexedDoc>,
}

impl HashRecord {
    /// Load the record, treating a missing or corrupt file as empty.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Corrupt hash record {:?}, starting empty: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Start from an empty record (full rebuild).
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, document_id: &str) -> Option<&IndexedDoc> {
        self.entries.get(document_id)
    }

    pub fn insert(&mut self, document_id: String, doc: IndexedDoc) {
        self.entries.insert(document_id, doc);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the whole file. Read-modify-write with no concurrency control,
    /// per the single-process assumption.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Counters reported at the end of an index run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub docs_indexed: usize,
    pub docs_skipped: usize,
    pub docs_failed: usize,
    pub chunks_added: usize,
    pub chunks_dropped: usize,
    pub duration_secs: f64,
}

/// Drives chunking, embedding, and vector upserts for the raw corpus.
pub struct IndexManager {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunk_config: crate::config::ChunkConfig,
    raw_dir: PathBuf,
    hashes_path: PathBuf,
}

impl IndexManager {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            store,
            chunk_config: config.chunk.clone(),
            raw_dir: config.paths.raw_dir.clone(),
            hashes_path: config.paths.hashes_file.clone(),
        }
    }

    /// Rebuild the index from scratch: clears the collection and reprocesses
    /// every raw document.
    pub async fn build_full(&self) -> Result<IndexStats> {
        info!("Full index rebuild starting");
        self.store.reset().await?;
        let record = HashRecord::empty(&self.hashes_path);
        self.run(record, true).await
    }

    /// Incremental update: only new or changed documents are (re)indexed.
    pub async fn update_incremental(&self) -> Result<IndexStats> {
        info!("Incremental index update starting");
        self.store.ensure_ready().await?;
        let record = HashRecord::load(&self.hashes_path);
        self.run(record, false).await
    }

    async fn run(&self, mut record: HashRecord, full: bool) -> Result<IndexStats> {
        let started = Instant::now();
        let mut stats = IndexStats::default();

        let files = list_documents(&self.raw_dir)?;
        if files.is_empty() {
            warn!(
                "No documents found in {:?}; run the crawler first",
                self.raw_dir
            );
            return Ok(stats);
        }

        let bar = document_bar(files.len() as u64);

        for file in files {
            let document_id = document_id_for(&file);
            bar.set_message(document_id.clone());

            let result = self
                .process_document(&file, &document_id, &mut record, full, &mut stats)
                .await;

            if let Err(e) = result {
                error!("Failed to index {}: {}", document_id, e);
                stats.docs_failed += 1;
            }

            bar.inc(1);
        }

        bar.finish_and_clear();
        stats.duration_secs = started.elapsed().as_secs_f64();

        info!(
            "Index run complete: +{} chunks ({} documents), ={} unchanged, {} failed, {} chunks dropped, {:.1}s",
            stats.chunks_added,
            stats.docs_indexed,
            stats.docs_skipped,
            stats.docs_failed,
            stats.chunks_dropped,
            stats.duration_secs
        );

        Ok(stats)
    }

    async fn process_document(
        &self,
        file: &Path,
        document_id: &str,
        record: &mut HashRecord,
        full: bool,
        stats: &mut IndexStats,
    ) -> Result<()> {
        let bytes = std::fs::read(file)?;
        let hash = blake3::hash(&bytes).to_hex().to_string();

        let previous = record.get(document_id).cloned();
        if !full {
            if let Some(prev) = &previous {
                if prev.hash == hash {
                    stats.docs_skipped += 1;
                    debug!("Unchanged, skipping: {}", document_id);
                    return Ok(());
                }
            }
        }

        let content = String::from_utf8_lossy(&bytes);
        let (meta, body) = parse_document(&content);
        let chunks = chunk(&body, &self.chunk_config);

        if chunks.is_empty() {
            warn!("No chunks produced for {}, skipping", document_id);
            return Ok(());
        }

        // Embed per chunk; a chunk whose embedding fails after retries is
        // dropped rather than aborting the whole document.
        let mut points = Vec::with_capacity(chunks.len());
        let total_chunks = chunks.len();
        for text in chunks {
            match self.embedder.embed(&text).await {
                Ok(vector) => {
                    let ordinal = points.len();
                    let payload = ChunkPayload::new(document_id, ordinal, text, &meta);
                    points.push(ChunkPoint {
                        id: crate::store::point_id_for(&payload.chunk_id),
                        vector,
                        payload,
                    });
                }
                Err(e) => {
                    warn!("Dropping chunk of {}: {}", document_id, e);
                    stats.chunks_dropped += 1;
                }
            }
        }

        if points.is_empty() {
            // Hash stays un-advanced so the document is retried next run.
            warn!(
                "No chunk of {} could be embedded, skipping document",
                document_id
            );
            return Ok(());
        }

        // A changed document's stale ids must go first. Ids are positional,
        // so the old count addresses exactly what was stored before.
        if let Some(prev) = &previous {
            let stale: Vec<String> = (0..prev.chunk_count)
                .map(|i| crate::store::chunk_id(document_id, i))
                .collect();
            self.store.delete_chunks(&stale).await?;
        }

        let stored = points.len();
        self.store.upsert(points).await?;

        record.insert(
            document_id.to_string(),
            IndexedDoc {
                hash,
                chunk_count: stored,
            },
        );
        record.save()?;

        stats.docs_indexed += 1;
        stats.chunks_added += stored;

        if stats.chunks_dropped > 0 {
            debug!("{}: {}/{} chunks indexed", document_id, stored, total_chunks);
        } else {
            debug!("{}: {} chunks indexed", document_id, stored);
        }

        Ok(())
    }
}

/// Derive the document id from its filename.
pub fn document_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// List corpus documents in deterministic order.
fn list_documents(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(raw_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("md") | Some("txt")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Print an index run summary to the console.
pub fn print_index_stats(stats: &IndexStats) {
    println!("\n📚 Index run complete\n");
    println!("Documents indexed: {}", stats.docs_indexed);
    println!("Documents unchanged: {}", stats.docs_skipped);
    if stats.docs_failed > 0 {
        println!("Documents failed: {}", stats.docs_failed);
    }
    println!("Chunks added: {}", stats.chunks_added);
    if stats.chunks_dropped > 0 {
        println!("Chunks dropped (embedding failures): {}", stats.chunks_dropped);
    }
    println!("Duration: {:.1}s", stats.duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::SearchHit;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Embedder stub that returns a fixed vector, or fails on texts
    /// containing a marker.
    struct StubEmbedder {
        fail_marker: Option<String>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if let Some(marker) = &self.fail_marker {
                if text.contains(marker.as_str()) {
                    return Err(Error::Embedding("stub failure".to_string()));
                }
            }
            Ok(vec![1.0, 0.0, 0.0])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// In-memory vector store keyed by chunk id.
    #[derive(Default)]
    struct MemoryStore {
        points: Mutex<HashMap<String, ChunkPoint>>,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            self.points.lock().unwrap().clear();
            Ok(())
        }

        async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
            let mut map = self.points.lock().unwrap();
            for p in points {
                map.insert(p.payload.chunk_id.clone(), p);
            }
            Ok(())
        }

        async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<()> {
            let mut map = self.points.lock().unwrap();
            for id in chunk_ids {
                map.remove(id);
            }
            Ok(())
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            _top_k: usize,
            _category: Option<&str>,
        ) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.points.lock().unwrap().len())
        }

        async fn count_by_category(&self, category: &str) -> Result<usize> {
            Ok(self
                .points
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.payload.category == category)
                .count())
        }
    }

    fn write_doc(dir: &Path, name: &str, category: &str, body: &str) {
        let content = format!(
            "---\ntitle: {name}\nsource: https://example.org/{name}\ndomain: example.org\ncategory: {category}\ncaptured_at: 2025-06-01\n---\n{body}"
        );
        std::fs::write(dir.join(format!("{name}.md")), content).unwrap();
    }

    fn manager(
        tmp: &TempDir,
        store: Arc<MemoryStore>,
        fail_marker: Option<&str>,
    ) -> IndexManager {
        let mut config = Config::default();
        config.paths.raw_dir = tmp.path().join("raw");
        config.paths.hashes_file = tmp.path().join("indexed_hashes.json");
        std::fs::create_dir_all(&config.paths.raw_dir).unwrap();

        IndexManager::new(
            Arc::new(StubEmbedder {
                fail_marker: fail_marker.map(String::from),
            }),
            store,
            &config,
        )
    }

    #[tokio::test]
    async fn test_incremental_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let mgr = manager(&tmp, store.clone(), None);
        write_doc(&tmp.path().join("raw"), "doc_a", "GDPR", "Some body text.");
        write_doc(&tmp.path().join("raw"), "doc_b", "NIS2", "Other body text.");

        let first = mgr.update_incremental().await.unwrap();
        assert_eq!(first.docs_indexed, 2);
        assert_eq!(first.chunks_added, 2);

        let second = mgr.update_incremental().await.unwrap();
        assert_eq!(second.docs_indexed, 0);
        assert_eq!(second.chunks_added, 0);
        assert_eq!(second.docs_skipped, 2);

        let third = mgr.update_incremental().await.unwrap();
        assert_eq!(third.chunks_added, 0);
    }

    #[tokio::test]
    async fn test_changed_document_replaces_old_chunks() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let mgr = manager(&tmp, store.clone(), None);

        // Long body chunks into several windows.
        let long_body = "A compliance sentence about controllers. ".repeat(60);
        write_doc(&tmp.path().join("raw"), "doc", "GDPR", &long_body);
        mgr.update_incremental().await.unwrap();
        let before = store.count().await.unwrap();
        assert!(before > 1);

        // Shrink the document to a single chunk; stale ids must disappear.
        write_doc(&tmp.path().join("raw"), "doc", "GDPR", "Short now.");
        mgr.update_incremental().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_leaves_hash_unadvanced() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let mgr = manager(&tmp, store.clone(), Some("body"));
        write_doc(&tmp.path().join("raw"), "doc", "GDPR", "Failing body text.");

        let stats = mgr.update_incremental().await.unwrap();
        assert_eq!(stats.chunks_added, 0);
        assert_eq!(stats.chunks_dropped, 1);
        assert_eq!(store.count().await.unwrap(), 0);

        // Hash was not advanced, so the document is retried next run.
        let record = HashRecord::load(&tmp.path().join("indexed_hashes.json"));
        assert!(record.get("doc").is_none());
    }

    #[tokio::test]
    async fn test_full_rebuild_clears_store() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let mgr = manager(&tmp, store.clone(), None);
        write_doc(&tmp.path().join("raw"), "doc_a", "GDPR", "Some body.");

        mgr.update_incremental().await.unwrap();
        std::fs::remove_file(tmp.path().join("raw/doc_a.md")).unwrap();
        write_doc(&tmp.path().join("raw"), "doc_b", "NIS2", "Another body.");

        mgr.build_full().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.count_by_category("NIS2").await.unwrap(), 1);
        assert_eq!(store.count_by_category("GDPR").await.unwrap(), 0);
    }

    #[test]
    fn test_corrupt_hash_record_treated_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed_hashes.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let record = HashRecord::load(&path);
        assert!(record.is_empty());
    }

    #[test]
    fn test_hash_record_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed_hashes.json");

        let mut record = HashRecord::empty(&path);
        record.insert(
            "doc".to_string(),
            IndexedDoc {
                hash: "abc".to_string(),
                chunk_count: 7,
            },
        );
        record.save().unwrap();

        let loaded = HashRecord::load(&path);
        assert_eq!(loaded.get("doc").unwrap().chunk_count, 7);
        assert_eq!(loaded.len(), 1);
    }
}
