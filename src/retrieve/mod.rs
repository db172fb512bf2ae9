//! Similarity retrieval
//!
//! Wraps a question embedding plus a vector index query. Retrieval is
//! best-effort: any transport or embedding failure degrades to an empty
//! result set, because prompt assembly and confidence scoring must keep
//! working with zero retrieved chunks.

use crate::embed::Embedder;
use crate::store::VectorStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// One retrieved chunk with the metadata the orchestrator needs.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub content: String,
    pub title: String,
    pub source_url: String,
    pub category: String,
    /// Cosine distance: 0 = identical, larger = less similar, at most 2.
    pub distance: f32,
}

/// Seam between the orchestrator and the retrieval machinery.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Most similar chunks first. Never fails; degrades to empty.
    async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Vec<RetrievalResult>;
}

/// Retriever over the embedding gateway and the vector index.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl ContextRetriever for Retriever {
    async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Vec<RetrievalResult> {
        let vector = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Question embedding failed, retrieving nothing: {}", e);
                return Vec::new();
            }
        };

        match self.store.search(vector, top_k, category).await {
            Ok(hits) => {
                debug!("Retrieved {} chunks", hits.len());
                hits.into_iter()
                    .map(|hit| RetrievalResult {
                        content: hit.payload.content,
                        title: hit.payload.title,
                        source_url: hit.payload.source_url,
                        category: hit.payload.category,
                        distance: hit.distance,
                    })
                    .collect()
            }
            Err(e) => {
                warn!("Vector search failed, retrieving nothing: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::store::{ChunkPoint, SearchHit};

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::Embedding("down".to_string()))
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct PanickyStore;

    #[async_trait]
    impl VectorStore for PanickyStore {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }
        async fn reset(&self) -> Result<()> {
            Ok(())
        }
        async fn upsert(&self, _points: Vec<ChunkPoint>) -> Result<()> {
            Ok(())
        }
        async fn delete_chunks(&self, _chunk_ids: &[String]) -> Result<()> {
            Ok(())
        }
        async fn search(
            &self,
            _vector: Vec<f32>,
            _top_k: usize,
            _category: Option<&str>,
        ) -> Result<Vec<SearchHit>> {
            panic!("search must not be reached when embedding fails");
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
        async fn count_by_category(&self, _category: &str) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let retriever = Retriever::new(Arc::new(FailingEmbedder), Arc::new(PanickyStore));
        let results = retriever.retrieve("What is GDPR?", 5, None).await;
        assert!(results.is_empty());
    }
}
