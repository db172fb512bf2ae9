//! Vector index integration
//!
//! Wraps the Qdrant client behind a small [`VectorStore`] trait so the
//! indexing and retrieval paths can be exercised against an in-memory store
//! in tests. Similarity space is cosine; hits are reported as a
//! ChromaDB-style cosine distance (0 = identical, larger = less similar),
//! converted at this boundary from Qdrant's similarity score.

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};

/// A single search hit with its payload and cosine distance.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub payload: ChunkPayload,
    pub distance: f32,
}

/// Convert a Qdrant cosine similarity score into a cosine distance in [0, 2].
pub fn score_to_distance(score: f32) -> f32 {
    (1.0 - score).clamp(0.0, 2.0)
}

/// Operations the index and retrieval paths need from a vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet
    async fn ensure_ready(&self) -> Result<()>;

    /// Delete and recreate the collection (full rebuild)
    async fn reset(&self) -> Result<()>;

    /// Upsert chunk points; never partially applied per call
    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Delete points addressed by their deterministic chunk ids
    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<()>;

    /// Similarity query, most similar first, with an optional exact-match
    /// category filter applied at the index level
    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// Total number of stored chunks
    async fn count(&self) -> Result<usize>;

    /// Number of stored chunks in one category
    async fn count_by_category(&self, category: &str) -> Result<usize>;
}

/// Qdrant-backed vector store
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding_dimension,
        )
    }

    /// Create a new store handle directly with URL and collection name
    pub fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// Get the expected vector dimension for this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn category_filter(category: Option<&str>) -> Option<Filter> {
        category.map(|c| Filter {
            must: vec![Condition::matches("category", c.to_string())],
            should: vec![],
            must_not: vec![],
            min_should: None,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_ready(&self) -> Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;
        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(vectors_config),
            )
            .await?;

        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            info!("Deleting existing collection {}", self.collection);
            self.client.delete_collection(&self.collection).await?;
        }
        self.ensure_ready().await
    }

    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::VectorStore(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs))
            .await?;

        Ok(())
    }

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }

        debug!(
            "Deleting {} points from collection {}",
            chunk_ids.len(),
            self.collection
        );

        let ids: Vec<PointId> = chunk_ids
            .iter()
            .map(|id| PointId::from(point_id_for(id).to_string()))
            .collect();

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids))
            .await?;

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        debug!(
            "Searching collection {} with top_k {}",
            self.collection, top_k
        );

        let mut builder = SearchPointsBuilder::new(&self.collection, vector, top_k as u64)
            .with_payload(true);

        if let Some(filter) = Self::category_filter(category) {
            builder = builder.filter(filter);
        }

        let response = self.client.search_points(builder).await?;

        let hits = response
            .result
            .into_iter()
            .map(|p| {
                let payload: ChunkPayload = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect::<serde_json::Map<String, Value>>()
                    .into();

                SearchHit {
                    payload,
                    distance: score_to_distance(p.score),
                }
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(0);
        }

        let info = self.client.collection_info(&self.collection).await?;
        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize)
    }

    async fn count_by_category(&self, category: &str) -> Result<usize> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(0);
        }

        let filter = Self::category_filter(Some(category))
            .unwrap_or_default();
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await?;

        Ok(response.result.map(|r| r.count).unwrap_or(0) as usize)
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::DocumentMeta;

    #[test]
    fn test_score_to_distance() {
        assert_eq!(score_to_distance(1.0), 0.0);
        assert_eq!(score_to_distance(0.0), 1.0);
        assert_eq!(score_to_distance(-1.0), 2.0);
        // Out-of-range scores clamp into [0, 2].
        assert_eq!(score_to_distance(1.5), 0.0);
        assert_eq!(score_to_distance(-2.0), 2.0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let store = QdrantStore::new("http://127.0.0.1:6334", "test_collection", 3)
            .expect("store should initialize");

        let point = ChunkPoint {
            id: point_id_for("doc_chunk_0"),
            vector: vec![0.1, 0.2],
            payload: ChunkPayload::new("doc", 0, "text".to_string(), &DocumentMeta::default()),
        };

        let err = store
            .upsert(vec![point])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::VectorStore(message) => {
                assert!(message.contains("Vector dimension mismatch"))
            }
            other => panic!("expected vector store error, got {other:?}"),
        }
    }
}
