//! Payload schema for Qdrant points

use crate::parse::DocumentMeta;
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Namespace for deriving point UUIDs from chunk ids. Chunk ids are
/// deterministic and position-based (`{document_id}_chunk_{ordinal}`), so
/// the same chunk always maps to the same point.
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6d, 0x0c, 0x3e, 0xa1, 0x52, 0x7b, 0x44, 0x1f, 0x9b, 0x2d, 0x8e, 0x41, 0x0a, 0x5c, 0x77,
    0xd3,
]);

/// Derive the Qdrant point UUID for a chunk id.
pub fn point_id_for(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&CHUNK_ID_NAMESPACE, chunk_id.as_bytes())
}

/// Format the deterministic chunk id for a document ordinal.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{}_chunk_{}", document_id, ordinal)
}

/// A point ready to be upserted to Qdrant
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each chunk in Qdrant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Deterministic chunk id (`{document_id}_chunk_{ordinal}`)
    pub chunk_id: String,

    /// Parent document id (filename-derived)
    pub document_id: String,

    /// Ordinal position within the document
    pub chunk_index: i64,

    /// The chunk text itself
    pub content: String,

    /// Document title from the header block
    pub title: String,

    /// Capture URL from the header block
    pub source_url: String,

    /// Source domain
    pub domain: String,

    /// Source category (the exact-match retrieval filter key)
    pub category: String,

    /// When the source was captured
    pub captured_at: String,
}

impl ChunkPayload {
    pub fn new(document_id: &str, ordinal: usize, content: String, meta: &DocumentMeta) -> Self {
        Self {
            chunk_id: chunk_id(document_id, ordinal),
            document_id: document_id.to_string(),
            chunk_index: ordinal as i64,
            content,
            title: meta.title.clone(),
            source_url: meta.source_url.clone(),
            domain: meta.domain.clone(),
            category: meta.category.clone(),
            captured_at: meta.captured_at.clone(),
        }
    }

    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("chunk_id".to_string(), string_to_qdrant(&self.chunk_id));
        map.insert(
            "document_id".to_string(),
            string_to_qdrant(&self.document_id),
        );
        map.insert("chunk_index".to_string(), int_to_qdrant(self.chunk_index));
        map.insert("content".to_string(), string_to_qdrant(&self.content));
        map.insert("title".to_string(), string_to_qdrant(&self.title));
        map.insert("source_url".to_string(), string_to_qdrant(&self.source_url));
        map.insert("domain".to_string(), string_to_qdrant(&self.domain));
        map.insert("category".to_string(), string_to_qdrant(&self.category));
        map.insert(
            "captured_at".to_string(),
            string_to_qdrant(&self.captured_at),
        );

        map
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(
            s.to_string(),
        )),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

impl From<Map<String, Value>> for ChunkPayload {
    fn from(map: Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(map)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("gdpr_overview", 3), "gdpr_overview_chunk_3");
    }

    #[test]
    fn test_point_id_deterministic() {
        let a = point_id_for("doc_chunk_0");
        let b = point_id_for("doc_chunk_0");
        let c = point_id_for("doc_chunk_1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_payload_serialization_round_trip() {
        let meta = DocumentMeta {
            title: "GDPR overview".to_string(),
            source_url: "https://example.org/gdpr".to_string(),
            domain: "example.org".to_string(),
            category: "GDPR".to_string(),
            captured_at: "2025-06-01".to_string(),
        };
        let payload = ChunkPayload::new("gdpr_overview", 0, "Article 5…".to_string(), &meta);

        let json = serde_json::to_string(&payload).unwrap();
        let parsed: ChunkPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_id, "gdpr_overview_chunk_0");
        assert_eq!(parsed.category, "GDPR");
        assert_eq!(parsed.content, "Article 5…");
    }
}
