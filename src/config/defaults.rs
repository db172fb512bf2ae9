//! Default values for configuration fields

pub fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

pub fn default_llm_model() -> String {
    "mistral".to_string()
}

pub fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

pub fn default_qdrant_url() -> String {
    "http://127.0.0.1:6334".to_string()
}

pub fn default_collection_name() -> String {
    "docent_corpus".to_string()
}

pub fn default_embedding_dimension() -> usize {
    768
}

pub fn default_chunk_size() -> usize {
    500
}

pub fn default_chunk_overlap() -> usize {
    50
}

/// Raw document bodies are hard-truncated before normalization. Some source
/// captures (full EU regulations) run to ~900 KB and make the cleanup regexes
/// pathological.
pub fn default_max_raw_chars() -> usize {
    100_000
}

/// Safe input length for the embedding gateway (nomic-embed-text has an
/// ~8192-token window; 8000 chars stays well inside it).
pub fn default_embed_max_input_chars() -> usize {
    8_000
}

pub fn default_embed_timeout_secs() -> u64 {
    120
}

pub fn default_embed_max_attempts() -> u32 {
    3
}

pub fn default_generate_timeout_secs() -> u64 {
    300
}

pub fn default_top_k() -> usize {
    5
}
