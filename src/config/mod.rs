//! Configuration management for docent
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama base URL (embedding gateway and generator)
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Chat model used for answer generation
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Model used for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding vector dimension (must match the embedding model)
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Embedding gateway call configuration
    #[serde(default)]
    pub embed: EmbedConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target characters per chunk
    #[serde(default = "default_chunk_size")]
    pub size: usize,

    /// Overlap characters between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,

    /// Hard cap on raw body length before normalization
    #[serde(default = "default_max_raw_chars")]
    pub max_raw_chars: usize,
}

/// Embedding gateway call configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Input is truncated to this many characters before the call
    #[serde(default = "default_embed_max_input_chars")]
    pub max_input_chars: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per embedding call (retries sleep with exponential backoff)
    #[serde(default = "default_embed_max_attempts")]
    pub max_attempts: u32,

    /// Generation call timeout in seconds
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docent data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Directory holding the raw corpus documents
    pub raw_dir: PathBuf,

    /// Hash record for incremental indexing
    pub hashes_file: PathBuf,

    /// Append-only correction memory
    pub corrections_file: PathBuf,

    /// Append-only feedback log
    pub feedback_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            llm_model: default_llm_model(),
            embedding_model: default_embedding_model(),
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            embedding_dimension: default_embedding_dimension(),
            chunk: ChunkConfig::default(),
            embed: EmbedConfig::default(),
            query: QueryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
            max_raw_chars: default_max_raw_chars(),
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_embed_max_input_chars(),
            timeout_secs: default_embed_timeout_secs(),
            max_attempts: default_embed_max_attempts(),
            generate_timeout_secs: default_generate_timeout_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

impl Config {
    /// Get the default base directory for docent (~/.docent)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docent")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            raw_dir: base.join("raw"),
            hashes_file: base.join("indexed_hashes.json"),
            corrections_file: base.join("corrections.json"),
            feedback_file: base.join("feedback.json"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.init_paths(Some(base));
        config.paths.config_file = config_path.to_path_buf();

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    /// when no config file exists there yet.
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Create the data directories this config points at
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.base_dir)?;
        std::fs::create_dir_all(&self.paths.raw_dir)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.size == 0 {
            return Err(Error::Config("chunk.size must be positive".to_string()));
        }

        if self.chunk.overlap >= self.chunk.size {
            return Err(Error::Config(
                "chunk.overlap must be < chunk.size".to_string(),
            ));
        }

        if self.chunk.max_raw_chars < self.chunk.size {
            return Err(Error::Config(
                "chunk.max_raw_chars must be >= chunk.size".to_string(),
            ));
        }

        if self.query.top_k == 0 {
            return Err(Error::Config("query.top_k must be positive".to_string()));
        }

        if self.embed.max_attempts == 0 {
            return Err(Error::Config(
                "embed.max_attempts must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.collection_name, "docent_corpus");
        assert_eq!(config.query.top_k, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.collection_name = "test_collection".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.collection_name, "test_collection");
        assert_eq!(loaded.paths.hashes_file, tmp.path().join("indexed_hashes.json"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chunk.overlap = config.chunk.size;
        assert!(config.validate().is_err());

        config.chunk.overlap = 50;
        assert!(config.validate().is_ok());

        config.query.top_k = 0;
        assert!(config.validate().is_err());
    }
}
