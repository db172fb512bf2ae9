//! docent - a local, adaptive question-answering assistant over a curated
//! document corpus
//!
//! This crate provides:
//! - Incremental indexing of header-tagged text documents into Qdrant
//! - Similarity retrieval with optional category filtering
//! - A conversation orchestrator over a local Ollama generator
//! - An adaptive correction memory fed by user feedback

pub mod agent;
pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod generate;
pub mod index;
pub mod memory;
pub mod ollama;
pub mod parse;
pub mod progress;
pub mod retrieve;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
