//! Conversation orchestrator
//!
//! The façade over the whole query path: correction lookup, retrieval,
//! prompt assembly, generation, source-signature post-processing, confidence
//! scoring, and feedback ingestion. One agent instance serves one
//! conversation; history and the correction memory are private to it.

pub mod confidence;
pub mod prompt;

use crate::embed::Embedder;
use crate::error::Result;
use crate::generate::Generator;
use crate::memory::{CorrectionKind, CorrectionStore, FeedbackEntry, FeedbackLog, FeedbackRating};
use crate::ollama::ChatMessage;
use crate::retrieve::ContextRetriever;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// The orchestrator keeps only this many past turns.
pub const MAX_HISTORY_TURNS: usize = 5;

/// One completed question/answer exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

/// A cited document, deduplicated by (title, url).
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub category: String,
}

/// What one `ask` call returns.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub timestamp: String,
    pub corrected: bool,
}

/// Single-conversation orchestrator.
pub struct Agent {
    retriever: Box<dyn ContextRetriever>,
    generator: Box<dyn Generator>,
    embedder: Arc<dyn Embedder>,
    corrections: CorrectionStore,
    feedback: FeedbackLog,
    history: VecDeque<ConversationTurn>,
    category_filter: Option<String>,
    top_k: usize,
}

impl Agent {
    pub fn new(
        retriever: Box<dyn ContextRetriever>,
        generator: Box<dyn Generator>,
        embedder: Arc<dyn Embedder>,
        corrections: CorrectionStore,
        feedback: FeedbackLog,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            embedder,
            corrections,
            feedback,
            history: VecDeque::new(),
            category_filter: None,
            top_k,
        }
    }

    /// Answer a question. Never fails: generation and lookup errors degrade
    /// to a fallback answer, and the caller always gets a scored response.
    pub async fn ask(&mut self, question: &str) -> Response {
        // Correction lookup is best-effort: an embedding failure means no
        // match, not an error.
        let correction = match self.embedder.embed(question).await {
            Ok(vector) => self.corrections.best_match(&vector).cloned(),
            Err(e) => {
                warn!("Correction lookup skipped, embedding failed: {}", e);
                None
            }
        };
        let corrected = correction.is_some();

        let retrieved = self
            .retriever
            .retrieve(question, self.top_k, self.category_filter.as_deref())
            .await;

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for r in &retrieved {
            if seen.insert(format!("{}|{}", r.title, r.source_url)) {
                sources.push(SourceRef {
                    title: r.title.clone(),
                    url: r.source_url.clone(),
                    category: r.category.clone(),
                });
            }
        }

        let mut context = String::new();
        if let Some(c) = &correction {
            debug!("Using stored correction for: {}", c.question);
            context.push_str(&prompt::correction_block(&c.question, &c.correction));
        }
        if !retrieved.is_empty() {
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&prompt::context_block(&retrieved));
        }

        let history: Vec<ConversationTurn> = self.history.iter().cloned().collect();
        let user_message = prompt::assemble(&context, &prompt::history_block(&history), question);
        let messages = [
            ChatMessage::system(prompt::SYSTEM_INSTRUCTIONS),
            ChatMessage::user(user_message),
        ];

        let mut answer = match self.generator.chat(&messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed, answering with a fallback: {}", e);
                sources.clear();
                format!(
                    "I am sorry, I could not generate an answer right now: {e}. \
                     Please check that the language model service is running and \
                     the '{}' model is installed.",
                    self.generator.model_name()
                )
            }
        };

        if !sources.is_empty() && !answer.contains(prompt::SOURCE_MARKER) {
            answer.push_str("\n\n");
            answer.push_str(&prompt::source_signature(&sources));
        }

        let confidence = confidence::score(&retrieved, &answer, corrected, self.top_k);
        let timestamp = chrono::Utc::now().to_rfc3339();

        self.history.push_back(ConversationTurn {
            question: question.to_string(),
            answer: answer.clone(),
            timestamp: timestamp.clone(),
        });
        while self.history.len() > MAX_HISTORY_TURNS {
            self.history.pop_front();
        }

        Response {
            question: question.to_string(),
            answer,
            sources,
            confidence,
            timestamp,
            corrected,
        }
    }

    /// Ingest a rating on a previous answer.
    ///
    /// Every rating lands in the raw feedback log. A positive rating also
    /// stores the answer as a validation entry; a negative rating with
    /// replacement text stores that text as a correction entry. Negative
    /// feedback without a correction is logged only.
    pub async fn record_feedback(
        &mut self,
        question: &str,
        answer: &str,
        rating: FeedbackRating,
        correction: Option<&str>,
    ) -> Result<()> {
        let correction = correction
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);

        self.feedback.append(FeedbackEntry {
            question: question.to_string(),
            answer: answer.to_string(),
            rating,
            correction: correction.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })?;

        let (text, kind) = match (rating, correction) {
            (FeedbackRating::Positive, _) => (answer.to_string(), CorrectionKind::Validation),
            (FeedbackRating::Negative, Some(text)) => (text, CorrectionKind::Correction),
            (FeedbackRating::Negative, None) => return Ok(()),
        };

        match self.embedder.embed(question).await {
            Ok(embedding) => self.corrections.record(question, &text, embedding, kind),
            Err(e) => {
                warn!("Feedback logged, but correction not stored: {}", e);
                Ok(())
            }
        }
    }

    pub fn set_category_filter(&mut self, category: Option<String>) {
        self.category_filter = category;
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category_filter.as_deref()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn corrections_count(&self) -> usize {
        self.corrections.count()
    }
}
