//! Prompt assembly
//!
//! Pure string construction: the system instructions, the retrieved or
//! overriding context block, the replayed conversation history, and the
//! appended source signature. Nothing here talks to the network.

use super::{ConversationTurn, SourceRef};
use crate::parse::truncate_chars;
use crate::retrieve::RetrievalResult;

/// Glyph that opens the source signature. Its presence in a generated
/// answer suppresses appending a second signature.
pub const SOURCE_MARKER: &str = "📚";

/// Maximum number of sources listed in the signature.
pub const MAX_SIGNATURE_SOURCES: usize = 5;

/// Maximum characters of a past answer replayed into the prompt.
pub const HISTORY_ANSWER_CHARS: usize = 300;

/// Standing instructions sent as the system message on every turn.
pub const SYSTEM_INSTRUCTIONS: &str = "\
You are a compliance assistant answering questions about a curated corpus \
of regulatory and policy documents.

Rules:
- Answer only from the context excerpts provided below. If the context does \
not contain the answer, say so plainly instead of guessing.
- Be precise and cite the document titles you relied on.
- When a validated answer is provided in the context, prefer it over the \
retrieved excerpts.
- Answer in the language of the question.";

/// Context block for a previously validated or corrected answer.
pub fn correction_block(question: &str, correction: &str) -> String {
    format!(
        "VALIDATED ANSWER (from a previously confirmed exchange)\n\
         Original question: {question}\n\
         {correction}"
    )
}

/// Context block built from retrieved chunks, one section per chunk.
pub fn context_block(results: &[RetrievalResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "--- EXCERPT {} [{}] ---\nTitle: {}\n{}",
            i + 1,
            r.category,
            r.title,
            r.content
        ));
    }
    out
}

/// Replayed conversation history, past answers truncated for brevity.
pub fn history_block(turns: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!(
            "User: {}\nAssistant: {}\n",
            turn.question,
            truncate_chars(&turn.answer, HISTORY_ANSWER_CHARS)
        ));
    }
    out
}

/// The full user-role message: context, history, then the question.
pub fn assemble(context: &str, history: &str, question: &str) -> String {
    let mut prompt = String::new();

    if context.is_empty() {
        prompt.push_str("No relevant excerpts were found in the corpus.\n\n");
    } else {
        prompt.push_str("Context:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(history);
        prompt.push('\n');
    }

    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt
}

/// Source signature appended to answers that cite retrieved documents.
pub fn source_signature(sources: &[SourceRef]) -> String {
    let mut out = format!("{SOURCE_MARKER} Sources:");
    for source in sources.iter().take(MAX_SIGNATURE_SOURCES) {
        out.push_str(&format!("\n  • {} — {}", source.title, source.url));
    }
    out
}
