//! Raw document parsing
//!
//! Corpus documents arrive from the crawler as text files with a key-value
//! header block delimited by `---` lines, followed by the captured body.
//! This module extracts that header and normalizes body text before
//! chunking.

use regex::Regex;
use std::sync::OnceLock;

/// Metadata carried in a document's header block.
///
/// A document with no header block parses as all-empty metadata; the body is
/// still indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMeta {
    pub title: String,
    pub source_url: String,
    pub domain: String,
    pub category: String,
    pub captured_at: String,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t]*\n(.*?)\n---[ \t]*\n").expect("valid header regex")
    })
}

/// Split a raw document into its header metadata and body.
///
/// Tolerates a missing or malformed header block by returning empty metadata
/// and the whole input as body.
pub fn parse_document(content: &str) -> (DocumentMeta, String) {
    let mut meta = DocumentMeta::default();

    let Some(caps) = header_regex().captures(content) else {
        return (meta, content.to_string());
    };

    let header = &caps[1];
    let body = content[caps.get(0).map(|m| m.end()).unwrap_or(0)..].to_string();

    for line in header.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key {
            "title" => meta.title = value.to_string(),
            "source" => meta.source_url = value.to_string(),
            "domain" => meta.domain = value.to_string(),
            "category" => meta.category = value.to_string(),
            "captured_at" | "captured-at" => meta.captured_at = value.to_string(),
            _ => {}
        }
    }

    (meta, body)
}

fn html_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

fn spaces_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("valid spaces regex"))
}

fn newlines_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid newlines regex"))
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Normalize body text before chunking.
///
/// Hard-truncates to `max_raw_chars` first to bound cost on pathologically
/// large captures, then strips residual HTML tags, collapses runs of spaces,
/// and collapses 3+ newlines to a paragraph break.
pub fn normalize(text: &str, max_raw_chars: usize) -> String {
    let text = truncate_chars(text, max_raw_chars);

    let text = html_tag_regex().replace_all(text, "");
    let text = text.replace('\t', " ");
    let text = spaces_regex().replace_all(&text, " ");
    let text = newlines_regex().replace_all(&text, "\n\n");

    text.trim().to_string()
}
