//! Text chunking
//!
//! Splits a normalized document body into overlapping windows for embedding.
//! Window ends snap backward to the nearest sentence terminator, newline, or
//! space, but only within the second half of the window, so snapping can
//! never produce a degenerate tiny chunk. A minimum forward step of
//! `size - overlap` (floor 1) is enforced unconditionally: the cursor cannot
//! stall, so the loop terminates in O(len / step) iterations.

use crate::config::ChunkConfig;
use crate::parse::normalize;

/// Floor a byte position to a valid char boundary.
fn floor_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}

/// Ceil a byte position to a valid char boundary.
fn ceil_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted < text.len() && !text.is_char_boundary(adjusted) {
        adjusted += 1;
    }
    adjusted
}

/// Find a natural cut inside `[zone_start, end)`: sentence terminator first,
/// then newline, then space. Returns the byte position just after the cut
/// character.
fn snap_backward(text: &str, zone_start: usize, end: usize) -> Option<usize> {
    let window = &text[zone_start..end];
    for cut in ['.', '\n', ' '] {
        if let Some(pos) = window.rfind(cut) {
            return Some(zone_start + pos + 1);
        }
    }
    None
}

/// Split a raw document body into overlapping chunks.
///
/// The body is normalized (and hard-truncated to `max_raw_chars`) first.
/// Returns an empty vector for input that is empty after normalization, and
/// a single element equal to the normalized text when it fits in one window.
pub fn chunk(text: &str, config: &ChunkConfig) -> Vec<String> {
    let text = normalize(text, config.max_raw_chars);

    if text.is_empty() {
        return Vec::new();
    }

    if text.len() <= config.size {
        return vec![text];
    }

    let min_step = (config.size - config.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let mut end = floor_char_boundary(&text, start + config.size);
        if end <= start {
            end = ceil_char_boundary(&text, start + 1);
        }

        if end < text.len() {
            // Only snap within the second half of the window.
            let zone_start = ceil_char_boundary(&text, start + config.size / 2);
            if zone_start < end {
                if let Some(cut) = snap_backward(&text, zone_start, end) {
                    if cut > start {
                        end = cut;
                    }
                }
            }
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= text.len() {
            break;
        }

        let next = (end.saturating_sub(config.overlap)).max(start + min_step);
        start = ceil_char_boundary(&text, next);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig {
            size,
            overlap,
            max_raw_chars: 100_000,
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk("A short sentence.", &cfg(500, 50));
        assert_eq!(chunks, vec!["A short sentence.".to_string()]);
    }

    #[test]
    fn test_empty_after_normalization() {
        assert!(chunk("", &cfg(500, 50)).is_empty());
        assert!(chunk("   \n\n  ", &cfg(500, 50)).is_empty());
        assert!(chunk("<br><hr>", &cfg(500, 50)).is_empty());
    }

    #[test]
    fn test_long_text_terminates_and_covers() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
        let chunks = chunk(&text, &cfg(200, 40));

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(!c.is_empty());
            // Snapping only shrinks a window, never grows it.
            assert!(c.len() <= 200);
        }
        // Last chunk ends where the text ends.
        let last = chunks.last().unwrap();
        assert!(text.trim_end().ends_with(last.as_str()));
    }

    #[test]
    fn test_window_ends_on_sentence_boundary() {
        let text = "One two three four five. Six seven eight nine ten. Eleven twelve thirteen fourteen.";
        let chunks = chunk(text, &cfg(40, 10));
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "word ".repeat(200);
        let chunks = chunk(&text, &cfg(100, 30));

        for pair in chunks.windows(2) {
            // Some suffix of the previous chunk reappears at the head of the
            // next one (within snapping tolerance).
            let prev_tail: String = pair[0].chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(
                pair[1].contains(prev_tail.trim()),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_stall_on_pathological_input() {
        // No sentence terminators, newlines, or spaces anywhere.
        let text = "x".repeat(5_000);
        let chunks = chunk(&text, &cfg(100, 99));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.is_empty());
        }
    }

    #[test]
    fn test_multibyte_input_does_not_panic() {
        let text = "héllo wörld. ".repeat(100);
        let chunks = chunk(&text, &cfg(50, 10));
        assert!(chunks.len() > 1);
    }
}
