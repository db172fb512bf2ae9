//! Confidence scoring
//!
//! A heuristic proxy for answer trustworthiness, not a calibrated
//! probability. Four additive, independently capped components: retrieval
//! volume, retrieval quality, answer substance, and a bonus when a validated
//! correction was used.

use crate::retrieve::RetrievalResult;

const VOLUME_WEIGHT: f32 = 0.35;
const QUALITY_WEIGHT: f32 = 0.35;
const LONG_ANSWER_BONUS: f32 = 0.15;
const SHORT_ANSWER_BONUS: f32 = 0.08;
const CORRECTION_BONUS: f32 = 0.15;

/// Score an answer in [0, 1], rounded to 2 decimals.
///
/// Both answer-length comparisons are strict: exactly 200 characters does
/// not earn the long-answer bonus, exactly 50 earns nothing.
pub fn score(
    retrieved: &[RetrievalResult],
    answer: &str,
    used_correction: bool,
    top_k: usize,
) -> f32 {
    let mut score = 0.0f32;

    if !retrieved.is_empty() && top_k > 0 {
        let ratio = (retrieved.len() as f32 / top_k as f32).min(1.0);
        score += ratio * VOLUME_WEIGHT;

        let mean_similarity = retrieved
            .iter()
            .map(|r| (1.0 - r.distance).max(0.0))
            .sum::<f32>()
            / retrieved.len() as f32;
        score += mean_similarity * QUALITY_WEIGHT;
    }

    let answer_len = answer.chars().count();
    if answer_len > 200 {
        score += LONG_ANSWER_BONUS;
    } else if answer_len > 50 {
        score += SHORT_ANSWER_BONUS;
    }

    if used_correction {
        score += CORRECTION_BONUS;
    }

    (score.min(1.0) * 100.0).round() / 100.0
}
