//! Heuristic response quality score.
//!
//! A placeholder for a learned metric: short replies score low, very long
//! replies score flat, and mid-length replies earn credit for each empathy
//! word they contain. Pure and deterministic.

/// Words whose presence signals an empathetic reply.
pub const EMPATHY_VOCABULARY: [&str; 5] = ["understand", "feel", "support", "help", "care"];

/// Score for replies shorter than [`MIN_LENGTH`] characters.
pub const SHORT_SCORE: f64 = 0.2;

/// Score for replies longer than [`MAX_LENGTH`] characters.
pub const LONG_SCORE: f64 = 0.7;

/// Replies below this many characters are "short".
pub const MIN_LENGTH: usize = 10;

/// Replies above this many characters are "long".
pub const MAX_LENGTH: usize = 500;

/// Score `text` in `[0.0, 1.0]`.
///
/// Mid-length replies score `0.5 + 0.1` per distinct vocabulary word found
/// (case-insensitive substring match), capped at `1.0`. Each word counts at
/// most once however often it appears.
pub fn score(text: &str) -> f64 {
    let length = text.chars().count();
    if length < MIN_LENGTH {
        return SHORT_SCORE;
    }
    if length > MAX_LENGTH {
        return LONG_SCORE;
    }

    let lower = text.to_lowercase();
    let hits = EMPATHY_VOCABULARY
        .iter()
        .filter(|word| lower.contains(*word))
        .count();

    // Tenths as integers keep 0.5 + 0.2 exactly equal to 0.7.
    let tenths = (5 + hits).min(10);
    tenths as f64 / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_short() {
        assert_eq!(score(""), SHORT_SCORE);
    }

    #[test]
    fn boundaries_are_inclusive_mid_range() {
        assert_eq!(score(&"x".repeat(9)), SHORT_SCORE);
        assert_eq!(score(&"x".repeat(10)), 0.5);
        assert_eq!(score(&"x".repeat(500)), 0.5);
        assert_eq!(score(&"x".repeat(501)), LONG_SCORE);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 9 characters, 18 bytes
        assert_eq!(score(&"é".repeat(9)), SHORT_SCORE);
    }
}
