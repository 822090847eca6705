//! Token estimation.
//!
//! Uses a character-based heuristic with a configurable ratio (default
//! 4 characters per token). Close enough for budgeting against BPE
//! tokenizers on English text; the ceiling leaves headroom for the error.

use tars_core::{Error, Result};

/// Fixed per-message cost for role markers and delimiters in the wire format.
pub const MESSAGE_OVERHEAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    chars_per_token: f32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4.0 }
    }
}

impl TokenEstimator {
    pub fn new(chars_per_token: f32) -> Result<Self> {
        if !chars_per_token.is_finite() || chars_per_token <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "chars_per_token must be a positive number, got {chars_per_token}"
            )));
        }
        Ok(Self { chars_per_token })
    }

    pub fn chars_per_token(&self) -> f32 {
        self.chars_per_token
    }

    /// Estimate tokens for raw text. Rounds up; empty text is zero.
    pub fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        (chars as f64 / self.chars_per_token as f64).ceil() as usize
    }

    /// Estimate tokens for one message including [`MESSAGE_OVERHEAD`].
    pub fn estimate_message(&self, content: &str) -> usize {
        MESSAGE_OVERHEAD + self.estimate(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(TokenEstimator::default().estimate(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(TokenEstimator::default().estimate("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(TokenEstimator::default().estimate("hello"), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 4 chars, 8 bytes
        assert_eq!(TokenEstimator::default().estimate("éééé"), 1);
    }

    #[test]
    fn custom_ratio() {
        let est = TokenEstimator::new(2.5).unwrap();
        assert_eq!(est.estimate(&"a".repeat(10)), 4);
        assert_eq!(est.estimate(&"a".repeat(11)), 5);
    }

    #[test]
    fn message_includes_overhead() {
        assert_eq!(TokenEstimator::default().estimate_message("test"), 5);
        assert_eq!(TokenEstimator::default().estimate_message(""), MESSAGE_OVERHEAD);
    }

    #[test]
    fn rejects_non_positive_ratio() {
        assert!(matches!(TokenEstimator::new(0.0), Err(Error::InvalidConfig(_))));
        assert!(TokenEstimator::new(-1.0).is_err());
        assert!(TokenEstimator::new(f32::NAN).is_err());
    }
}
