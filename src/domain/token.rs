//! Token estimation used by the `truncate_tokens` template function.

use std::error::Error as StdError;

use thiserror::Error;

/// Error reported by a [`TokenCounter`].
#[derive(Debug, Error)]
#[error("token counting failed: {source}")]
pub struct TokenCountError {
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl TokenCountError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self { source: source.into() }
    }
}

/// Estimates how many tokens a string occupies.
///
/// Plug in a real tokenizer to make `truncate_tokens` exact. Implementations
/// must be monotonic non-decreasing in prefix length.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, TokenCountError>;
}

/// Estimates tokens as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharFallbackCounter {
    /// Zero means the English average of 4.
    pub chars_per_token: usize,
}

impl CharFallbackCounter {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    pub fn new(chars_per_token: usize) -> Self {
        Self { chars_per_token }
    }
}

impl TokenCounter for CharFallbackCounter {
    fn count(&self, text: &str) -> Result<usize, TokenCountError> {
        let per_token = match self.chars_per_token {
            0 => Self::DEFAULT_CHARS_PER_TOKEN,
            n => n,
        };
        Ok(text.chars().count().div_ceil(per_token))
    }
}
