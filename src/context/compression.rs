//! Truncation and chunking
//!
//! Shortens text to a token limit while keeping the parts models attend to
//! most (the beginning and the end), and splits long text into token windows
//! for map-reduce summarization.

use serde::{Deserialize, Serialize};

use super::budget::ContextManager;
use super::tokens::Token;

/// Marker inserted where the sliding window dropped content
pub const SLIDING_WINDOW_MARKER: &str = "\n[... truncated ...]\n";
/// Marker inserted where middle extraction dropped content
pub const MIDDLE_EXTRACTION_MARKER: &str = "\n[... content extracted ...]\n";

/// Share of the limit kept from the head in middle extraction, in percent
const MIDDLE_HEAD_PCT: usize = 40;

/// How to shorten text that does not fit its budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Keep the first and last halves of the limit
    #[default]
    SlidingWindow,
    /// Keep 40% from the head and 60% from the tail
    MiddleExtraction,
}

impl TruncationStrategy {
    fn head_size(&self, limit: usize) -> usize {
        match self {
            TruncationStrategy::SlidingWindow => limit / 2,
            TruncationStrategy::MiddleExtraction => limit * MIDDLE_HEAD_PCT / 100,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            TruncationStrategy::SlidingWindow => SLIDING_WINDOW_MARKER,
            TruncationStrategy::MiddleExtraction => MIDDLE_EXTRACTION_MARKER,
        }
    }
}

impl ContextManager {
    /// Fit text into `limit` tokens. Text that already fits is returned unchanged.
    pub fn truncate(&self, text: &str, limit: usize, strategy: TruncationStrategy) -> String {
        let tokens = self.tokenizer().encode(text);
        if tokens.len() <= limit {
            return text.to_string();
        }
        self.join_head_tail(&tokens, limit, strategy)
    }

    fn join_head_tail(&self, tokens: &[Token], limit: usize, strategy: TruncationStrategy) -> String {
        let head_size = strategy.head_size(limit);
        let tail_size = limit - head_size;

        let head = self.tokenizer().decode(&tokens[..head_size]);
        let tail = self.tokenizer().decode(&tokens[tokens.len() - tail_size..]);

        format!("{}{}{}", head, strategy.marker(), tail)
    }

    /// Split text into consecutive windows of at most `chunk_size` tokens.
    ///
    /// Text that fits is returned as a single, unmodified chunk.
    pub fn chunk(&self, text: &str, chunk_size: usize) -> Vec<String> {
        let tokens = self.tokenizer().encode(text);
        if tokens.len() <= chunk_size {
            return vec![text.to_string()];
        }

        let chunk_size = chunk_size.max(1);
        tokens
            .chunks(chunk_size)
            .map(|window| self.tokenizer().decode(window))
            .collect()
    }
}
