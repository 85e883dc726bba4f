//! Token Budget Management
//!
//! Splits a model's context window into fixed sections for the system prompt,
//! few-shot examples, document content and the model's answer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::tokens::Tokenizer;

/// Context window used when none (or zero) is configured
pub const DEFAULT_MAX_TOKENS: usize = 4096;

/// Section shares of the context window, in percent
pub const SYSTEM_PCT: usize = 10;
pub const EXAMPLES_PCT: usize = 20;
pub const CONTENT_PCT: usize = 60;
pub const OUTPUT_PCT: usize = 10;

/// Per-section token budgets derived from a context window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBudget {
    pub system: usize,
    pub examples: usize,
    pub content: usize,
    pub output: usize,
}

impl ContextBudget {
    /// Compute budgets from a context window. A window of 0 means "use the default".
    pub fn from_max_tokens(max_tokens: usize) -> Self {
        let max_tokens = effective_max_tokens(max_tokens);
        Self {
            system: max_tokens * SYSTEM_PCT / 100,
            examples: max_tokens * EXAMPLES_PCT / 100,
            content: max_tokens * CONTENT_PCT / 100,
            output: max_tokens * OUTPUT_PCT / 100,
        }
    }

    pub fn total(&self) -> usize {
        self.system + self.examples + self.content + self.output
    }
}

fn effective_max_tokens(max_tokens: usize) -> usize {
    if max_tokens == 0 {
        DEFAULT_MAX_TOKENS
    } else {
        max_tokens
    }
}

/// Keeps prompts inside a model's token ceiling.
///
/// Budgets are recomputed from the ceiling on every call; the manager holds
/// no mutable state and is shared freely between workers.
#[derive(Debug, Clone)]
pub struct ContextManager {
    tokenizer: Arc<Tokenizer>,
    max_tokens: usize,
}

impl ContextManager {
    pub fn new(tokenizer: Arc<Tokenizer>, max_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_tokens: effective_max_tokens(max_tokens),
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Budgets for each prompt section
    pub fn budgets(&self) -> ContextBudget {
        ContextBudget::from_max_tokens(self.max_tokens)
    }

    /// Tokens left for the model's answer
    pub fn estimate_response_budget(&self) -> usize {
        self.budgets().output
    }

    /// Check if text alone exceeds the whole context window
    pub fn is_exceeding_hard_limit(&self, text: &str) -> bool {
        self.tokenizer.count(text) > self.max_tokens
    }
}
