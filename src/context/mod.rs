//! Context Management Module
//!
//! Keeps every prompt inside the model's token ceiling: section budgets,
//! head/tail truncation and token-window chunking.

pub mod budget;
pub mod compression;
pub mod tokens;

pub use budget::{ContextBudget, ContextManager, DEFAULT_MAX_TOKENS};
pub use compression::{TruncationStrategy, MIDDLE_EXTRACTION_MARKER, SLIDING_WINDOW_MARKER};
pub use tokens::{Token, Tokenizer, TokenizerError, DEFAULT_ENCODING};
