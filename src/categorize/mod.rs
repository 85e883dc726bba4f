//! Document categorization
//!
//! Prompting, strict reply validation, name sanitization and the
//! retry-with-correction engine built on top of them.

pub mod engine;
pub mod prompt;
pub mod sanitize;
pub mod validation;

pub use engine::{
    AttemptError, CategorizationEngine, CategorizeError, SummarizeError, FALLBACK_TITLE, MAX_ATTEMPTS,
    MAX_SUMMARY_ROUNDS,
};
pub use prompt::ConversationHistory;
pub use sanitize::{sanitize_category, sanitize_filename, SANITIZE_FALLBACK};
pub use validation::{clean_json, parse_and_validate, AnalysisResult, ValidationError};
