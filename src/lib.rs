// Docsort Library
// Exports core modules for use by the CLI binary and integration tests

pub mod categorize;
pub mod config;
pub mod context;
pub mod extract;
pub mod fileops;
pub mod llm;
pub mod pipeline;
pub mod registry;

// Re-export commonly used types
pub use categorize::{
    AnalysisResult, CategorizationEngine, CategorizeError, SummarizeError, ValidationError,
    sanitize_category, sanitize_filename, parse_and_validate,
};
pub use config::{Args, Config, ConfigError, FileConfig};
pub use context::{ContextBudget, ContextManager, Tokenizer, TokenizerError, TruncationStrategy};
pub use extract::{extract_text, ExtractError};
pub use fileops::{move_file, MoveError};
pub use llm::{ChatBackend, ChatMessage, ChatRequest, LlmError, OpenAiCompatClient};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineError, RunSummary, ShutdownHandle, ShutdownSignal,
    shutdown_channel,
};
pub use registry::{CategoryRegistry, RegistryError, DEFAULT_CATEGORIES, FALLBACK_CATEGORY, discover_categories};
