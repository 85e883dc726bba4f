//! Classification service access

pub mod client;

pub use client::{
    completions_endpoint, ChatBackend, ChatMessage, ChatRequest, ChatResponse, LlmError,
    OpenAiCompatClient, Role, DEFAULT_API_BASE,
};
