//! Categorization Engine
//!
//! Turns extracted document text into a validated [`AnalysisResult`]:
//! - the system prompt is fitted to the system budget
//! - oversized documents are summarized map-reduce style, falling back to
//!   middle extraction when summarization fails
//! - replies are validated strictly and retried with corrective feedback

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::prompt::{self, ConversationHistory, SUMMARY_SYSTEM_PROMPT, TEMPERATURE};
use super::validation::{parse_and_validate, AnalysisResult, ValidationError};
use crate::context::{ContextManager, TruncationStrategy};
use crate::llm::{ChatBackend, ChatMessage, ChatRequest, LlmError};
use crate::registry::CategoryRegistry;

/// Total classification attempts per document
pub const MAX_ATTEMPTS: usize = 3;

/// Map-reduce rounds before summarization gives up
pub const MAX_SUMMARY_ROUNDS: usize = 5;

/// Title reported when no valid classification was obtained
pub const FALLBACK_TITLE: &str = "Unknown_Doc";

/// Share of the content budget used per summarization chunk, in percent
const SUMMARY_CHUNK_PCT: usize = 80;

/// Why a single classification attempt failed
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum CategorizeError {
    /// Every attempt failed. The fallback result travels with the error.
    #[error("failed to get valid structured output after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: usize,
        fallback: AnalysisResult,
        last_error: AttemptError,
    },
}

impl CategorizeError {
    pub fn fallback(&self) -> &AnalysisResult {
        match self {
            CategorizeError::RetriesExhausted { fallback, .. } => fallback,
        }
    }
}

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("failed to summarize chunk {index}/{total}: {source}")]
    Chunk {
        index: usize,
        total: usize,
        #[source]
        source: LlmError,
    },
    #[error("summary still exceeds {limit} tokens after {rounds} rounds")]
    NotConverging { rounds: usize, limit: usize },
}

/// Classifies documents against the published category registry
pub struct CategorizationEngine {
    backend: Arc<dyn ChatBackend>,
    context: ContextManager,
    registry: Arc<CategoryRegistry>,
    model: String,
}

impl CategorizationEngine {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        context: ContextManager,
        registry: Arc<CategoryRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            context,
            registry,
            model: model.into(),
        }
    }

    pub fn registry(&self) -> &Arc<CategoryRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify document text.
    ///
    /// Makes up to [`MAX_ATTEMPTS`] requests. When all of them fail, the error
    /// carries a fallback result pointing at the registry's fallback category.
    pub async fn categorize(&self, text: &str) -> Result<AnalysisResult, CategorizeError> {
        // One snapshot for the whole call so prompt and validation agree
        let categories = self.registry.snapshot();
        let budgets = self.context.budgets();

        let system = self.context.truncate(
            &prompt::system_prompt(&categories),
            budgets.system,
            TruncationStrategy::SlidingWindow,
        );
        let content = self.fit_content(text, budgets.content).await;
        let user = prompt::user_prompt(&content);

        if self.context.is_exceeding_hard_limit(&format!("{}{}", system, user)) {
            warn!(max_tokens = self.context.max_tokens(), "Prompt exceeds context window");
        }

        let base = ConversationHistory::new(system, user);
        let mut history = base.clone();
        let mut last_error: Option<AttemptError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&history, &categories).await {
                Ok(result) => {
                    debug!(attempt, category = %result.category, title = %result.title, "Classified document");
                    return Ok(result);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Classification attempt failed");
                    history = base.with_feedback(&e.to_string());
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.unwrap_or(AttemptError::Llm(LlmError::EmptyChoices));
        warn!(attempts = MAX_ATTEMPTS, error = %last_error, "Classification retries exhausted");
        Err(CategorizeError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
            fallback: AnalysisResult {
                category: self.registry.fallback().to_string(),
                title: FALLBACK_TITLE.to_string(),
                confidence_score: 0.0,
            },
            last_error,
        })
    }

    async fn attempt(
        &self,
        history: &ConversationHistory,
        categories: &[String],
    ) -> Result<AnalysisResult, AttemptError> {
        let request = ChatRequest::new(&self.model, history.messages(), TEMPERATURE);
        let reply = self.backend.complete(&request).await?;
        Ok(parse_and_validate(&reply, categories)?)
    }

    /// Bring document text within the content budget
    async fn fit_content(&self, text: &str, limit: usize) -> String {
        if self.context.tokenizer().count(text) <= limit {
            return text.to_string();
        }

        match self.summarize(text, limit).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summarization failed, extracting head and tail");
                self.context.truncate(text, limit, TruncationStrategy::MiddleExtraction)
            }
        }
    }

    /// Map-reduce summarize `text` until it fits in `limit` tokens.
    ///
    /// Text already within the limit is returned unchanged. Each round chunks
    /// the current text, summarizes every chunk and joins the summaries.
    pub async fn summarize(&self, text: &str, limit: usize) -> Result<String, SummarizeError> {
        let chunk_size = (self.context.budgets().content * SUMMARY_CHUNK_PCT / 100).max(1);
        let mut current = text.to_string();

        for round in 1..=MAX_SUMMARY_ROUNDS {
            if self.context.tokenizer().count(&current) <= limit {
                return Ok(current);
            }

            let chunks = self.context.chunk(&current, chunk_size);
            debug!(round, chunks = chunks.len(), "Summarization round");

            let mut summaries = Vec::with_capacity(chunks.len());
            for (i, chunk) in chunks.iter().enumerate() {
                let summary = self
                    .summarize_chunk(chunk, i + 1, chunks.len())
                    .await
                    .map_err(|source| SummarizeError::Chunk {
                        index: i + 1,
                        total: chunks.len(),
                        source,
                    })?;
                summaries.push(summary);
            }
            current = summaries.join("\n\n");
        }

        if self.context.tokenizer().count(&current) <= limit {
            Ok(current)
        } else {
            Err(SummarizeError::NotConverging { rounds: MAX_SUMMARY_ROUNDS, limit })
        }
    }

    async fn summarize_chunk(&self, chunk: &str, index: usize, total: usize) -> Result<String, LlmError> {
        let messages = vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(prompt::summary_prompt(index, total, chunk)),
        ];
        let request = ChatRequest::new(&self.model, messages, TEMPERATURE);
        let reply = self.backend.complete(&request).await?;
        Ok(reply.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Tokenizer, MIDDLE_EXTRACTION_MARKER};
    use crate::llm::Role;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replies from a fixed script, recording every request
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.requests.lock().push(request.clone());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyChoices))
        }
    }

    /// Replies computed from the request
    struct FnBackend<F>(F);

    #[async_trait]
    impl<F> ChatBackend for FnBackend<F>
    where
        F: Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync,
    {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            (self.0)(request)
        }
    }

    fn is_summary_request(request: &ChatRequest) -> bool {
        request.messages[0].content == SUMMARY_SYSTEM_PROMPT
    }

    fn engine(backend: Arc<dyn ChatBackend>, max_tokens: usize) -> CategorizationEngine {
        let tokenizer = Arc::new(Tokenizer::for_encoding("cl100k_base").unwrap());
        let registry = Arc::new(CategoryRegistry::new(vec![
            "Personal".to_string(),
            "Work".to_string(),
            "Work/Projects".to_string(),
        ]));
        CategorizationEngine::new(backend, ContextManager::new(tokenizer, max_tokens), registry, "test-model")
    }

    const VALID: &str = r#"{"category": "Work", "title": "Q3 Plan", "confidence_score": 0.9}"#;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string())]);
        let result = engine(backend.clone(), 4096).categorize("Quarterly planning notes").await.unwrap();

        assert_eq!(result.category, "Work");
        assert_eq!(result.title, "Q3 Plan");

        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].messages.len(), 2);
        assert!(requests[0].messages[0].content.contains("Personal, Work, Work/Projects, Misc"));
        assert_eq!(requests[0].messages[1].content, "Document text snippet:\nQuarterly planning notes");
    }

    #[tokio::test]
    async fn test_retry_injects_feedback() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"category": "Gardening", "title": "T", "confidence_score": 0.9}"#.to_string()),
            Ok(VALID.to_string()),
        ]);
        let result = engine(backend.clone(), 4096).categorize("notes").await.unwrap();
        assert_eq!(result.category, "Work");

        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 2);
        let retry = &requests[1].messages;
        assert_eq!(retry.len(), 4);
        assert_eq!(retry[2].role, Role::Assistant);
        assert!(retry[3].content.contains("Gardening"));
        assert_eq!(retry[..2], requests[0].messages[..]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_fallback_with_error() {
        let backend = ScriptedBackend::new(vec![
            Ok("not json".to_string()),
            Err(LlmError::Status { status: 500, body: "boom".to_string() }),
            Ok(r#"{"category": "Work", "title": "T", "confidence_score": 0}"#.to_string()),
        ]);
        let err = engine(backend.clone(), 4096).categorize("notes").await.unwrap_err();

        assert_eq!(backend.requests.lock().len(), MAX_ATTEMPTS);
        let CategorizeError::RetriesExhausted { attempts, fallback, last_error } = err;
        assert_eq!(attempts, MAX_ATTEMPTS);
        assert_eq!(fallback.category, "Misc");
        assert_eq!(fallback.title, FALLBACK_TITLE);
        assert_eq!(fallback.confidence_score, 0.0);
        assert!(matches!(last_error, AttemptError::Validation(ValidationError::Confidence(_))));
    }

    #[tokio::test]
    async fn test_summarize_within_limit_is_unchanged() {
        let backend = ScriptedBackend::new(Vec::new());
        let engine = engine(backend.clone(), 4096);
        let text = "A short receipt for coffee.";

        assert_eq!(engine.summarize(text, 100).await.unwrap(), text);
        assert!(backend.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_long_document_is_summarized() {
        let summary_calls = Arc::new(Mutex::new(0usize));
        let calls = summary_calls.clone();
        let backend = Arc::new(FnBackend(move |request: &ChatRequest| {
            if is_summary_request(request) {
                *calls.lock() += 1;
                Ok("  budget meeting recap  ".to_string())
            } else {
                assert!(request.messages[1].content.contains("budget meeting recap"));
                Ok(VALID.to_string())
            }
        }));

        // content budget 120 tokens, chunks of 96
        let engine = engine(backend, 200);
        let text = "word ".repeat(400);
        let result = engine.categorize(&text).await.unwrap();

        assert_eq!(result.category, "Work");
        assert!(*summary_calls.lock() >= 4);
    }

    #[tokio::test]
    async fn test_summarize_gives_up_after_max_rounds() {
        let summary_calls = Arc::new(Mutex::new(0usize));
        let calls = summary_calls.clone();
        // Echoing the whole prompt never shrinks the text
        let backend = Arc::new(FnBackend(move |request: &ChatRequest| {
            *calls.lock() += 1;
            Ok(request.messages[1].content.clone())
        }));

        let engine = engine(backend, 200);
        let err = engine.summarize(&"word ".repeat(300), 120).await.unwrap_err();

        assert!(matches!(err, SummarizeError::NotConverging { rounds: MAX_SUMMARY_ROUNDS, .. }));
        assert!(*summary_calls.lock() >= MAX_SUMMARY_ROUNDS);
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_middle_extraction() {
        let backend = Arc::new(FnBackend(|request: &ChatRequest| {
            if is_summary_request(request) {
                Err(LlmError::Http("connection refused".to_string()))
            } else {
                assert!(request.messages[1].content.contains(MIDDLE_EXTRACTION_MARKER));
                Ok(VALID.to_string())
            }
        }));

        let engine = engine(backend, 200);
        let result = engine.categorize(&"word ".repeat(400)).await.unwrap();
        assert_eq!(result.title, "Q3 Plan");
    }
}
