//! Prompt templates and the per-file conversation

use crate::llm::ChatMessage;

/// Sampling temperature for classification and summarization
pub const TEMPERATURE: f32 = 0.1;

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a concise summarization assistant. Provide a brief but information-dense summary.";

const FEEDBACK_ACK: &str = "Previous attempt failed validation.";

/// System prompt listing the allowed categories
pub fn system_prompt(categories: &[String]) -> String {
    format!(
        "You are an intelligent file organization assistant. Analyze the document text and return a SINGLE JSON object.\n\
         Required format: {{\"category\": \"Specific_Category_Name\", \"title\": \"Clean_Filename_No_Ext\", \"confidence_score\": 0.0-1.0}}\n\
         Strictly choose category from: {}\n\
         Nested paths like \"Parent/Child\" are valid if they exist in the list above.\n\
         Required confidence_score: a float between 0.0 and 1.0.\n\
         Do NOT return extra fields. Do NOT return markdown. Do NOT return extra text.",
        categories.join(", ")
    )
}

pub fn user_prompt(text: &str) -> String {
    format!("Document text snippet:\n{}", text)
}

/// User prompt for one part of a map-reduce summary. `index` is 1-based.
pub fn summary_prompt(index: usize, total: usize, chunk: &str) -> String {
    format!(
        "Summarize the following document part ({}/{}). Keep key technical details, names, and core topics relevant for categorization:\n\n{}",
        index, total, chunk
    )
}

fn correction_prompt(last_error: &str) -> String {
    format!(
        "Your previous response was invalid: {}. Please provide a strictly valid JSON object following the schema.",
        last_error
    )
}

/// Messages for one classification attempt.
///
/// The base pair (system + user) never changes across retries; a retry only
/// appends feedback about the previous failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    base: Vec<ChatMessage>,
    feedback: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            base: vec![ChatMessage::system(system), ChatMessage::user(user)],
            feedback: Vec::new(),
        }
    }

    /// History for the next attempt, carrying only the most recent failure
    pub fn with_feedback(&self, last_error: &str) -> Self {
        Self {
            base: self.base.clone(),
            feedback: vec![
                ChatMessage::assistant(FEEDBACK_ACK),
                ChatMessage::user(correction_prompt(last_error)),
            ],
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.base.iter().chain(self.feedback.iter()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.feedback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
