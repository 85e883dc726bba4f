//! Token encoding using tiktoken-rs.
//!
//! Encodings are selected by name. Unknown encodings and model names fall back
//! to cl100k_base, which is a reasonable proxy for most local instruct models.

use thiserror::Error;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base, CoreBPE};
use tracing::{debug, warn};

/// Encoding used when the requested one cannot be resolved
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Maximum tokens dropped from each edge of a window when decoding fails
const MAX_EDGE_TRIM: usize = 3;

/// A single BPE token id
pub type Token = usize;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Failed to load encoding {name}: {reason}")]
    Encoding { name: String, reason: String },
}

/// BPE tokenizer shared by the context manager and the categorization engine
pub struct Tokenizer {
    bpe: CoreBPE,
    encoding: String,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").field("encoding", &self.encoding).finish()
    }
}

impl Tokenizer {
    /// Build a tokenizer for an encoding name or a model name.
    pub fn for_encoding(name: &str) -> Result<Self, TokenizerError> {
        let by_name = match name {
            "cl100k_base" => Some(cl100k_base()),
            "p50k_base" => Some(p50k_base()),
            "p50k_edit" => Some(p50k_edit()),
            "r50k_base" | "gpt2" => Some(r50k_base()),
            "o200k_base" => Some(o200k_base()),
            _ => None,
        };

        let resolved = match by_name {
            Some(result) => result.ok(),
            None => get_bpe_from_model(name).ok(),
        };

        if let Some(bpe) = resolved {
            debug!(encoding = %name, "Tokenizer loaded");
            return Ok(Self { bpe, encoding: name.to_string() });
        }

        warn!(requested = %name, fallback = DEFAULT_ENCODING, "Unknown encoding, using fallback");
        let bpe = cl100k_base().map_err(|e| TokenizerError::Encoding {
            name: DEFAULT_ENCODING.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { bpe, encoding: DEFAULT_ENCODING.to_string() })
    }

    /// Name of the encoding actually in use
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn encode(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        self.bpe.encode_with_special_tokens(text)
    }

    /// Count tokens in text
    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Decode a token window back to text.
    ///
    /// A window cut out of a longer sequence can start or end in the middle of
    /// a multi-byte character. Up to three tokens are dropped from either edge
    /// until the window decodes; if nothing decodes the result is empty.
    pub fn decode(&self, tokens: &[Token]) -> String {
        if tokens.is_empty() {
            return String::new();
        }

        for trim in 0..=MAX_EDGE_TRIM {
            for head in 0..=trim {
                let tail = trim - head;
                if head + tail >= tokens.len() {
                    continue;
                }
                let window = &tokens[head..tokens.len() - tail];
                if let Ok(text) = self.bpe.decode(window.to_vec()) {
                    return text;
                }
            }
        }

        warn!(tokens = tokens.len(), "Token window could not be decoded");
        String::new()
    }
}
