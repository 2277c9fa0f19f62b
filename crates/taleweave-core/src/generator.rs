//! The generation port: the narrative engine's only view of the LLM.
//!
//! The core never talks to a model provider directly. It hands an ordered
//! turn history to a [`Generator`] implementation and receives narrative
//! text plus usage counters, or a classified error. Classification drives
//! the retry policy: retryable failures are backed off and retried,
//! fatal ones abort immediately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One prior turn of the story, as fed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// The decided player input that produced the turn.
    pub player_input: String,
    /// The narrative the generator produced for it.
    pub narrative: String,
}

/// Token accounting reported by the model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt (history + system prompt).
    pub prompt_tokens: u32,
    /// Tokens in the generated completion.
    pub completion_tokens: u32,
}

/// A successful generation result.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The generated narrative text.
    pub narrative: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<TokenUsage>,
    /// The model that produced the text, when known.
    pub model_name: Option<String>,
}

/// Errors from the generation capability, classified for retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The attempt exceeded its time budget. Retryable.
    #[error("generation attempt timed out")]
    Timeout,

    /// The provider rate-limited the request. Retryable.
    #[error("rate limited by the model provider")]
    RateLimited,

    /// A transient provider-side failure. Retryable.
    #[error("model provider error: {0}")]
    Provider(String),

    /// Authorization was rejected. Fatal; retrying cannot help.
    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    /// The request itself was invalid. Fatal.
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    /// The provider returned no usable text. Fatal.
    #[error("empty completion from the model")]
    EmptyCompletion,

    /// The retry budget ran out; carries the last attempt's failure.
    #[error("all {attempts} generation attempts failed, last error: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Display of the final attempt's error.
        last: String,
    },
}

impl GenerationError {
    /// Returns true if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Provider(_)
        )
    }
}

/// The abstract generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates the next narrative beat from the system prompt, the
    /// ordered history of prior turns, and the decided next input.
    async fn generate(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        next_input: &str,
    ) -> Result<Generation, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(GenerationError::Timeout.is_retryable());
        assert!(GenerationError::RateLimited.is_retryable());
        assert!(GenerationError::Provider("503".into()).is_retryable());
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!GenerationError::Unauthorized("bad key".into()).is_retryable());
        assert!(!GenerationError::InvalidRequest("too long".into()).is_retryable());
        assert!(!GenerationError::EmptyCompletion.is_retryable());
        assert!(
            !GenerationError::RetriesExhausted {
                attempts: 3,
                last: "timeout".into()
            }
            .is_retryable()
        );
    }
}
