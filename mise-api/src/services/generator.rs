//! Generative text collaborator

use async_trait::async_trait;
use thiserror::Error;

/// Why a generation attempt produced no text
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generative service not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Unexpected response: {0}")]
    BadResponse(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Network(e.to_string())
        }
    }
}

/// Something that turns a prompt into text
///
/// Output is untrusted; callers parse and validate it.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, GenerationError>;
}
