//! Timeout-bounded, single-shot text generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::LLMConfig;
use crate::providers::{self, BoxedStream, StreamChunk};
use crate::types::ChatMessage;

/// Generative text backend contract.
///
/// `None` covers timeout, safety rejection, malformed payload and transport
/// failure alike; the caller decides what it means. Implementations never retry.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Option<String>;
}

/// Why a generation produced no text.
#[derive(Debug, Error, PartialEq)]
pub enum GenerationError {
    #[error("no backend provider configured")]
    Unconfigured,

    #[error("no time allowance left for the call")]
    NoAllowance,

    #[error("generation timed out after {0}ms")]
    Timeout(u64),

    #[error("backend refused the prompt: {0}")]
    Refused(String),

    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    #[error("backend request failed: {0}")]
    Http(String),
}

/// Drain a provider stream into one string, abandoning it at `timeout`.
///
/// Dropping the stream on timeout cancels the in-flight request.
pub async fn collect_within(
    stream: BoxedStream,
    timeout: Duration,
) -> Result<String, GenerationError> {
    let collect = async move {
        let mut stream = stream;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Token(t) => text.push_str(&t),
                StreamChunk::Done { tokens_used } => {
                    debug!("Generation finished: {} tokens", tokens_used);
                    break;
                }
                StreamChunk::Refused(reason) => return Err(GenerationError::Refused(reason)),
                StreamChunk::Malformed(raw) => return Err(GenerationError::Malformed(raw)),
                StreamChunk::Error(e) => return Err(GenerationError::Http(e)),
            }
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::Malformed("empty completion".into()));
        }
        Ok(text)
    };

    match tokio::time::timeout(timeout, collect).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Backend over the configured external provider.
pub struct LlmBackend {
    client: Client,
    config: Arc<RwLock<LLMConfig>>,
}

impl LlmBackend {
    pub fn new(config: Arc<RwLock<LLMConfig>>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Like [`TextGenerator::generate`], but keeps the failure reason.
    pub async fn try_generate(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, GenerationError> {
        if timeout.is_zero() {
            return Err(GenerationError::NoAllowance);
        }

        let (resolved, temperature, max_tokens) = {
            let config = self.config.read();
            (
                config.resolve_provider().ok_or(GenerationError::Unconfigured)?,
                config.temperature,
                config.max_tokens,
            )
        };

        debug!(
            "Generating with {} ({}) within {}ms",
            resolved.provider,
            resolved.model,
            timeout.as_millis()
        );

        let stream = providers::stream_llm(
            &self.client,
            resolved.provider,
            vec![ChatMessage::user(prompt)],
            &resolved.model,
            &resolved.api_key,
            temperature,
            max_tokens,
        );

        collect_within(stream, timeout).await
    }
}

#[async_trait]
impl TextGenerator for LlmBackend {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Option<String> {
        match self.try_generate(prompt, timeout).await {
            Ok(text) => Some(text),
            Err(e @ GenerationError::Timeout(_)) | Err(e @ GenerationError::NoAllowance) => {
                debug!("Generation abandoned: {}", e);
                None
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                None
            }
        }
    }
}
