//! Generative text backend with external LLM providers (OpenAI/Anthropic/Groq).
//!
//! The rest of the system sees only [`TextGenerator`]: one prompt in, text or
//! `None` out, always bounded by a caller-supplied timeout. No retries.

pub mod backend;
pub mod config;
pub mod providers;
pub mod types;

pub use backend::{GenerationError, LlmBackend, TextGenerator};
pub use config::LLMConfig;
pub use types::*;
