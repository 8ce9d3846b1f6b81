//! LLM Backend Integration
//!
//! This module provides abstracted access to generation services through a
//! common trait interface. Every backend turns its wire format into a channel
//! of [`StreamingToken`]s carrying inline `<think>` markers.
//!
//! # Available Backends
//!
//! - **OpenRouter**: OpenAI-compatible hosted models (default provider)
//! - **Ollama**: Local LLM server
//!
//! # Usage
//!
//! ```ignore
//! use maestro_core::backend::{ChatMessage, LlmBackend, LlmRequest, OllamaBackend};
//!
//! let backend = OllamaBackend::default();
//! let request = LlmRequest::new("llama3.2", vec![ChatMessage::user("Hello!")]);
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod lines;
mod ollama;
mod openrouter;
mod reasoning;
mod registry;
mod traits;

pub use ollama::{OllamaBackend, DEFAULT_OLLAMA_URL, OLLAMA_PROVIDER};
pub use openrouter::{OpenRouterBackend, DEFAULT_OPENROUTER_URL, OPENROUTER_PROVIDER};
pub use reasoning::InlineReasoning;
pub use registry::{BackendRegistry, ProviderHealth};
pub use traits::{
    BackendError, ChatMessage, ChatRole, LlmBackend, LlmRequest, ModelInfo, StreamingToken,
};
