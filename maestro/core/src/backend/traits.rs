//! LLM Backend Traits
//!
//! Trait definitions for generation backends. The conductor only ever sees a
//! channel of [`StreamingToken`]s, so providers (Ollama, OpenRouter, test
//! doubles) are interchangeable.
//!
//! # Design Philosophy
//!
//! The `LlmBackend` trait provides a common interface for:
//! - Starting a streaming chat completion
//! - Health checking the backend
//! - Listing models the backend can serve
//!
//! Implementations handle provider-specific details (API formats, auth, etc.)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Token stream events from LLM backends
#[derive(Clone, Debug)]
pub enum StreamingToken {
    /// A raw text fragment (may contain inline `<think>` markers)
    Token(String),
    /// Response completed successfully
    Complete {
        /// Provider finish reason, when reported
        finish_reason: Option<String>,
    },
    /// Error occurred during streaming
    Error(BackendError),
}

/// Errors raised by generation backends
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The service could not be reached or refused to serve
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated by the caller if large)
        body: String,
    },

    /// The response stream broke mid-way
    #[error("stream error: {0}")]
    Stream(String),

    /// The response could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether this is the distinguishable "service unavailable" condition
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Classify an error from the HTTP client
    pub(crate) fn from_request(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable(format!("{provider} unreachable: {err}"))
        } else {
            Self::Stream(err.to_string())
        }
    }

    /// Classify a non-success HTTP status
    pub(crate) fn from_status(provider: &str, status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            Self::Unavailable(format!("{provider} returned 503"))
        } else {
            Self::Status {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Role of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions
    System,
    /// User turn
    User,
    /// Assistant turn
    Assistant,
}

/// One message of a chat completion request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking
    pub role: ChatRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Configuration for LLM requests
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Conversation to complete
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens in response (0 = backend default)
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Reasoning effort hint for backends that support one
    pub think: Option<String>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            max_tokens: 0,
            temperature: 0.9,
            think: None,
        }
    }
}

impl LlmRequest {
    /// Create a new request for a model with the given messages
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set reasoning effort
    #[must_use]
    pub fn with_think(mut self, think: impl Into<String>) -> Self {
        self.think = Some(think.into());
        self
    }
}

/// Information about an available model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model identifier
    pub name: String,
    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Provider serving the model
    pub provider: String,
    /// Output token limit, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// LLM Backend trait
///
/// Implement this trait to add support for different LLM providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend name (e.g., "ollama", "openrouter")
    fn name(&self) -> &str;

    /// Check if the backend is healthy and reachable
    async fn health_check(&self) -> bool;

    /// Start a streaming completion
    ///
    /// Returns a channel receiver that will receive fragments as they arrive,
    /// terminated by exactly one `Complete` or `Error`. Dropping the receiver
    /// stops the upstream read.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;
}
