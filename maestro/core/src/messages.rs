//! Wire Messages
//!
//! JSON records exchanged with a client over the compose channel, tagged by
//! their `type` field.
//!
//! # Flow
//!
//! ```text
//! client                        server
//!   │ compose ───────────────────▶ │
//!   │ ◀─────────────────── start   │
//!   │ ◀──────── thinking / chunk   │  (any number, in order)
//!   │ ◀──── done|cancelled|error   │  (exactly one)
//! ```
//!
//! `ping`, `cancel` and `reset` may arrive at any time.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogKey;

/// Client-chosen identifier of one compose request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random ID
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// First eight characters, for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        self.0
            .char_indices()
            .nth(8)
            .map_or(self.0.as_str(), |(end, _)| &self.0[..end])
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Body of a `compose` message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRequest {
    /// Request ID (generated when absent)
    #[serde(default = "RequestId::generate")]
    pub id: RequestId,
    /// Natural-language description of the music
    #[serde(default)]
    pub prompt: String,
    /// Model identifier; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider name (`openrouter`, `ollama`); the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Output token budget; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Add to the existing composition instead of replacing it
    #[serde(default)]
    pub refine: bool,
    /// Bank key, `"auto"` or absent to let the model choose
    #[serde(default, alias = "bankId", skip_serializing_if = "Option::is_none")]
    pub catalog_key: Option<String>,
}

impl ComposeRequest {
    /// Request with defaults for everything but the prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate(),
            prompt: prompt.into(),
            model: None,
            provider: None,
            max_tokens: None,
            refine: false,
            catalog_key: None,
        }
    }

    /// Set the request ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set provider and model
    #[must_use]
    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }

    /// Set the token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Mark as a refinement turn
    #[must_use]
    pub fn refining(mut self) -> Self {
        self.refine = true;
        self
    }

    /// Pin a bank
    #[must_use]
    pub fn with_catalog(mut self, key: impl Into<String>) -> Self {
        self.catalog_key = Some(key.into());
        self
    }
}

/// Messages from client to server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a composition, replacing any in flight
    Compose(ComposeRequest),
    /// Stop the active composition
    Cancel,
    /// Forget the session's composition
    #[serde(alias = "clear_session")]
    Reset,
    /// Keepalive
    Ping,
}

/// Messages from server to client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A compose request was accepted
    Start {
        /// Request ID
        id: RequestId,
    },
    /// Content text
    Chunk {
        /// Request ID
        id: RequestId,
        /// Text fragment
        data: String,
    },
    /// Reasoning text
    Thinking {
        /// Request ID
        id: RequestId,
        /// Text fragment
        data: String,
    },
    /// Generation finished
    Done {
        /// Request ID
        id: RequestId,
        /// Bank the composition uses, when one is known
        #[serde(rename = "catalogKey", skip_serializing_if = "Option::is_none", default)]
        catalog_key: Option<CatalogKey>,
    },
    /// Generation stopped on request
    Cancelled {
        /// Request ID
        id: RequestId,
    },
    /// Request failed; `id` is absent when the message itself was unreadable
    Error {
        /// Request ID
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<RequestId>,
        /// User-facing text
        message: String,
    },
    /// Keepalive answer
    Pong,
    /// Session was reset
    SessionCleared,
}

impl ServerMessage {
    /// Whether this ends a request
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Cancelled { .. } | Self::Error { id: Some(_), .. }
        )
    }

    /// Request this message belongs to
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Start { id }
            | Self::Chunk { id, .. }
            | Self::Thinking { id, .. }
            | Self::Done { id, .. }
            | Self::Cancelled { id } => Some(id),
            Self::Error { id, .. } => id.as_ref(),
            Self::Pong | Self::SessionCleared => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_compose_defaults() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "compose", "prompt": "lofi beat"})).unwrap();
        let ClientMessage::Compose(req) = msg else {
            panic!("expected compose");
        };
        assert_eq!(req.prompt, "lofi beat");
        assert_eq!(req.model, None);
        assert_eq!(req.provider, None);
        assert_eq!(req.max_tokens, None);
        assert!(!req.refine);
        assert_eq!(req.catalog_key, None);
        assert_eq!(req.id.0.len(), 36);
    }

    #[test]
    fn test_compose_full_and_bank_alias() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "compose",
            "id": "req-1",
            "prompt": "x",
            "model": "llama3.2",
            "provider": "ollama",
            "maxTokens": 2048,
            "refine": true,
            "bankId": "retro"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Compose(ComposeRequest {
                id: RequestId::from("req-1"),
                prompt: "x".into(),
                model: Some("llama3.2".into()),
                provider: Some("ollama".into()),
                max_tokens: Some(2048),
                refine: true,
                catalog_key: Some("retro".into()),
            })
        );
    }

    #[test]
    fn test_control_messages() {
        let parse = |v| serde_json::from_value::<ClientMessage>(v).unwrap();
        assert_eq!(parse(json!({"type": "cancel"})), ClientMessage::Cancel);
        assert_eq!(parse(json!({"type": "reset"})), ClientMessage::Reset);
        assert_eq!(parse(json!({"type": "clear_session"})), ClientMessage::Reset);
        assert_eq!(parse(json!({"type": "ping"})), ClientMessage::Ping);
        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "dance"})).is_err());
    }

    #[test]
    fn test_server_message_shapes() {
        let id = RequestId::from("r1");
        let cases = [
            (ServerMessage::Start { id: id.clone() }, json!({"type": "start", "id": "r1"})),
            (
                ServerMessage::Thinking { id: id.clone(), data: "hm".into() },
                json!({"type": "thinking", "id": "r1", "data": "hm"}),
            ),
            (
                ServerMessage::Done { id: id.clone(), catalog_key: Some(CatalogKey::Retro) },
                json!({"type": "done", "id": "r1", "catalogKey": "retro"}),
            ),
            (
                ServerMessage::Done { id: id.clone(), catalog_key: None },
                json!({"type": "done", "id": "r1"}),
            ),
            (
                ServerMessage::Error { id: None, message: "Invalid message.".into() },
                json!({"type": "error", "message": "Invalid message."}),
            ),
            (ServerMessage::Pong, json!({"type": "pong"})),
            (ServerMessage::SessionCleared, json!({"type": "session_cleared"})),
        ];
        for (msg, expected) in cases {
            assert_eq!(serde_json::to_value(&msg).unwrap(), expected);
        }
    }

    #[test]
    fn test_short_id() {
        assert_eq!(RequestId::from("0123456789abcdef").short(), "01234567");
        assert_eq!(RequestId::from("abc").short(), "abc");
    }

    #[test]
    fn test_terminal_classification() {
        let id = RequestId::from("r");
        assert!(ServerMessage::Cancelled { id: id.clone() }.is_terminal());
        assert!(!ServerMessage::Chunk { id: id.clone(), data: "x".into() }.is_terminal());
        assert!(!ServerMessage::Error { id: None, message: String::new() }.is_terminal());
        assert_eq!(ServerMessage::Pong.request_id(), None);
    }
}
