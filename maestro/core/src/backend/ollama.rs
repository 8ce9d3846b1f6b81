//! Ollama Backend Implementation
//!
//! LLM backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/chat` - Chat completions, streamed as newline-delimited JSON
//! - `/api/tags` - List available models
//!
//! Reasoning models report their thoughts in `message.thinking`; those are
//! re-inlined as `<think>` spans so the splitter sees one convention.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::lines::LineBuffer;
use super::reasoning::InlineReasoning;
use super::traits::{BackendError, LlmBackend, LlmRequest, ModelInfo, StreamingToken};

/// Provider name used for registry lookup
pub const OLLAMA_PROVIDER: &str = "ollama";

/// Default Ollama address
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// One NDJSON line of a streaming chat response
#[derive(Debug, Default, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

/// Ollama backend client
#[derive(Clone)]
pub struct OllamaBackend {
    /// Base URL, without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            // No overall timeout: generations are bounded by the execution's deadlines
            http_client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Get chat endpoint URL
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    /// Build the JSON body for a streaming chat request
    fn build_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut options = serde_json::Map::new();
        options.insert("temperature".into(), serde_json::json!(request.temperature));
        if request.max_tokens > 0 {
            options.insert("num_predict".into(), serde_json::json!(request.max_tokens));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": true,
            "options": options,
        });

        // gpt-oss thinks at length unless told otherwise
        let think = request.think.clone().or_else(|| {
            request
                .model
                .to_lowercase()
                .contains("gpt-oss")
                .then(|| "low".to_string())
        });
        if let Some(think) = think {
            body["think"] = serde_json::json!(think);
        }

        body
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

/// Convert one NDJSON line into tokens; returns true once the stream is finished
fn process_line(
    line: &str,
    reasoning: &mut InlineReasoning,
    out: &mut Vec<StreamingToken>,
) -> bool {
    let chunk: ChatChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable Ollama line");
            return false;
        }
    };

    if let Some(error) = chunk.error {
        out.push(StreamingToken::Error(BackendError::Stream(error)));
        return true;
    }

    if let Some(message) = chunk.message {
        let text = reasoning.merge(message.thinking.as_deref(), Some(&message.content));
        if !text.is_empty() {
            out.push(StreamingToken::Token(text));
        }
    }

    if chunk.done {
        if let Some(close) = reasoning.finish() {
            out.push(StreamingToken::Token(close.to_string()));
        }
        out.push(StreamingToken::Complete {
            finish_reason: chunk.done_reason,
        });
        return true;
    }

    false
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        OLLAMA_PROVIDER
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        let (tx, rx) = mpsc::channel(100);

        let response = self
            .http_client
            .post(self.chat_url())
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| BackendError::from_request(OLLAMA_PROVIDER, &e))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(OLLAMA_PROVIDER, status, body));
        }

        let mut stream = Box::pin(response.bytes_stream());

        // Spawn task to process stream
        tokio::spawn(async move {
            let mut lines = LineBuffer::new();
            let mut reasoning = InlineReasoning::new();
            let mut pending = Vec::new();

            loop {
                let chunk = tokio::select! {
                    // Receiver dropped (execution finished or cancelled)
                    () = tx.closed() => return,
                    chunk = stream.next() => chunk,
                };

                let at_end = match chunk {
                    Some(Ok(bytes)) => {
                        lines.push(&bytes);
                        false
                    }
                    Some(Err(e)) => {
                        let _ = tx
                            .send(StreamingToken::Error(BackendError::Stream(e.to_string())))
                            .await;
                        return;
                    }
                    None => true,
                };

                while let Some(line) = lines.next_line(at_end) {
                    if line.is_empty() {
                        continue;
                    }

                    let finished = process_line(&line, &mut reasoning, &mut pending);
                    for token in pending.drain(..) {
                        if tx.send(token).await.is_err() {
                            return;
                        }
                    }
                    if finished {
                        return;
                    }
                }

                if at_end {
                    break;
                }
            }

            // Stream ended without done signal
            let _ = tx
                .send(StreamingToken::Error(BackendError::Stream(
                    "stream ended without completion".to_string(),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let response = self
            .http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| BackendError::from_request(OLLAMA_PROVIDER, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(OLLAMA_PROVIDER, status, body));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let models = data
            .get("models")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| {
                        let name = m.get("name")?.as_str()?.to_string();
                        Some(ModelInfo {
                            name,
                            display_name: None,
                            provider: OLLAMA_PROVIDER.to_string(),
                            max_tokens: None,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatMessage;

    fn tokens_for(lines: &[&str]) -> (Vec<StreamingToken>, bool) {
        let mut reasoning = InlineReasoning::new();
        let mut out = Vec::new();
        let mut finished = false;
        for line in lines {
            finished = process_line(line, &mut reasoning, &mut out);
        }
        (out, finished)
    }

    fn text_of(tokens: &[StreamingToken]) -> String {
        tokens
            .iter()
            .filter_map(|t| match t {
                StreamingToken::Token(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_ollama_backend_urls() {
        let backend = OllamaBackend::new("http://example.com:8080/");
        assert_eq!(backend.chat_url(), "http://example.com:8080/api/chat");
        assert_eq!(backend.tags_url(), "http://example.com:8080/api/tags");
    }

    #[test]
    fn test_build_body_sets_options() {
        let backend = OllamaBackend::default();
        let request =
            LlmRequest::new("llama3.2", vec![ChatMessage::user("hi")]).with_max_tokens(256);
        let body = backend.build_body(&request);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("think").is_none());
    }

    #[test]
    fn test_build_body_gpt_oss_thinks_low() {
        let backend = OllamaBackend::default();
        let request = LlmRequest::new("gpt-oss:20b", Vec::new());
        assert_eq!(backend.build_body(&request)["think"], "low");
    }

    #[test]
    fn test_content_lines_and_done() {
        let (tokens, finished) = tokens_for(&[
            r#"{"message":{"role":"assistant","content":"{\"t\":0"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":"}"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#,
        ]);
        assert!(finished);
        assert_eq!(text_of(&tokens), "{\"t\":0}");
        assert!(matches!(
            tokens.last(),
            Some(StreamingToken::Complete { finish_reason: Some(r) }) if r == "stop"
        ));
    }

    #[test]
    fn test_thinking_field_is_inlined() {
        let (tokens, _) = tokens_for(&[
            r#"{"message":{"content":"","thinking":"hmm"},"done":false}"#,
            r#"{"message":{"content":"ok"},"done":false}"#,
        ]);
        assert_eq!(text_of(&tokens), "<think>hmm</think>ok");
    }

    #[test]
    fn test_dangling_thinking_closed_at_done() {
        let (tokens, finished) = tokens_for(&[
            r#"{"message":{"content":"","thinking":"hmm"},"done":false}"#,
            r#"{"done":true}"#,
        ]);
        assert!(finished);
        assert_eq!(text_of(&tokens), "<think>hmm</think>");
    }

    #[test]
    fn test_error_line_terminates() {
        let (tokens, finished) = tokens_for(&[r#"{"error":"model not found"}"#]);
        assert!(finished);
        assert!(matches!(
            &tokens[0],
            StreamingToken::Error(BackendError::Stream(msg)) if msg == "model not found"
        ));
    }
}
