//! OpenRouter Backend Implementation
//!
//! OpenAI-compatible chat completions with server-sent events. Works against
//! OpenRouter by default and any compatible endpoint via the base URL.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::lines::LineBuffer;
use super::reasoning::InlineReasoning;
use super::traits::{BackendError, LlmBackend, LlmRequest, ModelInfo, StreamingToken};

/// Provider name used for registry lookup
pub const OPENROUTER_PROVIDER: &str = "openrouter";

/// Default OpenRouter API base
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

/// Models advertised when an API key is configured (id, display name)
const CURATED_MODELS: &[(&str, &str)] = &[
    ("google/gemini-3-pro-preview", "Gemini 3 Pro"),
    ("google/gemini-3-flash-preview", "Gemini 3 Flash"),
    ("xiaomi/mimo-v2-flash:free", "Mimo V2 Flash"),
    ("deepseek/deepseek-v3.2", "DeepSeek V3.2"),
];

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

/// What one SSE line meant for the stream
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    /// Keep reading
    Continue,
    /// A finish reason was reported
    Finished(Option<String>),
    /// `data: [DONE]`
    Done,
    /// Provider error mid-stream
    Failed(String),
}

/// OpenRouter (OpenAI-compatible) backend client
#[derive(Clone)]
pub struct OpenRouterBackend {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenRouterBackend {
    /// Create a new backend; without an API key every request is unavailable
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http_client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Whether an API key is configured
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(request: &LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": true,
        });
        if request.max_tokens > 0 {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }
        body
    }
}

/// Interpret one SSE line, appending any text to `out`
fn process_sse_line(line: &str, reasoning: &mut InlineReasoning, out: &mut Vec<String>) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        // Comments (": OPENROUTER PROCESSING"), event names, retry hints
        return SseLine::Continue;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable SSE payload");
            return SseLine::Continue;
        }
    };

    if let Some(error) = chunk.error {
        return SseLine::Failed(error.message);
    }

    let mut finished = None;
    for choice in chunk.choices.into_iter().take(1) {
        if let Some(delta) = choice.delta {
            let text = reasoning.merge(delta.reasoning.as_deref(), delta.content.as_deref());
            if !text.is_empty() {
                out.push(text);
            }
        }
        if choice.finish_reason.is_some() {
            finished = Some(choice.finish_reason);
        }
    }

    match finished {
        Some(reason) => SseLine::Finished(reason),
        None => SseLine::Continue,
    }
}

#[async_trait]
impl LlmBackend for OpenRouterBackend {
    fn name(&self) -> &'static str {
        OPENROUTER_PROVIDER
    }

    async fn health_check(&self) -> bool {
        self.api_key.is_some()
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        let Some(ref api_key) = self.api_key else {
            return Err(BackendError::Unavailable(
                "openrouter API key not configured".to_string(),
            ));
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| BackendError::from_request(OPENROUTER_PROVIDER, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(OPENROUTER_PROVIDER, status, body));
        }

        let (tx, rx) = mpsc::channel(100);
        let mut stream = Box::pin(response.bytes_stream());

        tokio::spawn(async move {
            let mut lines = LineBuffer::new();
            let mut reasoning = InlineReasoning::new();
            let mut texts = Vec::new();
            let mut finish_reason = None;

            loop {
                let chunk = tokio::select! {
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
                    let status = process_sse_line(&line, &mut reasoning, &mut texts);
                    for text in texts.drain(..) {
                        if tx.send(StreamingToken::Token(text)).await.is_err() {
                            return;
                        }
                    }

                    match status {
                        SseLine::Continue => {}
                        SseLine::Finished(reason) => {
                            tracing::info!(reason = ?reason, "openrouter finish reason");
                            finish_reason = reason;
                        }
                        SseLine::Done => {
                            if let Some(close) = reasoning.finish() {
                                let _ = tx.send(StreamingToken::Token(close.to_string())).await;
                            }
                            let _ = tx.send(StreamingToken::Complete { finish_reason }).await;
                            return;
                        }
                        SseLine::Failed(message) => {
                            let _ = tx
                                .send(StreamingToken::Error(BackendError::Stream(message)))
                                .await;
                            return;
                        }
                    }
                }

                if at_end {
                    break;
                }
            }

            // Some compatible servers close without [DONE] after a finish reason
            if finish_reason.is_some() {
                if let Some(close) = reasoning.finish() {
                    let _ = tx.send(StreamingToken::Token(close.to_string())).await;
                }
                let _ = tx.send(StreamingToken::Complete { finish_reason }).await;
            } else {
                let _ = tx
                    .send(StreamingToken::Error(BackendError::Stream(
                        "stream ended without completion".to_string(),
                    )))
                    .await;
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        if self.api_key.is_none() {
            return Ok(Vec::new());
        }

        Ok(CURATED_MODELS
            .iter()
            .map(|(id, name)| ModelInfo {
                name: (*id).to_string(),
                display_name: Some((*name).to_string()),
                provider: OPENROUTER_PROVIDER.to_string(),
                max_tokens: None,
            })
            .collect())
    }
}
