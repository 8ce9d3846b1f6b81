//! Shared fixtures for integration tests
//!
//! `ScriptedBackend` replays a fixed sequence of stream steps per call and
//! records every request it receives. `Harness` runs a `Conductor` on a pair
//! of channels the way the WebSocket transport does.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use maestro_core::backend::{BackendError, BackendRegistry, LlmBackend, LlmRequest, ModelInfo, StreamingToken};
use maestro_core::{ClientMessage, ComposeRequest, Conductor, ConductorConfig, ConnectionSession, ServerMessage};

/// Provider name the scripted backend registers under
pub const SCRIPTED: &str = "scripted";

/// One step of a scripted stream
#[derive(Clone, Debug)]
pub enum Step {
    /// Send a raw fragment
    Token(String),
    /// Sleep before the next step
    Wait(Duration),
    /// Report successful completion
    Complete,
    /// Report a mid-stream failure
    Fail(BackendError),
    /// Drop the sender without a terminal token
    Close,
}

/// Shorthand for a fragment step
pub fn tok(text: &str) -> Step {
    Step::Token(text.to_string())
}

/// A complete note record line
pub fn note_line(t: u64, n: u32, d: u64, i: u8) -> String {
    format!("{{\"t\": {t}, \"n\": {n}, \"v\": 90, \"d\": {d}, \"i\": {i}}}\n")
}

/// Backend that replays scripts
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    fallback: Vec<Step>,
    refuse: Option<BackendError>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    /// Every call replays `script`
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: script,
            refuse: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Calls replay `scripts` in order, then an open stream that never completes
    pub fn sequence(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Every call fails before streaming
    pub fn refusing(err: BackendError) -> Self {
        Self {
            refuse: Some(err),
            ..Self::new(Vec::new())
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    /// Number of streams started
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        SCRIPTED
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn send_streaming(&self, request: &LlmRequest) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        self.requests.lock().push(request.clone());
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for step in script {
                let token = match step {
                    Step::Token(text) => StreamingToken::Token(text),
                    Step::Wait(d) => {
                        tokio::time::sleep(d).await;
                        continue;
                    }
                    Step::Complete => StreamingToken::Complete { finish_reason: Some("stop".into()) },
                    Step::Fail(err) => StreamingToken::Error(err),
                    Step::Close => return,
                };
                if tx.send(token).await.is_err() {
                    return;
                }
            }
            // Stay open like a slow upstream until the consumer lets go
            tx.closed().await;
        });
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        Ok(vec![ModelInfo {
            name: "scripted-model".into(),
            display_name: None,
            provider: SCRIPTED.into(),
            max_tokens: None,
        }])
    }
}

/// Registry holding only `backend`
pub fn registry_with(backend: Arc<ScriptedBackend>) -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(backend);
    Arc::new(registry)
}

/// Conductor settings that route to the scripted backend
pub fn scripted_config() -> ConductorConfig {
    ConductorConfig {
        default_provider: SCRIPTED.into(),
        default_model: "scripted-model".into(),
        ..ConductorConfig::default()
    }
}

/// A conductor running on channels
pub struct Harness {
    inbound: Option<mpsc::Sender<ClientMessage>>,
    outbound: mpsc::Receiver<ServerMessage>,
    task: JoinHandle<ConnectionSession>,
}

impl Harness {
    /// Spawn a conductor over `backend` with the default scripted config
    pub fn start(backend: Arc<ScriptedBackend>) -> Self {
        Self::start_with(backend, scripted_config())
    }

    /// Spawn a conductor over `backend` with `config`
    pub fn start_with(backend: Arc<ScriptedBackend>, config: ConductorConfig) -> Self {
        let (in_tx, in_rx) = mpsc::channel::<ClientMessage>(32);
        let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(256);
        let conductor = Conductor::new(config, registry_with(backend), Arc::new(out_tx));
        let task = tokio::spawn(conductor.run(in_rx));
        Self {
            inbound: Some(in_tx),
            outbound: out_rx,
            task,
        }
    }

    /// Deliver one client message
    pub async fn send(&self, message: ClientMessage) {
        self.inbound
            .as_ref()
            .expect("harness already closed")
            .send(message)
            .await
            .expect("conductor stopped");
    }

    /// Deliver a compose request
    pub async fn compose(&self, request: ComposeRequest) {
        self.send(ClientMessage::Compose(request)).await;
    }

    /// Next outbound message
    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(3600), self.outbound.recv())
            .await
            .expect("no message within an hour")
            .expect("outbound closed")
    }

    /// Messages up to and including the first terminal one
    pub async fn until_terminal(&mut self) -> Vec<ServerMessage> {
        let mut seen = Vec::new();
        loop {
            let msg = self.recv().await;
            let terminal = msg.is_terminal();
            seen.push(msg);
            if terminal {
                return seen;
            }
        }
    }

    /// Drop inbound and wait for the conductor to finish
    pub async fn close(mut self) -> ConnectionSession {
        self.inbound.take();
        self.task.await.expect("conductor panicked")
    }

    /// Drop inbound, wait for the conductor, and return what it sent meanwhile
    pub async fn close_and_drain(mut self) -> (ConnectionSession, Vec<ServerMessage>) {
        self.inbound.take();
        let session = self.task.await.expect("conductor panicked");
        let mut rest = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            rest.push(msg);
        }
        (session, rest)
    }
}

/// Concatenated `chunk` data
pub fn chunk_text(messages: &[ServerMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Chunk { data, .. } => Some(data.as_str()),
            _ => None,
        })
        .collect()
}

/// Concatenated `thinking` data
pub fn thinking_text(messages: &[ServerMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Thinking { data, .. } => Some(data.as_str()),
            _ => None,
        })
        .collect()
}
