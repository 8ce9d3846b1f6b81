//! Conductor - Per-Connection Control Loop
//!
//! The Conductor owns one connection's [`ConnectionSession`] and at most one
//! running [`RequestExecution`]. Every inbound message is handled on this
//! loop, so the session has a single writer.
//!
//! # States
//!
//! ```text
//!            compose (valid)
//!   ┌──────┐ ─────────────────▶ ┌────────┐
//!   │ Idle │                    │ Active │ ── compose: cancel + join, then start again
//!   └──────┘ ◀───────────────── └────────┘
//!     done / cancelled / error / cancel / reset
//! ```
//!
//! # Join discipline
//!
//! A finished execution's parsed output is applied to the session only when
//! the execution has been joined, either because it completed on its own or
//! because a later command cancelled and awaited it. No command ever observes
//! a half-applied session, and the previous execution's terminal message is
//! always sent before the next `start`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendRegistry, LlmBackend, LlmRequest};
use crate::catalog::CatalogKey;
use crate::error::{ComposeError, GENERIC_MESSAGE};
use crate::execution::{ExecutionPlan, ExecutionReport, ExecutionTimeouts, Outcome, RequestExecution};
use crate::messages::{ClientMessage, ComposeRequest, RequestId, ServerMessage};
use crate::prompts;
use crate::security::{ComposeLimits, InputValidator};
use crate::session::{CompositionMode, ConnectionSession};
use crate::transport::EventSink;

/// Model used when a compose request does not name one
pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";

/// Provider used when a compose request does not name one
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Token budget used when a compose request does not give one
pub const DEFAULT_MAX_TOKENS: u64 = 100_000;

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Model for requests that do not name one
    pub default_model: String,
    /// Provider for requests that do not name one
    pub default_provider: String,
    /// Token budget for requests that do not give one
    pub default_max_tokens: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// Input limits
    pub limits: ComposeLimits,
    /// Execution deadlines
    pub timeouts: ExecutionTimeouts,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            default_provider: DEFAULT_PROVIDER.to_string(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.9,
            limits: ComposeLimits::default(),
            timeouts: ExecutionTimeouts::default(),
        }
    }
}

/// The running execution and what is needed to stop and join it
struct ActiveExecution {
    id: RequestId,
    token: CancellationToken,
    handle: JoinHandle<ExecutionReport>,
}

impl Drop for ActiveExecution {
    fn drop(&mut self) {
        // A conductor dropped mid-flight must not leave the task generating
        self.token.cancel();
    }
}

/// Per-connection session lifecycle manager
pub struct Conductor {
    config: ConductorConfig,
    backends: Arc<BackendRegistry>,
    sink: Arc<dyn EventSink>,
    validator: InputValidator,
    session: ConnectionSession,
    active: Option<ActiveExecution>,
}

impl Conductor {
    /// Create a conductor that reports to `sink`
    pub fn new(config: ConductorConfig, backends: Arc<BackendRegistry>, sink: Arc<dyn EventSink>) -> Self {
        let validator = InputValidator::new(config.limits.clone());
        Self {
            config,
            backends,
            sink,
            validator,
            session: ConnectionSession::new(),
            active: None,
        }
    }

    /// Session state
    #[must_use]
    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Whether an execution is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Serve inbound messages until the channel closes, then shut down
    ///
    /// Returns the final session state.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<ClientMessage>) -> ConnectionSession {
        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                joined = wait_for(&mut self.active) => {
                    if let Some(active) = self.active.take() {
                        self.finish(&active.id, joined).await;
                    }
                }
            }
        }

        self.shutdown().await;
        self.session
    }

    /// Handle one inbound message
    pub async fn handle_message(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Compose(request) => self.compose(request).await,
            ClientMessage::Cancel => self.cancel_active().await,
            ClientMessage::Reset => {
                self.cancel_active().await;
                self.session.reset();
                tracing::info!("Session cleared");
                self.send(ServerMessage::SessionCleared).await;
            }
            ClientMessage::Ping => self.send(ServerMessage::Pong).await,
        }
    }

    /// Start a composition, replacing the running one
    async fn compose(&mut self, request: ComposeRequest) {
        self.cancel_active().await;

        let id = request.id.clone();
        match self.prepare(request) {
            Ok((plan, backend)) => {
                tracing::info!(
                    req = %id.short(),
                    mode = plan.mode.as_str(),
                    bank = plan.catalog.map_or("auto", CatalogKey::as_str),
                    model = %plan.request.model,
                    "Compose accepted"
                );
                self.send(ServerMessage::Start { id: id.clone() }).await;

                let token = CancellationToken::new();
                let execution = RequestExecution::new(plan, token.clone(), self.config.timeouts);
                let handle = tokio::spawn(execution.run(backend, Arc::clone(&self.sink)));
                self.active = Some(ActiveExecution { id, token, handle });
            }
            Err(err) => {
                tracing::info!(req = %id.short(), error = %err, "Compose rejected");
                self.send(ServerMessage::Error {
                    id: Some(id),
                    message: err.user_message(),
                })
                .await;
            }
        }
    }

    /// Validate a request and resolve everything the execution needs
    fn prepare(
        &mut self,
        request: ComposeRequest,
    ) -> Result<(ExecutionPlan, Arc<dyn LlmBackend>), ComposeError> {
        let id = request.id;
        let prompt = self.validator.validate_prompt(&request.prompt)?;

        let provider = request
            .provider
            .unwrap_or_else(|| self.config.default_provider.clone());
        let backend = self
            .backends
            .get(&provider)
            .ok_or_else(|| ComposeError::Validation(format!("Unknown provider: {provider}")))?;

        let model = request
            .model
            .unwrap_or_else(|| self.config.default_model.clone());
        let max_tokens = self
            .validator
            .clamp_max_tokens(request.max_tokens.unwrap_or(self.config.default_max_tokens));

        let (mode, catalog, messages) = if request.refine && self.session.can_refine() {
            let catalog = self.session.catalog();
            let messages = prompts::refine_messages(
                self.session.original_prompt().unwrap_or_default(),
                &prompt,
                catalog.unwrap_or(CatalogKey::DEFAULT),
                self.session.end_time_ms(),
            );
            (CompositionMode::Refine, catalog, messages)
        } else {
            let catalog = request.catalog_key.as_deref().and_then(CatalogKey::parse);
            let messages = prompts::fresh_messages(&prompt, catalog);
            self.session.begin_fresh(prompt, catalog);
            (CompositionMode::Fresh, catalog, messages)
        };

        let plan = ExecutionPlan {
            id,
            request: LlmRequest::new(model, messages)
                .with_max_tokens(max_tokens)
                .with_temperature(self.config.temperature),
            mode,
            catalog,
        };
        Ok((plan, backend))
    }

    /// Cancel the running execution, if any, and wait for it to finish
    ///
    /// Idempotent: does nothing while idle.
    pub async fn cancel_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.token.cancel();
            let joined = (&mut active.handle).await;
            self.finish(&active.id, joined).await;
        }
    }

    /// Wait for the running execution to finish on its own
    pub async fn settle(&mut self) {
        if let Some(mut active) = self.active.take() {
            let joined = (&mut active.handle).await;
            self.finish(&active.id, joined).await;
        }
    }

    /// Apply a joined execution's result to the session
    async fn finish(&mut self, id: &RequestId, joined: Result<ExecutionReport, JoinError>) {
        match joined {
            Ok(report) => {
                if let (Outcome::Done, Some(parsed)) = (&report.outcome, report.parsed) {
                    self.session.apply(report.mode, parsed);
                    tracing::debug!(
                        req = %id.short(),
                        notes = self.session.notes().len(),
                        "Session updated"
                    );
                }
            }
            Err(e) => {
                // The task never sent its terminal message
                tracing::error!(req = %id.short(), error = %e, "Execution task failed");
                self.send(ServerMessage::Error {
                    id: Some(id.clone()),
                    message: GENERIC_MESSAGE.to_string(),
                })
                .await;
            }
        }
    }

    /// Cancel and join before the connection's state is released
    pub async fn shutdown(&mut self) {
        if self.is_active() {
            tracing::debug!("Cancelling active execution on shutdown");
        }
        self.cancel_active().await;
    }

    async fn send(&self, message: ServerMessage) {
        if let Err(e) = self.sink.send(message).await {
            tracing::debug!(error = %e, "Peer gone, message dropped");
        }
    }
}

/// Resolves when the active execution's task ends; never while idle
async fn wait_for(active: &mut Option<ActiveExecution>) -> Result<ExecutionReport, JoinError> {
    match active {
        Some(active) => (&mut active.handle).await,
        None => std::future::pending().await,
    }
}
