//! Request Execution
//!
//! One in-flight generation. An execution pulls fragments from a backend,
//! classifies them with a [`TagSplitter`], forwards every segment to the
//! connection's sink and, on success, parses the accumulated content.
//!
//! # Termination
//!
//! Every execution sends exactly one terminal message:
//!
//! - `done` when the backend completes
//! - `cancelled` when the token fires (observed before and during each emitted segment
//!   and while waiting for the next fragment)
//! - `error` on a backend failure or an expired deadline
//!
//! Segments already sent before a cancellation stay sent. A send that the
//! peer does not drain is abandoned on cancel or at the hard limit, and the
//! terminal message gets [`TERMINAL_SEND_GRACE`] before it is dropped.
//!
//! # Deadlines
//!
//! ```text
//!  start ──first_event──▶ first fragment ──idle_gap──▶ next fragment ...
//!    └──────────────────────── hard_limit ────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{LlmBackend, LlmRequest, StreamingToken};
use crate::catalog::CatalogKey;
use crate::error::{ComposeError, TimeoutKind};
use crate::messages::{RequestId, ServerMessage};
use crate::notes::{self, ParsedComposition};
use crate::session::CompositionMode;
use crate::streaming::{Segment, SegmentKind, TagSplitter};
use crate::transport::EventSink;

/// How long the terminal message may wait on a peer that is not reading
pub const TERMINAL_SEND_GRACE: Duration = Duration::from_secs(5);

/// Deadlines applied to one execution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionTimeouts {
    /// From start until the first fragment
    pub first_event: Duration,
    /// Between two consecutive fragments
    pub idle_gap: Duration,
    /// For the whole execution
    pub hard_limit: Duration,
}

impl Default for ExecutionTimeouts {
    fn default() -> Self {
        Self {
            first_event: Duration::from_secs(60),
            idle_gap: Duration::from_secs(60),
            hard_limit: Duration::from_secs(300),
        }
    }
}

/// Everything an execution needs to know about its request
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    /// Request ID, echoed in every message
    pub id: RequestId,
    /// Backend request
    pub request: LlmRequest,
    /// Fresh or refine
    pub mode: CompositionMode,
    /// Bank fixed before generation, `None` to let the model choose
    pub catalog: Option<CatalogKey>,
}

/// How an execution ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The backend completed
    Done,
    /// The token fired
    Cancelled,
    /// The backend failed or a deadline expired
    Failed(ComposeError),
}

impl Outcome {
    /// Label for log fields
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// Observations made while running; no effect on behavior
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionMetrics {
    /// Time from start to the first emitted segment
    pub first_event_latency: Option<Duration>,
    /// Time from start to the terminal message
    pub total: Duration,
    /// Segments delivered to the sink
    pub events_sent: usize,
    /// Sends that failed because the peer was gone
    pub failed_sends: usize,
}

/// Result of a finished execution, consumed by whoever joins it
#[derive(Clone, Debug)]
pub struct ExecutionReport {
    /// Request ID
    pub id: RequestId,
    /// Fresh or refine
    pub mode: CompositionMode,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Parsed content, present only for [`Outcome::Done`]
    pub parsed: Option<ParsedComposition>,
    /// Timing and delivery counters
    pub metrics: ExecutionMetrics,
}

/// Why the streaming phase stopped early
enum Stop {
    Cancelled,
    Failed(ComposeError),
}

impl From<ComposeError> for Stop {
    fn from(err: ComposeError) -> Self {
        Self::Failed(err)
    }
}

/// Earlier of a rolling deadline and the hard limit, with the kind that expires
fn earliest(rolling: Instant, kind: TimeoutKind, hard: Instant) -> (Instant, TimeoutKind) {
    if hard <= rolling {
        (hard, TimeoutKind::HardLimit)
    } else {
        (rolling, kind)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// One generation attached to a cancellation token
pub struct RequestExecution {
    plan: ExecutionPlan,
    token: CancellationToken,
    timeouts: ExecutionTimeouts,
    splitter: TagSplitter,
    accumulated: String,
    metrics: ExecutionMetrics,
    started: Instant,
}

impl RequestExecution {
    /// Prepare an execution; nothing happens until [`run`](Self::run)
    #[must_use]
    pub fn new(plan: ExecutionPlan, token: CancellationToken, timeouts: ExecutionTimeouts) -> Self {
        Self {
            plan,
            token,
            timeouts,
            splitter: TagSplitter::default(),
            accumulated: String::new(),
            metrics: ExecutionMetrics::default(),
            started: Instant::now(),
        }
    }

    /// Run to a terminal outcome, sending exactly one terminal message
    pub async fn run(mut self, backend: Arc<dyn LlmBackend>, sink: Arc<dyn EventSink>) -> ExecutionReport {
        self.started = Instant::now();
        tracing::debug!(
            req = %self.plan.id.short(),
            provider = backend.name(),
            model = %self.plan.request.model,
            mode = self.plan.mode.as_str(),
            "Execution started"
        );

        let streamed = self.stream(backend.as_ref(), sink.as_ref()).await;

        let (outcome, parsed, terminal) = match streamed {
            Ok(()) => {
                let parsed = notes::parse_composition(&self.accumulated, self.plan.catalog);
                if let Some(key) = parsed.selected_catalog {
                    tracing::info!(req = %self.plan.id.short(), bank = %key, "Model selected bank");
                }
                tracing::info!(req = %self.plan.id.short(), notes = parsed.notes.len(), "Parsed composition");
                let terminal = ServerMessage::Done {
                    id: self.plan.id.clone(),
                    catalog_key: parsed.selected_catalog.or(self.plan.catalog),
                };
                (Outcome::Done, Some(parsed), terminal)
            }
            Err(Stop::Cancelled) => (
                Outcome::Cancelled,
                None,
                ServerMessage::Cancelled {
                    id: self.plan.id.clone(),
                },
            ),
            Err(Stop::Failed(err)) => {
                tracing::warn!(
                    req = %self.plan.id.short(),
                    kind = err.kind(),
                    error = %err,
                    "Execution failed"
                );
                let terminal = ServerMessage::Error {
                    id: Some(self.plan.id.clone()),
                    message: err.user_message(),
                };
                (Outcome::Failed(err), None, terminal)
            }
        };

        match tokio::time::timeout(TERMINAL_SEND_GRACE, sink.send(terminal)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.failed_sends += 1;
                tracing::debug!(req = %self.plan.id.short(), error = %e, "Terminal message not delivered");
            }
            Err(_) => {
                self.metrics.failed_sends += 1;
                tracing::warn!(req = %self.plan.id.short(), "Peer not reading, terminal message dropped");
            }
        }
        self.metrics.total = self.started.elapsed();

        tracing::info!(
            req = %self.plan.id.short(),
            first_event_ms = self.metrics.first_event_latency.map(millis),
            total_ms = millis(self.metrics.total),
            events = self.metrics.events_sent,
            failed_sends = self.metrics.failed_sends,
            outcome = outcome.label(),
            "Execution finished"
        );

        ExecutionReport {
            id: self.plan.id,
            mode: self.plan.mode,
            outcome,
            parsed,
            metrics: self.metrics,
        }
    }

    /// Pull and forward until the backend completes or something stops us
    async fn stream(&mut self, backend: &dyn LlmBackend, sink: &dyn EventSink) -> Result<(), Stop> {
        let hard_deadline = self.started + self.timeouts.hard_limit;
        let mut deadline = earliest(
            self.started + self.timeouts.first_event,
            TimeoutKind::FirstEvent,
            hard_deadline,
        );

        let token = self.token.clone();
        let mut rx = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Stop::Cancelled),
            started = tokio::time::timeout_at(deadline.0, backend.send_streaming(&self.plan.request)) => {
                match started {
                    Err(_) => return Err(Stop::Failed(ComposeError::Timeout(deadline.1))),
                    Ok(rx) => rx.map_err(ComposeError::from)?,
                }
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return Err(Stop::Cancelled),
                next = tokio::time::timeout_at(deadline.0, rx.recv()) => next,
            };

            match next {
                Err(_) => return Err(Stop::Failed(ComposeError::Timeout(deadline.1))),
                Ok(None) => {
                    return Err(Stop::Failed(ComposeError::Upstream(
                        "generation stream closed without completion".to_string(),
                    )));
                }
                Ok(Some(StreamingToken::Token(fragment))) => {
                    deadline = earliest(
                        Instant::now() + self.timeouts.idle_gap,
                        TimeoutKind::IdleGap,
                        hard_deadline,
                    );
                    for segment in self.splitter.feed(&fragment) {
                        self.emit(sink, segment, hard_deadline).await?;
                    }
                }
                Ok(Some(StreamingToken::Complete { finish_reason })) => {
                    tracing::debug!(req = %self.plan.id.short(), finish_reason = ?finish_reason, "Backend completed");
                    for segment in self.splitter.flush() {
                        self.emit(sink, segment, hard_deadline).await?;
                    }
                    return Ok(());
                }
                Ok(Some(StreamingToken::Error(err))) => return Err(Stop::Failed(err.into())),
            }
        }
    }

    /// Forward one segment; checks the token first so nothing is sent after a cancel
    async fn emit(&mut self, sink: &dyn EventSink, segment: Segment, hard_deadline: Instant) -> Result<(), Stop> {
        if self.token.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        let id = self.plan.id.clone();
        let message = match segment.kind {
            SegmentKind::Content => {
                self.accumulated.push_str(&segment.text);
                ServerMessage::Chunk { id, data: segment.text }
            }
            SegmentKind::Thinking => ServerMessage::Thinking { id, data: segment.text },
        };

        if self.metrics.first_event_latency.is_none() {
            self.metrics.first_event_latency = Some(self.started.elapsed());
        }

        let token = self.token.clone();
        let sent = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Stop::Cancelled),
            sent = tokio::time::timeout_at(hard_deadline, sink.send(message)) => sent,
        };

        match sent {
            Err(_) => return Err(Stop::Failed(ComposeError::Timeout(TimeoutKind::HardLimit))),
            Ok(Ok(())) => self.metrics.events_sent += 1,
            Ok(Err(e)) => {
                self.metrics.failed_sends += 1;
                tracing::debug!(req = %self.plan.id.short(), error = %e, "Segment not delivered");
            }
        }
        Ok(())
    }
}
