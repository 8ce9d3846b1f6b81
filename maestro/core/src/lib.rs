//! Maestro Core - Streaming Composition Sessions
//!
//! This crate runs interactive music-composition sessions. A client sends a
//! natural-language prompt, a language model answers with a stream of note
//! records (optionally preceded by reasoning), and the session keeps the
//! resulting composition so later prompts can refine it.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       Client (browser)                         │
//! │          ClientMessage (up)        ServerMessage (down)        │
//! └──────────────────────────────┬─────────────────────────────────┘
//!                                │ WebSocket /ws/compose
//! ┌──────────────────────────────┼─────────────────────────────────┐
//! │                        MAESTRO CORE                            │
//! │  ┌───────────────────────────┴──────────────────────────────┐  │
//! │  │                 Conductor (per connection)               │  │
//! │  │  ┌────────────┐  ┌──────────────────┐  ┌──────────────┐  │  │
//! │  │  │  Session   │  │ RequestExecution │  │   Backend    │  │  │
//! │  │  │  (notes)   │  │ (one in flight)  │  │   (LLM)      │  │  │
//! │  │  └────────────┘  └────────┬─────────┘  └──────────────┘  │  │
//! │  │                           │ TagSplitter                  │  │
//! │  │                    thinking / chunk / done               │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: Per-connection control loop, single flight
//! - [`RequestExecution`]: One generation with cancellation and deadlines
//! - [`TagSplitter`]: Separates `<think>` reasoning from content
//! - [`ConnectionSession`]: The composition a connection has built so far
//! - [`ClientMessage`] / [`ServerMessage`]: The wire protocol
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use maestro_core::{BackendRegistry, ClientMessage, ComposeRequest, Conductor, ConductorConfig};
//! use tokio::sync::mpsc;
//!
//! let (out_tx, mut out_rx) = mpsc::channel(64);
//! let (in_tx, in_rx) = mpsc::channel(64);
//!
//! let backends = Arc::new(BackendRegistry::from_config(&Default::default()));
//! let conductor = Conductor::new(ConductorConfig::default(), backends, Arc::new(out_tx));
//! tokio::spawn(conductor.run(in_rx));
//!
//! in_tx.send(ClientMessage::Compose(ComposeRequest::new("slow ambient pads"))).await?;
//! while let Some(msg) = out_rx.recv().await {
//!     println!("{}", serde_json::to_string(&msg)?);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: LLM backend abstraction (OpenRouter, Ollama)
//! - [`catalog`]: Instrument banks the model composes for
//! - [`conductor`]: Per-connection lifecycle
//! - [`config`]: TOML and environment configuration
//! - [`execution`]: One in-flight generation
//! - [`messages`]: Wire protocol
//! - [`notes`]: Note-record parsing
//! - [`prompts`]: System and refinement prompts
//! - [`security`]: Input validation
//! - [`session`]: Per-connection composition state
//! - [`streaming`]: Thinking/content splitting
//! - [`transport`]: Outbound sinks and the WebSocket server

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod catalog;
pub mod conductor;
pub mod config;
pub mod error;
pub mod execution;
pub mod messages;
pub mod notes;
pub mod prompts;
pub mod security;
pub mod session;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use backend::{BackendError, BackendRegistry, LlmBackend, LlmRequest, ModelInfo, StreamingToken};
pub use catalog::{CatalogKey, InstrumentBank};
pub use conductor::{Conductor, ConductorConfig};
pub use config::{ConfigError, ConfigOverrides, MaestroConfig};
pub use error::ComposeError;
pub use execution::{ExecutionReport, ExecutionTimeouts, Outcome, RequestExecution};
pub use messages::{ClientMessage, ComposeRequest, RequestId, ServerMessage};
pub use notes::{NoteEvent, ParsedComposition};
pub use session::{CompositionMode, ConnectionSession};
pub use streaming::{Segment, SegmentKind, TagSplitter};
pub use transport::{EventSink, TransportError};
