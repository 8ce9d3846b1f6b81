//! Daemon Server Implementation
//!
//! This module provides the accept loop for the maestro daemon:
//! - Accepts TCP connections and upgrades them on `/ws/compose`
//! - Spawns one handler task (and one conductor) per connection
//! - Tracks active connections for limits and statistics
//! - Shuts down gracefully, aborting stragglers after a grace period
//!
//! ```text
//!                     DaemonServer
//!                          │
//!          ┌───────────────┼───────────────┐
//!          │               │               │
//!       Browser         Browser         Browser
//!       (conn-1)        (conn-2)        (conn-3)
//!          │               │               │
//!      Conductor       Conductor       Conductor
//! ```
//!
//! Connections share nothing but the read-only backend registry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use maestro_core::transport::websocket::{serve_connection, ConnectionContext};
use maestro_core::{BackendRegistry, MaestroConfig};

/// How long open connections get to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Unique identifier for one client connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Allocate a new random ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state tracking
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Remote address
    peer: SocketAddr,
}

/// The main daemon server
pub struct DaemonServer {
    /// Loaded configuration
    config: MaestroConfig,
    /// Active connections
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl DaemonServer {
    /// Create a new daemon server
    pub fn new(config: MaestroConfig) -> Self {
        Self {
            config,
            connection_states: Arc::new(DashMap::new()),
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let bind = &self.config.server.bind_address;
        TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind to {bind}"))
    }

    /// Accept connections until `shutdown` fires, then drain
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener.local_addr().context("Listener has no local address")?;
        info!(%addr, "Listening for connections");

        let backends = Arc::new(BackendRegistry::from_config(&self.config.backends));
        info!(providers = ?backends.providers(), "Backends configured");
        tokio::spawn({
            let backends = Arc::clone(&backends);
            async move {
                for health in backends.health().await {
                    if health.healthy {
                        info!(provider = %health.provider, "Provider reachable");
                    } else {
                        warn!(provider = %health.provider, "Provider unreachable, requests to it will fail");
                    }
                }
            }
        });

        let ctx = ConnectionContext::new(
            self.config.conductor.clone(),
            backends,
            self.config.server.max_message_size,
        );
        let max_connections = self.config.server.max_connections;
        let mut tasks = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            // Reap finished handlers
            while tasks.try_join_next().is_some() {}

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            };

            if self.connection_states.len() >= max_connections {
                warn!(%peer, max_connections, "Connection limit reached, rejecting new connection");
                drop(stream);
                continue;
            }

            let conn_id = ConnectionId::new();
            self.connection_states.insert(
                conn_id,
                ConnectionState {
                    connected_at: Instant::now(),
                    peer,
                },
            );
            info!(
                %conn_id,
                %peer,
                active_connections = self.connection_states.len(),
                "New connection accepted"
            );

            let states = Arc::clone(&self.connection_states);
            let ctx = ctx.clone();
            let token = shutdown.child_token();
            tasks.spawn(
                async move {
                    if let Err(e) = serve_connection(stream, ctx, token).await {
                        debug!(error = %e, "Connection ended before upgrade");
                    }
                    states.remove(&conn_id);
                    info!(active_connections = states.len(), "Connection handler finished");
                }
                .instrument(tracing::info_span!("connection", %conn_id)),
            );
        }

        self.drain(tasks).await;
        info!("Shutdown complete");
        Ok(())
    }

    /// Wait for handlers to finish, then abort the rest
    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        info!(open = tasks.len(), "Waiting for connections to close");
        for (conn_id, stats) in self.connection_stats() {
            debug!(%conn_id, peer = %stats.peer, uptime_secs = stats.uptime_secs, "Draining connection");
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(open = tasks.len(), "Grace period expired, aborting connections");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            self.connection_states.clear();
        }
    }

    /// Get number of active connections
    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }

    /// Get connection statistics
    pub fn connection_stats(&self) -> HashMap<ConnectionId, ConnectionStats> {
        self.connection_states
            .iter()
            .map(|r| {
                let state = r.value();
                (
                    *r.key(),
                    ConnectionStats {
                        peer: state.peer,
                        uptime_secs: state.connected_at.elapsed().as_secs(),
                    },
                )
            })
            .collect()
    }
}

/// Statistics for a single connection
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// Remote address
    pub peer: SocketAddr,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}
