//! The bridge context shared by every task.
//!
//! [`Bridge`] bundles configuration, the connection registry, counters and
//! the open/close hooks. It is built once by the caller and passed around
//! behind an `Arc`; nothing in the crate is process-global.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::registry::Registry;
use crate::send_queue::SendQueue;
use crate::stats::BridgeStats;

/// Close status sent to peers when the server shuts down ("going away").
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Peer sent a Close frame.
    CloseFrame,
    /// Peer missed too many pings.
    PeerUnresponsive,
    /// Writing to the socket failed.
    SocketWriteFailure,
    /// Peer violated the framing rules.
    ProtocolError,
    /// Socket reached end of stream or a read failed.
    PeerGone,
    /// Server is shutting down.
    Shutdown,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CloseFrame => "close frame",
            Self::PeerUnresponsive => "peer unresponsive",
            Self::SocketWriteFailure => "socket write failure",
            Self::ProtocolError => "protocol error",
            Self::PeerGone => "peer gone",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Callbacks fired on the upgrade path. Each runs exactly once per connection.
pub trait LifecycleHooks: Send + Sync {
    fn on_open(&self, _id: ConnectionId, _peer: Option<SocketAddr>) {}

    fn on_close(&self, _id: ConnectionId, _reason: EvictReason) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

/// Shared state for one running bridge.
pub struct Bridge {
    config: Config,
    registry: Registry,
    stats: BridgeStats,
    hooks: Arc<dyn LifecycleHooks>,
    next_id: AtomicU64,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("connections", &self.registry.len())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Build a bridge for a validated `config`.
    ///
    /// # Errors
    ///
    /// `Error::Config` if [`Config::validate`] rejects the configuration.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_hooks(config, Arc::new(NoHooks))
    }

    /// Like [`Bridge::new`], with lifecycle hooks.
    ///
    /// # Errors
    ///
    /// `Error::Config` if [`Config::validate`] rejects the configuration.
    pub fn with_hooks(config: Config, hooks: Arc<dyn LifecycleHooks>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Registry::new(config.max_connections),
            config,
            stats: BridgeStats::new(),
            hooks,
            next_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Create and register a connection for a freshly upgraded socket.
    ///
    /// Returns the record and the receiving end of its send queue, which the
    /// caller hands to the writer task.
    ///
    /// # Errors
    ///
    /// `Error::TooManyConnections` if the registry is full.
    pub fn open_connection(
        &self,
        peer: Option<SocketAddr>,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<Frame>)> {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, rx) = SendQueue::channel(id, self.config.send_queue_capacity);
        let conn = Arc::new(Connection::new(
            id,
            peer,
            self.config.ring_buffer_capacity,
            queue,
        ));

        if let Err(e) = self.registry.add(Arc::clone(&conn)) {
            self.stats.connection_rejected();
            warn!(conn_id = %id, ?peer, error = %e, "connection rejected");
            return Err(e);
        }

        self.stats.connection_opened();
        info!(conn_id = %id, ?peer, active = self.registry.len(), "connection opened");
        self.hooks.on_open(id, peer);
        Ok((conn, rx))
    }

    /// Remove a connection and stop its tasks.
    ///
    /// Safe to call from any task, any number of times: only the first call
    /// for an id has an effect and returns the record.
    pub fn evict(&self, id: ConnectionId, reason: EvictReason) -> Option<Arc<Connection>> {
        let Some(conn) = self.registry.remove(id) else {
            debug!(conn_id = %id, %reason, "already evicted");
            return None;
        };

        conn.begin_closing();
        conn.mark_closed();
        self.stats.connection_closed();
        if reason == EvictReason::PeerUnresponsive {
            self.stats.evicted();
        }
        info!(
            conn_id = %id,
            %reason,
            dropped = conn.dropped(),
            active = self.registry.len(),
            "connection closed"
        );
        self.hooks.on_close(id, reason);
        Some(conn)
    }

    /// Queue a frame for a registered connection.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` if `id` is not registered, otherwise the
    /// errors of [`Connection::enqueue`].
    pub fn enqueue(&self, id: ConnectionId, frame: Frame) -> Result<()> {
        self.registry
            .find(id)
            .ok_or(Error::ConnectionClosed(id))?
            .enqueue(frame)
    }

    /// Say goodbye to every peer and evict them all. Returns how many
    /// connections were closed.
    pub fn shutdown(&self) -> usize {
        let mut closed = 0;
        for conn in self.registry.snapshot() {
            let _ = conn.enqueue(Frame::close(Some(CLOSE_GOING_AWAY), "server shutdown"));
            if self.evict(conn.id(), EvictReason::Shutdown).is_some() {
                closed += 1;
            }
        }
        closed
    }
}
