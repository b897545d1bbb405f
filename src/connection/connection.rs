use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::KeepAlive;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::relay::RingRelay;
use crate::send_queue::SendQueue;

/// Opaque connection handle. Allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the prober should do for a connection after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAction {
    /// Nothing due.
    Idle,
    /// Send a ping; `missed_pings` has already been incremented.
    Ping,
    /// Peer exhausted its pings; state is now `Closing`.
    Evict {
        /// Consecutive unanswered pings.
        missed: u32,
    },
}

#[derive(Debug)]
struct Liveness {
    state: ConnectionState,
    last_pong_at: Instant,
    missed_pings: u32,
}

/// One upgraded WebSocket peer.
///
/// Shared between the connection's reader task, its send-queue worker, the
/// prober and the shell loop. Liveness fields change only through the
/// methods below, each of which holds the lock for a single transition.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    relay: RingRelay,
    liveness: Mutex<Liveness>,
    dropped: AtomicU64,
    queue: SendQueue,
    cancel: CancellationToken,
}

impl Connection {
    /// Create a connection in the `Open` state with a fresh ring relay.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        ring_capacity: usize,
        queue: SendQueue,
    ) -> Self {
        Self {
            id,
            peer,
            relay: RingRelay::new(ring_capacity),
            liveness: Mutex::new(Liveness {
                state: ConnectionState::Open,
                last_pong_at: Instant::now(),
                missed_pings: 0,
            }),
            dropped: AtomicU64::new(0),
            queue,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[must_use]
    pub fn relay(&self) -> &RingRelay {
        &self.relay
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.liveness.lock().state
    }

    #[must_use]
    pub fn missed_pings(&self) -> u32 {
        self.liveness.lock().missed_pings
    }

    #[must_use]
    pub fn last_pong_at(&self) -> Instant {
        self.liveness.lock().last_pong_at
    }

    /// Payloads dropped because the ring relay was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Token cancelled when the connection is evicted. Reader and writer
    /// tasks select on it to stop.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a frame for this connection's writer without blocking.
    ///
    /// # Errors
    ///
    /// `Error::SendQueueFull` if the queue is at capacity, or
    /// `Error::ConnectionClosed` if the connection is closed or the writer
    /// has gone away.
    pub fn enqueue(&self, frame: Frame) -> Result<()> {
        if !self.state().can_send() {
            return Err(Error::ConnectionClosed(self.id));
        }
        self.queue.enqueue(frame)
    }

    /// Record a liveness confirmation. Returns `false` if the connection is
    /// already closing, in which case nothing changes.
    pub fn mark_alive(&self, now: Instant) -> bool {
        let mut l = self.liveness.lock();
        if !l.state.is_active() {
            return false;
        }
        l.state = ConnectionState::Open;
        l.missed_pings = 0;
        l.last_pong_at = now;
        true
    }

    /// Move an active connection to `Closing`. Returns `false` if it was
    /// already closing or closed.
    pub fn begin_closing(&self) -> bool {
        let mut l = self.liveness.lock();
        if !l.state.is_active() {
            return false;
        }
        l.state = ConnectionState::Closing;
        true
    }

    /// Terminal transition, performed once by whoever removed the record
    /// from the registry. Stops the connection's tasks.
    pub(crate) fn mark_closed(&self) {
        self.liveness.lock().state = ConnectionState::Closed;
        self.cancel.cancel();
    }

    /// Advance the keep-alive state machine by one prober tick.
    ///
    /// Eviction is measured from the last pong rather than counted in ticks,
    /// so a connection opened between two ticks is not given an extra period.
    pub fn probe(&self, now: Instant, keep_alive: &KeepAlive) -> ProbeAction {
        let mut l = self.liveness.lock();
        let silent = now.saturating_duration_since(l.last_pong_at);
        match l.state {
            ConnectionState::Open => {
                if silent >= keep_alive.idle_threshold() {
                    l.state = ConnectionState::PingOutstanding;
                    l.missed_pings += 1;
                    ProbeAction::Ping
                } else {
                    ProbeAction::Idle
                }
            }
            ConnectionState::PingOutstanding => {
                if l.missed_pings >= keep_alive.max_missed_pings
                    || silent >= keep_alive.eviction_deadline()
                {
                    l.state = ConnectionState::Closing;
                    ProbeAction::Evict {
                        missed: l.missed_pings,
                    }
                } else {
                    l.missed_pings += 1;
                    ProbeAction::Ping
                }
            }
            ConnectionState::Closing | ConnectionState::Closed => ProbeAction::Idle,
        }
    }
}
