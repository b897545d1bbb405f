//! Per-connection liveness state machine.

/// Lifecycle and liveness state of a bridged connection.
///
/// ```text
/// Open --(idle >= threshold)--> PingOutstanding --(missed >= max)--> Closing --> Closed
///  ^                                   |
///  +---------------- Pong -------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Upgraded and considered alive.
    #[default]
    Open,
    /// At least one ping has gone unanswered.
    PingOutstanding,
    /// Eviction requested; the socket is being shut down.
    Closing,
    /// Removed from the registry. Terminal.
    Closed,
}

impl ConnectionState {
    /// `Open` or `PingOutstanding`: the shell still serves this connection.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::PingOutstanding)
    }

    /// Whether outbound frames may still be queued.
    ///
    /// `Closing` still permits the close acknowledgment itself.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::PingOutstanding => write!(f, "PingOutstanding"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
