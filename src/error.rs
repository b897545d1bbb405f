//! Error types for the terminal bridge.
//!
//! The bridge never treats an error as process-fatal: the worst outcome of
//! any condition below is the loss of a single connection. Conditions that
//! end a connection all funnel into the registry's idempotent eviction.

use thiserror::Error;

use crate::connection::ConnectionId;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bridging a WebSocket to the shell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Frame payload exceeds the configured maximum. Rejected before buffering.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Ring relay had no room for the payload; the payload was dropped.
    #[error("Ring buffer full: {len} bytes offered, {free} free")]
    BufferFull {
        /// Payload length that was offered.
        len: usize,
        /// Free space at the time of the push.
        free: usize,
    },

    /// Outbound queue for the connection is full; the newest job was rejected.
    #[error("Send queue full for connection {0}")]
    SendQueueFull(ConnectionId),

    /// Peer stopped answering pings.
    #[error("Peer unresponsive after {missed} missed pings")]
    PeerUnresponsive {
        /// Consecutive unanswered pings.
        missed: u32,
    },

    /// Writing a frame to the socket failed.
    #[error("Socket write failed: {0}")]
    SocketWriteFailure(String),

    /// Registry is at `max_connections`.
    #[error("Too many connections (max: {0})")]
    TooManyConnections(usize),

    /// A connection with this id is already registered.
    #[error("Duplicate connection id: {0}")]
    DuplicateConnection(ConnectionId),

    /// Connection is closing or already gone.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake request exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved bits set; no extensions are negotiated.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Unmasked client frame.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Control frame fragmented.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error ends the connection it occurred on.
    ///
    /// Backpressure and oversized-frame conditions leave the connection open;
    /// protocol and socket failures take the eviction path.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        !matches!(
            self,
            Error::FrameTooLarge { .. } | Error::BufferFull { .. } | Error::SendQueueFull(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
