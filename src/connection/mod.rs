//! Per-connection record and its keep-alive state machine.
//!
//! A [`Connection`] is created when an upgrade succeeds and lives in the
//! registry until eviction. Its state only moves forward:
//!
//! 1. **Open** - handshake done, peer considered alive
//! 2. **PingOutstanding** - idle past the threshold, pings in flight
//! 3. **Closing** - eviction decided, socket teardown pending
//! 4. **Closed** - removed from the registry

mod state;

pub use state::ConnectionState;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, ConnectionId, ProbeAction};
