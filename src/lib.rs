//! # wsterm - WebSocket terminal bridge
//!
//! Turns browser WebSocket connections into byte streams for an interactive
//! command shell, and detects and evicts peers that stop answering pings.
//!
//! ## Architecture
//!
//! - Each upgraded socket gets a reader task that routes frames through
//!   [`dispatch::dispatch`] and a writer task fed by a bounded [`SendQueue`].
//! - Terminal input lands in the connection's [`RingRelay`]; the
//!   [`ShellLoop`] drains it into an [`Interpreter`] on a fixed cadence.
//! - The [`Prober`] pings idle connections and evicts unresponsive ones.
//! - Everything shares one explicit [`Bridge`] context.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use wsterm::{Bridge, Config, ConnectionId, Interpreter, Server, StaticAssets};
//!
//! struct Echo;
//!
//! impl Interpreter for Echo {
//!     fn feed(&mut self, input: &[u8]) -> Vec<u8> {
//!         input.to_vec()
//!     }
//! }
//!
//! # async fn run() -> wsterm::Result<()> {
//! let bridge = Arc::new(Bridge::new(Config::default())?);
//! let server = Server::new(bridge, StaticAssets::new().with_index("<html></html>"));
//! let listener = server.bind().await?;
//! let factory = |_: ConnectionId| Box::new(Echo) as Box<dyn Interpreter>;
//! server.run(listener, factory, CancellationToken::new()).await
//! # }
//! ```

pub mod assets;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod prober;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod send_queue;
pub mod server;
pub mod shell;
pub mod stats;

pub use assets::{Asset, AssetStore, StaticAssets};
pub use config::{Config, KeepAlive, Limits};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use context::{Bridge, EvictReason, LifecycleHooks, NoHooks};
pub use error::{Error, Result};
pub use prober::{ProbeReport, Prober};
pub use protocol::{Frame, FrameKind, OpCode};
pub use registry::Registry;
pub use relay::RingRelay;
pub use send_queue::SendQueue;
pub use server::Server;
pub use shell::{Interpreter, InterpreterFactory, ShellLoop};
pub use stats::{BridgeStats, StatsSnapshot};
