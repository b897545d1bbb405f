//! Shell poll loop.
//!
//! A single cooperative task that drains each connection's ring relay on a
//! fixed cadence and feeds the bytes to that connection's interpreter. The
//! loop never waits on a socket; interpreter output is handed to the send
//! queue as text frames.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::connection::{Connection, ConnectionId};
use crate::context::Bridge;
use crate::protocol::Frame;

/// A command interpreter attached to one connection.
///
/// The command language is entirely up to the implementation; the bridge
/// only moves bytes in and out.
pub trait Interpreter: Send {
    /// Consume terminal input and return any output to show the user.
    fn feed(&mut self, input: &[u8]) -> Vec<u8>;

    /// Text sent once when the session starts, such as a banner and prompt.
    fn greeting(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// Creates an interpreter for each new connection.
pub trait InterpreterFactory: Send + Sync {
    fn create(&self, id: ConnectionId) -> Box<dyn Interpreter>;
}

impl<F> InterpreterFactory for F
where
    F: Fn(ConnectionId) -> Box<dyn Interpreter> + Send + Sync,
{
    fn create(&self, id: ConnectionId) -> Box<dyn Interpreter> {
        self(id)
    }
}

/// Drains ring relays into per-connection interpreters.
pub struct ShellLoop {
    bridge: Arc<Bridge>,
    factory: Box<dyn InterpreterFactory>,
    sessions: HashMap<ConnectionId, Box<dyn Interpreter>>,
}

impl std::fmt::Debug for ShellLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellLoop")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl ShellLoop {
    #[must_use]
    pub fn new(bridge: Arc<Bridge>, factory: impl InterpreterFactory + 'static) -> Self {
        Self {
            bridge,
            factory: Box::new(factory),
            sessions: HashMap::new(),
        }
    }

    /// Number of interpreters currently alive.
    #[must_use]
    pub fn sessions(&self) -> usize {
        self.sessions.len()
    }

    /// One poll quantum. Returns the number of input bytes consumed.
    pub fn poll_once(&mut self) -> usize {
        let conns = self.bridge.registry().snapshot();
        self.sessions
            .retain(|id, _| conns.iter().any(|c| c.id() == *id));

        let chunk = self.bridge.config().drain_chunk;
        let max_frame = self.bridge.config().limits.max_frame_size;
        let mut consumed = 0;

        for conn in conns {
            if !conn.state().is_active() {
                continue;
            }
            let session = match self.sessions.entry(conn.id()) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    debug!(conn_id = %conn.id(), "shell session started");
                    let mut interp = self.factory.create(conn.id());
                    send_output(&conn, &interp.greeting(), max_frame);
                    e.insert(interp)
                }
            };

            let input = conn.relay().drain(chunk);
            if input.is_empty() {
                continue;
            }
            consumed += input.len();
            trace!(conn_id = %conn.id(), len = input.len(), "feeding interpreter");
            let output = session.feed(&input);
            send_output(&conn, &output, max_frame);
        }
        consumed
    }

    /// Poll every `poll_interval` until `cancel` fires.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.bridge.config().poll_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_ms = period.as_millis() as u64, "shell loop started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.poll_once();
                    }
                }
            }
            debug!("shell loop stopped");
        })
    }
}

/// Queue interpreter output as text frames no larger than `max_frame`.
fn send_output(conn: &Connection, output: &[u8], max_frame: usize) {
    if output.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(output);
    for piece in utf8_chunks(&text, max_frame) {
        if let Err(e) = conn.enqueue(Frame::text(piece.to_owned())) {
            debug!(conn_id = %conn.id(), error = %e, "shell output dropped");
            return;
        }
    }
}

/// Split `text` into pieces of at most `max` bytes without cutting a character.
fn utf8_chunks(text: &str, max: usize) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut end = rest.len().min(max.max(1));
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}
