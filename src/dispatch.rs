//! Routing of inbound frames.
//!
//! Runs on the connection's reader task. Every branch is non-blocking: text
//! goes into the ring relay, replies go into the send queue, and eviction is
//! requested from the bridge rather than performed on the socket.

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::context::{Bridge, EvictReason};
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameKind};

/// What [`dispatch`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Payload bytes were appended to the ring relay.
    Relayed(usize),
    /// A pong echoing the ping payload was queued.
    Ponged,
    /// Liveness confirmed.
    Alive,
    /// Close acknowledged and eviction requested. The reader should stop.
    Closed,
}

/// Handle one frame received on `conn`.
///
/// # Errors
///
/// - `Error::FrameTooLarge` if the payload exceeds the configured maximum
/// - `Error::BufferFull` if the ring relay cannot take the whole payload;
///   the payload is dropped and the connection stays open
/// - `Error::SendQueueFull` / `Error::ConnectionClosed` if a pong cannot be queued
pub fn dispatch(bridge: &Bridge, conn: &Connection, frame: Frame) -> Result<Dispatched> {
    bridge
        .config()
        .limits
        .check_frame_size(frame.payload().len())?;

    match frame.kind() {
        FrameKind::Text => {
            let payload = frame.payload();
            if conn.relay().push(payload) {
                bridge.stats().bytes_relayed(payload.len());
                trace!(conn_id = %conn.id(), len = payload.len(), "relayed");
                Ok(Dispatched::Relayed(payload.len()))
            } else {
                let free = conn.relay().free();
                let total = conn.record_drop();
                bridge.stats().payload_dropped();
                warn!(
                    conn_id = %conn.id(),
                    len = payload.len(),
                    free,
                    total_drops = total,
                    "ring relay full, payload dropped"
                );
                Err(Error::BufferFull {
                    len: payload.len(),
                    free,
                })
            }
        }
        FrameKind::Ping => {
            conn.enqueue(Frame::pong(frame.into_payload()))?;
            Ok(Dispatched::Ponged)
        }
        FrameKind::Pong => {
            if conn.mark_alive(Instant::now()) {
                trace!(conn_id = %conn.id(), "pong");
            }
            Ok(Dispatched::Alive)
        }
        FrameKind::Close => {
            debug!(conn_id = %conn.id(), code = ?frame.close_code(), "close frame received");
            conn.begin_closing();
            if let Err(e) = conn.enqueue(Frame::close(None, "")) {
                debug!(conn_id = %conn.id(), error = %e, "close ack not queued");
            }
            bridge.evict(conn.id(), EvictReason::CloseFrame);
            Ok(Dispatched::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Limits};
    use crate::connection::ConnectionState;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn setup(ring: usize) -> (Bridge, Arc<Connection>, mpsc::Receiver<Frame>) {
        let config = Config::default()
            .with_ring_buffer_capacity(ring)
            .with_limits(Limits::new(128, 1024));
        let bridge = Bridge::new(config).unwrap();
        let (conn, rx) = bridge.open_connection(None).unwrap();
        (bridge, conn, rx)
    }

    #[tokio::test]
    async fn test_text_pushed_to_ring() {
        let (bridge, conn, _rx) = setup(64);
        assert_eq!(
            dispatch(&bridge, &conn, Frame::text("ls\r")),
            Ok(Dispatched::Relayed(3))
        );
        assert_eq!(conn.relay().drain(64), b"ls\r");
        assert_eq!(bridge.stats().snapshot().bytes_relayed, 3);
    }

    #[tokio::test]
    async fn test_text_dropped_when_ring_full() {
        let (bridge, conn, _rx) = setup(64);
        let first = vec![b'a'; 40];
        dispatch(&bridge, &conn, Frame::text(first.clone())).unwrap();
        assert_eq!(
            dispatch(&bridge, &conn, Frame::text(vec![b'b'; 30])),
            Err(Error::BufferFull { len: 30, free: 24 })
        );
        assert_eq!(conn.dropped(), 1);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.relay().drain(64), first);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_buffering() {
        let (bridge, conn, _rx) = setup(1024);
        assert_eq!(
            dispatch(&bridge, &conn, Frame::text(vec![0u8; 200])),
            Err(Error::FrameTooLarge { size: 200, max: 128 })
        );
        assert!(conn.relay().is_empty());
    }

    #[tokio::test]
    async fn test_ping_queues_matching_pong() {
        let (bridge, conn, mut rx) = setup(64);
        assert_eq!(
            dispatch(&bridge, &conn, Frame::ping("hb")),
            Ok(Dispatched::Ponged)
        );
        assert_eq!(rx.recv().await.unwrap(), Frame::pong("hb"));
        assert!(conn.relay().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_resets_liveness() {
        let (bridge, conn, _rx) = setup(64);
        let keep_alive = bridge.config().keep_alive;
        tokio::time::advance(keep_alive.idle_threshold()).await;
        conn.probe(Instant::now(), &keep_alive);
        assert_eq!(conn.state(), ConnectionState::PingOutstanding);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(dispatch(&bridge, &conn, Frame::pong("")), Ok(Dispatched::Alive));
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.missed_pings(), 0);
        assert_eq!(conn.last_pong_at(), Instant::now());
    }

    #[tokio::test]
    async fn test_close_acknowledged_and_evicted() {
        let (bridge, conn, mut rx) = setup(64);
        assert_eq!(
            dispatch(&bridge, &conn, Frame::close(Some(1000), "bye")),
            Ok(Dispatched::Closed)
        );
        assert_eq!(rx.recv().await.unwrap(), Frame::close(None, ""));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(bridge.registry().find(conn.id()).is_none());

        // a prober timeout racing the close finds nothing to do
        assert!(bridge.evict(conn.id(), EvictReason::PeerUnresponsive).is_none());
        assert_eq!(bridge.stats().snapshot().closed, 1);
    }
}
