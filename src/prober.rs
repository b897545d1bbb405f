//! Keep-alive prober.
//!
//! Wakes every `probe_interval`, pings connections that have been quiet for
//! `idle_threshold` and evicts those still silent at the eviction deadline
//! with a ping outstanding. It never touches a socket: pings go through the send queue
//! and eviction cancels the connection's own tasks.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ProbeAction;
use crate::context::{Bridge, EvictReason};
use crate::error::Error;
use crate::protocol::Frame;

/// Outcome of one prober tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Pings that made it into a send queue.
    pub pinged: usize,
    pub evicted: usize,
}

/// Drives the keep-alive state machine of every registered connection.
#[derive(Debug, Clone)]
pub struct Prober {
    bridge: Arc<Bridge>,
}

impl Prober {
    #[must_use]
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// Run one probe pass at `now`.
    pub fn tick(&self, now: Instant) -> ProbeReport {
        let keep_alive = self.bridge.config().keep_alive;
        let mut report = ProbeReport::default();

        for conn in self.bridge.registry().snapshot() {
            match conn.probe(now, &keep_alive) {
                ProbeAction::Idle => {}
                ProbeAction::Ping => {
                    match conn.enqueue(Frame::ping("")) {
                        Ok(()) => {
                            report.pinged += 1;
                            self.bridge.stats().ping_sent();
                        }
                        // still counted as missed by probe()
                        Err(e) => debug!(conn_id = %conn.id(), error = %e, "ping not queued"),
                    }
                }
                ProbeAction::Evict { missed } => {
                    let err = Error::PeerUnresponsive { missed };
                    warn!(conn_id = %conn.id(), peer = ?conn.peer(), error = %err, "evicting");
                    if self
                        .bridge
                        .evict(conn.id(), EvictReason::PeerUnresponsive)
                        .is_some()
                    {
                        report.evicted += 1;
                    }
                }
            }
        }
        report
    }

    /// Tick on a fixed period until `cancel` fires. The first tick happens
    /// one period after the call.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.bridge.config().keep_alive.probe_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "prober started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    now = interval.tick() => {
                        let report = self.tick(now);
                        if report != ProbeReport::default() {
                            debug!(pinged = report.pinged, evicted = report.evicted, "probe pass");
                        }
                    }
                }
            }
            debug!("prober stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, KeepAlive};
    use crate::connection::ConnectionState;
    use crate::protocol::FrameKind;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn bridge(keep_alive: KeepAlive) -> Arc<Bridge> {
        Arc::new(Bridge::new(Config::default().with_keep_alive(keep_alive)).unwrap())
    }

    fn pings(rx: &mut mpsc::Receiver<Frame>) -> usize {
        let mut n = 0;
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame.kind(), FrameKind::Ping);
            n += 1;
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_evicted_within_window() {
        let bridge = bridge(KeepAlive::new(5, 5, 2));
        let (conn, mut rx) = bridge.open_connection(None).unwrap();
        let cancel = CancellationToken::new();
        let handle = Prober::new(Arc::clone(&bridge)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert!(bridge.registry().find(conn.id()).is_some());
        assert_eq!(pings(&mut rx), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(bridge.registry().find(conn.id()).is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(bridge.stats().snapshot().evictions, 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_opened_between_ticks_evicted_within_window() {
        let bridge = bridge(KeepAlive::new(5, 5, 2));
        let cancel = CancellationToken::new();
        let handle = Prober::new(Arc::clone(&bridge)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let (conn, mut rx) = bridge.open_connection(None).unwrap();

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert!(bridge.registry().find(conn.id()).is_some());
        assert_eq!(pings(&mut rx), 1);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(bridge.registry().find(conn.id()).is_none());
        assert_eq!(bridge.stats().snapshot().evictions, 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_responsive_peer_never_evicted() {
        let bridge = bridge(KeepAlive::new(5, 5, 2));
        let (conn, mut rx) = bridge.open_connection(None).unwrap();
        let prober = Prober::new(Arc::clone(&bridge));
        let start = Instant::now();

        for step in 1..=20u64 {
            let now = start + Duration::from_secs(step * 5);
            prober.tick(now);
            if pings(&mut rx) > 0 {
                conn.mark_alive(now);
            }
        }
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(bridge.registry().find(conn.id()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_peer_is_not_pinged() {
        let bridge = bridge(KeepAlive::new(10, 5, 3));
        let (conn, mut rx) = bridge.open_connection(None).unwrap();
        let prober = Prober::new(Arc::clone(&bridge));
        let start = Instant::now();

        conn.mark_alive(start + Duration::from_secs(4));
        assert_eq!(prober.tick(start + Duration::from_secs(5)), ProbeReport::default());
        assert_eq!(pings(&mut rx), 0);

        let report = prober.tick(start + Duration::from_secs(14));
        assert_eq!(report, ProbeReport { pinged: 1, evicted: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_still_counts_missed_ping() {
        let config = Config::default()
            .with_keep_alive(KeepAlive::new(1, 1, 2))
            .with_send_queue_capacity(1);
        let bridge = Arc::new(Bridge::new(config).unwrap());
        let (conn, _rx) = bridge.open_connection(None).unwrap();
        conn.enqueue(Frame::text("clog")).unwrap();

        let prober = Prober::new(Arc::clone(&bridge));
        let start = Instant::now();
        let report = prober.tick(start + Duration::from_secs(1));
        assert_eq!(report, ProbeReport::default());
        assert_eq!(conn.missed_pings(), 1);
        assert_eq!(conn.state(), ConnectionState::PingOutstanding);
        assert_eq!(bridge.stats().snapshot().pings_sent, 0);

        let report = prober.tick(start + Duration::from_secs(2));
        assert_eq!(report, ProbeReport { pinged: 0, evicted: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_then_timeout_removes_once() {
        let bridge = bridge(KeepAlive::new(1, 1, 1));
        let (conn, _rx) = bridge.open_connection(None).unwrap();
        let prober = Prober::new(Arc::clone(&bridge));
        let start = Instant::now();
        prober.tick(start + Duration::from_secs(1));

        assert!(bridge.evict(conn.id(), EvictReason::CloseFrame).is_some());
        let report = prober.tick(start + Duration::from_secs(2));
        assert_eq!(report.evicted, 0);
        assert_eq!(bridge.stats().snapshot().closed, 1);
    }
}
