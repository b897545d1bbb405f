//! Per-connection outbound queue and its writer task.
//!
//! Every task that wants to talk to a peer (dispatcher, prober, shell loop)
//! goes through [`SendQueue::enqueue`], which never blocks. A single writer
//! task per connection owns the write half of the socket, so at most one
//! write is in flight per peer.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::FrameWriter;
use crate::connection::ConnectionId;
use crate::context::{Bridge, EvictReason};
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameKind};

/// How long a cancelled writer keeps flushing frames that were already queued.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Sending side of a connection's bounded frame queue.
#[derive(Debug, Clone)]
pub struct SendQueue {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
}

impl SendQueue {
    /// Create a queue holding up to `capacity` frames and its receiving end.
    #[must_use]
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    /// Append a frame without waiting.
    ///
    /// # Errors
    ///
    /// - `Error::SendQueueFull` when the queue is at capacity; the frame is dropped
    /// - `Error::ConnectionClosed` when the writer task has exited
    pub fn enqueue(&self, frame: Frame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::SendQueueFull(self.id),
            TrySendError::Closed(_) => Error::ConnectionClosed(self.id),
        })
    }

    /// Frames that can still be queued right now.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.tx.capacity()
    }
}

/// Write queued frames until a Close frame is written, the queue closes, or
/// `cancel` fires. The write half is shut down on every exit path.
///
/// # Errors
///
/// Returns `Error::SocketWriteFailure` if a write fails.
pub async fn run_writer<W>(
    mut rx: mpsc::Receiver<Frame>,
    mut writer: FrameWriter<W>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let result = loop {
        tokio::select! {
            biased;
            frame = rx.recv() => {
                let Some(frame) = frame else { break Ok(()) };
                if let Err(e) = writer.write_frame(&frame).await {
                    break Err(Error::SocketWriteFailure(e.to_string()));
                }
                if frame.kind() == FrameKind::Close {
                    break Ok(());
                }
            }
            () = cancel.cancelled() => {
                break drain_queued(&mut rx, &mut writer).await;
            }
        }
    };

    rx.close();
    let _ = writer.shutdown().await;
    result
}

async fn drain_queued<W>(rx: &mut mpsc::Receiver<Frame>, writer: &mut FrameWriter<W>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let flush = async {
        while let Ok(frame) = rx.try_recv() {
            writer
                .write_frame(&frame)
                .await
                .map_err(|e| Error::SocketWriteFailure(e.to_string()))?;
            if frame.kind() == FrameKind::Close {
                break;
            }
        }
        Ok::<(), Error>(())
    };
    tokio::time::timeout(DRAIN_GRACE, flush)
        .await
        .unwrap_or(Ok(()))
}

/// Spawn the writer task for `id`. A write failure evicts the connection.
pub fn spawn_writer<W>(
    bridge: Arc<Bridge>,
    id: ConnectionId,
    rx: mpsc::Receiver<Frame>,
    writer: FrameWriter<W>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match run_writer(rx, writer, cancel).await {
            Ok(()) => debug!(conn_id = %id, "writer finished"),
            Err(e) => {
                warn!(conn_id = %id, error = %e, "socket write failed");
                bridge.evict(id, EvictReason::SocketWriteFailure);
            }
        }
    })
}
