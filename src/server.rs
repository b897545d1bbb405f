//! TCP front end: accept loop, upgrade path and per-connection reader task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assets::{self, AssetStore, HttpResponse};
use crate::codec::{FrameReader, FrameWriter};
use crate::config::Limits;
use crate::connection::Connection;
use crate::context::{Bridge, EvictReason};
use crate::dispatch::{Dispatched, dispatch};
use crate::error::{Error, Result};
use crate::prober::Prober;
use crate::protocol::{Frame, HandshakeRequest, HandshakeResponse, HttpRequest, find_head_end};
use crate::send_queue::spawn_writer;
use crate::shell::{InterpreterFactory, ShellLoop};

/// Close status for framing violations.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// The terminal bridge server.
pub struct Server {
    bridge: Arc<Bridge>,
    assets: Arc<dyn AssetStore>,
}

impl Server {
    #[must_use]
    pub fn new(bridge: Arc<Bridge>, assets: impl AssetStore + 'static) -> Self {
        Self {
            bridge,
            assets: Arc::new(assets),
        }
    }

    #[must_use]
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Bind the configured listen address.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.bridge.config().bind_addr).await?;
        Ok(listener)
    }

    /// Serve until `cancel` fires, then close every connection and stop the
    /// prober and shell loop.
    ///
    /// # Errors
    ///
    /// Only fails if the listener's local address cannot be read.
    pub async fn run(
        self,
        listener: TcpListener,
        interpreters: impl InterpreterFactory + 'static,
        cancel: CancellationToken,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        let workers = cancel.child_token();
        let prober = Prober::new(Arc::clone(&self.bridge)).spawn(workers.clone());
        let shell = ShellLoop::new(Arc::clone(&self.bridge), interpreters).spawn(workers.clone());
        info!(%addr, ws_path = %self.bridge.config().ws_path, "terminal bridge listening");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("accept loop cancelled");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let bridge = Arc::clone(&self.bridge);
                        let assets = Arc::clone(&self.assets);
                        tokio::spawn(async move {
                            if let Err(e) = handle_socket(bridge, assets, stream, peer).await {
                                debug!(%peer, error = %e, "socket ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        let closed = self.bridge.shutdown();
        workers.cancel();
        let _ = prober.await;
        let _ = shell.await;
        let stats = self.bridge.stats().snapshot();
        info!(
            closed,
            opened = stats.opened,
            rejected = stats.rejected,
            bytes_relayed = stats.bytes_relayed,
            payloads_dropped = stats.payloads_dropped,
            evictions = stats.evictions,
            "terminal bridge stopped"
        );
        Ok(())
    }
}

/// Read one HTTP request head. Returns the head and any bytes after it.
async fn read_request_head<S>(stream: &mut S, limits: &Limits) -> Result<(Vec<u8>, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&buf) {
            limits.check_handshake_size(end)?;
            let rest = buf.split_off(end);
            return Ok((buf.to_vec(), rest.to_vec()));
        }
        limits.check_handshake_size(buf.len())?;
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed before request head".into(),
            ));
        }
    }
}

async fn reply<S>(stream: &mut S, resp: &HttpResponse, include_body: bool) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&resp.to_bytes(include_body)).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Handle one accepted socket from request head to eviction.
async fn handle_socket(
    bridge: Arc<Bridge>,
    assets: Arc<dyn AssetStore>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let config = bridge.config();
    let limits = config.limits;

    let head = tokio::time::timeout(
        config.handshake_timeout(),
        read_request_head(&mut stream, &limits),
    )
    .await
    .map_err(|_| Error::InvalidHandshake("timed out waiting for request".into()))?;
    let (head, leftover) = match head {
        Ok(parts) => parts,
        Err(e @ Error::HandshakeTooLarge { .. }) => {
            let _ = reply(&mut stream, &HttpResponse::bad_request(&e.to_string()), true).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let req = match HttpRequest::parse(&head) {
        Ok(req) => req,
        Err(e) => {
            let _ = reply(&mut stream, &HttpResponse::bad_request(&e.to_string()), true).await;
            return Err(e);
        }
    };

    if req.path != config.ws_path || !req.is_websocket_upgrade() {
        debug!(%peer, method = %req.method, path = %req.path, "plain http request");
        let resp = assets::respond(assets.as_ref(), &req);
        return reply(&mut stream, &resp, req.method != "HEAD").await;
    }

    let handshake = match HandshakeRequest::from_http(&req) {
        Ok(hs) => hs,
        Err(e) => {
            warn!(%peer, error = %e, "rejected upgrade");
            let _ = reply(&mut stream, &HttpResponse::bad_request(&e.to_string()), true).await;
            return Err(e);
        }
    };

    let (conn, rx) = match bridge.open_connection(Some(peer)) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = reply(&mut stream, &HttpResponse::unavailable(), true).await;
            return Err(e);
        }
    };
    let id = conn.id();

    if let Err(e) = stream
        .write_all(&HandshakeResponse::from_request(&handshake).to_bytes())
        .await
    {
        bridge.evict(id, EvictReason::PeerGone);
        return Err(e.into());
    }
    let _ = stream.set_nodelay(true);

    let (read_half, write_half) = stream.into_split();
    let writer = spawn_writer(
        Arc::clone(&bridge),
        id,
        rx,
        FrameWriter::new(write_half),
        conn.cancel_token().clone(),
    );

    let mut reader = FrameReader::new(read_half, limits);
    reader.prefill(&leftover);
    let reason = read_loop(&bridge, &conn, &mut reader).await;
    bridge.evict(id, reason);
    let _ = writer.await;
    Ok(())
}

/// Feed frames to the dispatcher until the peer leaves, misbehaves, or the
/// connection is evicted elsewhere.
async fn read_loop<R>(bridge: &Bridge, conn: &Connection, reader: &mut FrameReader<R>) -> EvictReason
where
    R: AsyncRead + Unpin,
{
    let cancel = conn.cancel_token().clone();
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return EvictReason::Shutdown,
            next = reader.read_frame() => next,
        };

        match next {
            Ok(None) => return EvictReason::PeerGone,
            Ok(Some(frame)) => match dispatch(bridge, conn, frame) {
                Ok(Dispatched::Closed) => return EvictReason::CloseFrame,
                Ok(_) => {}
                Err(e) if !e.is_fatal_to_connection() => {
                    debug!(conn_id = %conn.id(), error = %e, "frame not delivered");
                }
                Err(e) => {
                    debug!(conn_id = %conn.id(), error = %e, "send queue gone");
                    return EvictReason::PeerGone;
                }
            },
            Err(e) if !e.is_fatal_to_connection() => {
                warn!(conn_id = %conn.id(), error = %e, "frame skipped");
            }
            Err(Error::Io(msg)) => {
                debug!(conn_id = %conn.id(), error = %msg, "read failed");
                return EvictReason::PeerGone;
            }
            Err(e) => {
                warn!(conn_id = %conn.id(), error = %e, "protocol error");
                let _ = conn.enqueue(Frame::close(Some(CLOSE_PROTOCOL_ERROR), ""));
                return EvictReason::ProtocolError;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_request_head_keeps_leftover() {
        let mut input: &[u8] = b"GET /ws HTTP/1.1\r\nHost: a\r\n\r\n\x81\x80";
        let (head, rest) = read_request_head(&mut input, &Limits::default())
            .await
            .unwrap();
        assert!(head.ends_with(b"\r\n\r\n"));
        assert_eq!(rest, vec![0x81, 0x80]);
    }

    #[tokio::test]
    async fn test_read_request_head_enforces_limit() {
        let big = format!("GET / HTTP/1.1\r\nX: {}\r\n\r\n", "a".repeat(300));
        let mut input = big.as_bytes();
        assert!(matches!(
            read_request_head(&mut input, &Limits::new(1024, 128)).await,
            Err(Error::HandshakeTooLarge { max: 128, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_request_head_eof() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\n";
        assert!(matches!(
            read_request_head(&mut input, &Limits::default()).await,
            Err(Error::InvalidHandshake(_))
        ));
    }
}
