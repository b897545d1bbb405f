//! Minimal browser-side WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wsterm::error::Error;
use wsterm::protocol::{Frame, compute_accept_key, find_head_end};

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl TestClient {
    /// Connect and complete the upgrade on `/ws`.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET /ws HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await?;

        let mut buf = BytesMut::with_capacity(1024);
        let head = loop {
            if let Some(end) = find_head_end(&buf) {
                break buf.split_to(end);
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
        };
        let head = String::from_utf8_lossy(&head).into_owned();
        if !head.starts_with("HTTP/1.1 101") {
            return Err(std::io::Error::other(head));
        }
        assert!(head.contains(&format!("Sec-WebSocket-Accept: {}", compute_accept_key(KEY))));
        Ok(Self { stream, buf })
    }

    /// Send a raw HTTP request and return the whole response.
    pub async fn http(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    pub async fn send(&mut self, frame: &Frame) -> std::io::Result<()> {
        let mut out = BytesMut::new();
        frame.encode(&mut out, Some(MASK));
        self.stream.write_all(&out).await
    }

    pub async fn send_text(&mut self, text: &str) -> std::io::Result<()> {
        self.send(&Frame::text(text.to_owned())).await
    }

    /// Next frame from the server, or `None` once the server closes the socket.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match Frame::parse(&self.buf) {
                Ok((frame, used)) => {
                    let _ = self.buf.split_to(used);
                    assert_eq!(frame.rsv, 0, "server set reserved bits");
                    assert!(frame.fin, "server fragmented a frame");
                    return Some(frame);
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => panic!("bad frame from server: {e}"),
            }
            let read = tokio::time::timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for server");
            match read {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    /// Collect text frames until their concatenation contains `needle`.
    pub async fn recv_until(&mut self, needle: &str) -> String {
        let mut text = String::new();
        while !text.contains(needle) {
            let frame = self.recv().await.expect("connection closed early");
            text.push_str(&String::from_utf8_lossy(frame.payload()));
        }
        text
    }
}
