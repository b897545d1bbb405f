//! HTTP/1.1 request parsing and the WebSocket upgrade handshake (RFC 6455 Section 4).
//!
//! The server reads one request head per TCP connection. Upgrade requests to
//! the terminal path become WebSocket connections; anything else is answered
//! as plain HTTP by the asset responder.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// GUID appended to the client key when computing `Sec-WebSocket-Accept`.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Headers that must not appear twice in an upgrade request.
const SINGLETON_HEADERS: [&str; 5] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Computes the `Sec-WebSocket-Accept` value: Base64(SHA-1(key + GUID)).
///
/// ```
/// use wsterm::protocol::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Offset just past the `\r\n\r\n` that ends a request head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// A parsed HTTP/1.1 request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target with any query string removed.
    pub path: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Parse a request head (request line plus headers).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the head is not UTF-8, the
    /// request line is malformed, the version is not HTTP/1.1, or a
    /// singleton header is duplicated.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidHandshake(format!(
                "Invalid request line: {request_line}"
            )));
        };
        if version != "HTTP/1.1" {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {version}"
            )));
        }

        let mut headers = HashMap::new();
        for line in lines.take_while(|l| !l.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            if SINGLETON_HEADERS.contains(&name.as_str()) && headers.contains_key(&name) {
                return Err(Error::InvalidHandshake(format!("Duplicate header: {name}")));
            }
            headers.insert(name, value.trim().to_string());
        }

        let path = target.split('?').next().unwrap_or(target).to_string();
        Ok(Self {
            method: method.to_string(),
            path,
            headers,
        })
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the client asked to upgrade to WebSocket.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self.header("connection").is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        self.method == "GET" && upgrade && connection
    }
}

/// A validated WebSocket upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path, e.g. `/ws`.
    pub path: String,
    /// `Host` header.
    pub host: String,
    /// `Sec-WebSocket-Key` header.
    pub key: String,
    /// `Origin` header, if sent.
    pub origin: Option<String>,
}

impl HandshakeRequest {
    /// Build and validate an upgrade request from a parsed HTTP request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the request is not an upgrade,
    /// `Host` is missing or empty, the version is not 13, or the key does
    /// not decode to 16 bytes.
    pub fn from_http(req: &HttpRequest) -> Result<Self> {
        if !req.is_websocket_upgrade() {
            return Err(Error::InvalidHandshake("Not a WebSocket upgrade".into()));
        }

        let host = req
            .header("host")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Missing Host header".into()))?;

        let version = req.header("sec-websocket-version").ok_or_else(|| {
            Error::InvalidHandshake("Missing Sec-WebSocket-Version header".into())
        })?;
        if version != "13" {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {version} (expected 13)"
            )));
        }

        let key = req
            .header("sec-websocket-key")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Key header".into()))?;
        match BASE64.decode(key) {
            Ok(decoded) if decoded.len() == 16 => {}
            Ok(decoded) => {
                return Err(Error::InvalidHandshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    decoded.len()
                )));
            }
            Err(_) => {
                return Err(Error::InvalidHandshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64".into(),
                ));
            }
        }

        Ok(Self {
            path: req.path.clone(),
            host: host.to_string(),
            key: key.to_string(),
            origin: req.header("origin").map(str::to_string),
        })
    }
}

/// The `101 Switching Protocols` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// `Sec-WebSocket-Accept` value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Answer a validated request.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
        }
    }

    /// Serialize the response head.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            self.accept
        )
        .into_bytes()
    }
}
