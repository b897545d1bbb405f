//! Plain HTTP answers for requests that do not upgrade.
//!
//! Known assets are served as-is. Everything else is redirected to `/`,
//! which lets the terminal page double as a captive portal.

use std::collections::HashMap;

use bytes::Bytes;

use crate::protocol::HttpRequest;

/// Body sent with redirects. Some captive-portal probes ignore bodiless 302s.
const REDIRECT_BODY: &str = "Redirect to the captive portal";

/// A static file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub content_type: &'static str,
    pub body: Bytes,
}

impl Asset {
    #[must_use]
    pub fn new(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            body: body.into(),
        }
    }
}

/// Source of the static files served next to the terminal endpoint.
pub trait AssetStore: Send + Sync {
    /// Look up an asset by request path, e.g. `/` or `/xterm.js`.
    fn get(&self, path: &str) -> Option<Asset>;
}

/// In-memory asset table.
#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    files: HashMap<String, Asset>,
}

impl StaticAssets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `body` under `path`, guessing the content type from the extension.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let path = path.into();
        let asset = Asset::new(content_type_for(&path), body);
        self.files.insert(path, asset);
        self
    }

    /// Register the page served at `/`.
    #[must_use]
    pub fn with_index(mut self, html: impl Into<Bytes>) -> Self {
        self.files
            .insert("/".to_string(), Asset::new("text/html", html));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetStore for StaticAssets {
    fn get(&self, path: &str) -> Option<Asset> {
        self.files
            .get(path)
            .or_else(|| (path == "/index.html").then(|| self.files.get("/")).flatten())
            .cloned()
    }
}

fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map_or("", |(_, ext)| ext);
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "js" => "application/javascript",
        "css" => "text/css",
        "ico" => "image/x-icon",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// A complete HTTP/1.1 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.header("Content-Type", content_type)
    }

    /// `302` to `/`.
    #[must_use]
    pub fn redirect_root() -> Self {
        Self::new(302, "Temporary Redirect")
            .header("Location", "/")
            .body("text/plain", REDIRECT_BODY)
    }

    /// `503` sent when no connection slot is free.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(503, "Service Unavailable").body("text/plain", "Too many connections")
    }

    /// `400` with the reason in the body.
    #[must_use]
    pub fn bad_request(reason: &str) -> Self {
        Self::new(400, "Bad Request").body("text/plain", reason.to_string())
    }

    /// `405` for anything but GET and HEAD.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(405, "Method Not Allowed").header("Allow", "GET, HEAD")
    }

    /// Serialize status line, headers and body. The connection is always
    /// closed after a plain HTTP response.
    #[must_use]
    pub fn to_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));
        let mut out = head.into_bytes();
        if include_body {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

/// Answer a non-upgrade request from `store`.
#[must_use]
pub fn respond(store: &dyn AssetStore, req: &HttpRequest) -> HttpResponse {
    if req.method != "GET" && req.method != "HEAD" {
        return HttpResponse::method_not_allowed();
    }
    match store.get(&req.path) {
        Some(asset) => HttpResponse::new(200, "OK").body(asset.content_type, asset.body),
        None => HttpResponse::redirect_root(),
    }
}
