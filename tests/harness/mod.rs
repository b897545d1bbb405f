//! Test harness for end-to-end bridge tests.
//!
//! [`TestServer`] runs a real [`wsterm::Server`] on an ephemeral port and
//! [`TestClient`] speaks just enough browser-side WebSocket to drive it.

#![allow(dead_code)]

mod client;
mod server;

pub use client::TestClient;
pub use server::{Echo, TestServer};
