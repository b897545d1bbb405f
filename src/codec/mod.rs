//! Frame-level encoding/decoding over async streams.
//!
//! A TCP stream is split into a read half owned by the connection's reader
//! task and a write half owned by its send-queue worker, so each side gets
//! its own codec type.

mod framed;

pub use framed::{FrameReader, FrameWriter};
