//! WebSocket wire protocol (RFC 6455), server side.

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{
    HandshakeRequest, HandshakeResponse, HttpRequest, WS_GUID, compute_accept_key, find_head_end,
};
pub use mask::apply_mask;
pub use opcode::{FrameKind, OpCode};
pub use validation::FrameValidator;
