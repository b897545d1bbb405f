//! Header checks applied to frames arriving from browser clients.
//!
//! Runs on the header alone so that a bad or oversized frame is refused
//! before its payload is read into memory.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};

/// Validator for inbound (client-to-server) frame headers.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    limits: Limits,
}

impl FrameValidator {
    /// Create a validator enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate a header.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` if the client did not mask the frame
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge` for bad control frames
    /// - `Error::FrameTooLarge` if the payload exceeds `limits.max_frame_size`
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        if header.mask.is_none() {
            return Err(Error::UnmaskedClientFrame);
        }
        if header.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        let len = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if len > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(len));
            }
        }
        self.limits.check_frame_size(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    fn header(opcode: OpCode, masked: bool, len: u64) -> FrameHeader {
        FrameHeader {
            fin: true,
            rsv: 0,
            opcode,
            mask: masked.then_some([1, 2, 3, 4]),
            payload_len: len,
            header_len: 6,
        }
    }

    #[test]
    fn test_rejects_unmasked_client_frame() {
        let validator = FrameValidator::new(Limits::default());
        assert!(matches!(
            validator.validate(&header(OpCode::Text, false, 10)),
            Err(Error::UnmaskedClientFrame)
        ));
    }

    #[test]
    fn test_accepts_masked_frame_at_limit() {
        let validator = FrameValidator::new(Limits::new(64, 1024));
        assert!(validator.validate(&header(OpCode::Text, true, 64)).is_ok());
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let validator = FrameValidator::new(Limits::new(64, 1024));
        assert!(matches!(
            validator.validate(&header(OpCode::Binary, true, 65)),
            Err(Error::FrameTooLarge { size: 65, max: 64 })
        ));
    }

    #[test]
    fn test_rejects_rsv_bits() {
        let validator = FrameValidator::new(Limits::default());
        let mut h = header(OpCode::Text, true, 1);
        h.rsv = 0b001;
        assert!(matches!(validator.validate(&h), Err(Error::ReservedBitsSet)));
    }

    #[test]
    fn test_rejects_bad_control_frames() {
        let validator = FrameValidator::new(Limits::default());
        let mut ping = header(OpCode::Ping, true, 4);
        ping.fin = false;
        assert!(matches!(
            validator.validate(&ping),
            Err(Error::FragmentedControlFrame)
        ));
        assert!(matches!(
            validator.validate(&header(OpCode::Close, true, 200)),
            Err(Error::ControlFrameTooLarge(200))
        ));
    }
}
