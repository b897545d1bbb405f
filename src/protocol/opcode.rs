//! Wire opcodes and the bridge-level frame classification.

use crate::error::{Error, Result};

/// WebSocket frame opcode as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation of a fragmented data message (0x0).
    Continuation = 0x0,
    /// Text data (0x1).
    Text = 0x1,
    /// Binary data (0x2).
    Binary = 0x2,
    /// Close (0x8).
    Close = 0x8,
    /// Ping (0x9).
    Ping = 0x9,
    /// Pong (0xA).
    Pong = 0xA,
}

impl OpCode {
    /// Decode the low nibble of the first header byte.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReservedOpcode` for 0x3-0x7 and 0xB-0xF, and
    /// `Error::InvalidOpcode` for anything wider than a nibble.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            0x3..=0x7 | 0xB..=0xF => Err(Error::ReservedOpcode(byte)),
            _ => Err(Error::InvalidOpcode(byte)),
        }
    }

    /// Raw nibble value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong are control opcodes.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// How the bridge treats frames carrying this opcode.
    ///
    /// Terminal input is an untyped byte stream, so every data opcode
    /// (including continuation fragments) is relayed as [`FrameKind::Text`].
    #[must_use]
    pub const fn kind(self) -> FrameKind {
        match self {
            OpCode::Continuation | OpCode::Text | OpCode::Binary => FrameKind::Text,
            OpCode::Close => FrameKind::Close,
            OpCode::Ping => FrameKind::Ping,
            OpCode::Pong => FrameKind::Pong,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
        };
        f.write_str(name)
    }
}

/// Frame classification used by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Terminal bytes destined for the shell.
    Text,
    /// Liveness request from the peer.
    Ping,
    /// Liveness confirmation from the peer.
    Pong,
    /// Peer is closing the connection.
    Close,
}

impl FrameKind {
    /// Opcode used when sending a frame of this kind.
    #[must_use]
    pub const fn opcode(self) -> OpCode {
        match self {
            FrameKind::Text => OpCode::Text,
            FrameKind::Ping => OpCode::Ping,
            FrameKind::Pong => OpCode::Pong,
            FrameKind::Close => OpCode::Close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_u8_valid() {
        assert_eq!(OpCode::from_u8(0x0).unwrap(), OpCode::Continuation);
        assert_eq!(OpCode::from_u8(0x1).unwrap(), OpCode::Text);
        assert_eq!(OpCode::from_u8(0x2).unwrap(), OpCode::Binary);
        assert_eq!(OpCode::from_u8(0x8).unwrap(), OpCode::Close);
        assert_eq!(OpCode::from_u8(0x9).unwrap(), OpCode::Ping);
        assert_eq!(OpCode::from_u8(0xA).unwrap(), OpCode::Pong);
    }

    #[test]
    fn test_opcode_from_u8_reserved() {
        for reserved in [0x3, 0x4, 0x5, 0x6, 0x7, 0xB, 0xC, 0xD, 0xE, 0xF] {
            assert!(matches!(
                OpCode::from_u8(reserved),
                Err(Error::ReservedOpcode(_))
            ));
        }
        assert!(matches!(OpCode::from_u8(0x10), Err(Error::InvalidOpcode(0x10))));
    }

    #[test]
    fn test_data_opcodes_classify_as_text() {
        assert_eq!(OpCode::Text.kind(), FrameKind::Text);
        assert_eq!(OpCode::Binary.kind(), FrameKind::Text);
        assert_eq!(OpCode::Continuation.kind(), FrameKind::Text);
        assert_eq!(OpCode::Ping.kind(), FrameKind::Ping);
        assert_eq!(OpCode::Pong.kind(), FrameKind::Pong);
        assert_eq!(OpCode::Close.kind(), FrameKind::Close);
    }

    #[test]
    fn test_kind_opcode_roundtrip() {
        for kind in [FrameKind::Text, FrameKind::Ping, FrameKind::Pong, FrameKind::Close] {
            assert_eq!(kind.opcode().kind(), kind);
        }
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(OpCode::Text.to_string(), "Text");
        assert_eq!(OpCode::Close.to_string(), "Close");
    }
}
