//! Heartbeat message alphabet.

use thiserror::Error;

/// A single message on the heartbeat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Message {
    /// The sender is stopping now; no more messages follow.
    Stopping = 0,
    /// Liveness tick.
    Alive = 1,
}

impl Message {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(Message::Stopping),
            1 => Ok(Message::Alive),
            other => Err(ProtocolError::UnknownByte(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown heartbeat byte {0:#04x}")]
    UnknownByte(u8),
}
