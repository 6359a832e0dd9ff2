//! Bounds-checked field reader shared by request and response decoding.

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::protocol::msg_type;

/// Why a frame body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body ended before a fixed field.
    #[error("{} body truncated: needed {needed} bytes, {available} available", type_name(.msg_type))]
    Truncated {
        msg_type: u8,
        needed: usize,
        available: usize,
    },

    /// A declared length runs past the end of the body.
    #[error("{} declares {declared} bytes but only {available} remain", type_name(.msg_type))]
    SubLength {
        msg_type: u8,
        declared: usize,
        available: usize,
    },

    /// The body is longer than its message layout.
    #[error("{} body has {extra} unexpected trailing bytes", type_name(.msg_type))]
    TrailingBytes { msg_type: u8, extra: usize },

    /// No message is defined for this type byte.
    #[error("Unknown message type {0:#04x}")]
    UnknownType(u8),
}

fn type_name(msg_type: &u8) -> &'static str {
    msg_type::name(*msg_type)
}

/// Sequential little-endian field reader over a frame body.
pub(crate) struct Fields {
    msg_type: u8,
    buf: Bytes,
}

impl Fields {
    pub(crate) fn new(msg_type: u8, buf: Bytes) -> Self {
        Self { msg_type, buf }
    }

    fn need(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < needed {
            return Err(DecodeError::Truncated {
                msg_type: self.msg_type,
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Take `declared` bytes whose length came from an earlier field.
    pub(crate) fn bytes(&mut self, declared: usize) -> Result<Bytes, DecodeError> {
        if self.buf.remaining() < declared {
            return Err(DecodeError::SubLength {
                msg_type: self.msg_type,
                declared,
                available: self.buf.remaining(),
            });
        }
        Ok(self.buf.split_to(declared))
    }

    /// Length byte followed by that many raw bytes, no terminator.
    pub(crate) fn prefixed(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.u8()? as usize;
        self.bytes(len)
    }

    /// A length-prefixed field read as display text.
    pub(crate) fn string(&mut self) -> Result<String, DecodeError> {
        let raw = self.prefixed()?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Require the body to be fully consumed.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        if self.buf.has_remaining() {
            return Err(DecodeError::TrailingBytes {
                msg_type: self.msg_type,
                extra: self.buf.remaining(),
            });
        }
        Ok(())
    }
}
