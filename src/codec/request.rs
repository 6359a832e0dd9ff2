//! Requests sent by the client.

use bytes::{BufMut, Bytes, BytesMut};

use super::fields::{DecodeError, Fields};
use crate::protocol::{build_request_frame, msg_type};

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Start (or restart) the session.
    Hello {
        magic: [u8; 3],
        version: u16,
        options: u16,
    },
    /// Open a storage object and bind it to a descriptor.
    StorageOpen {
        descriptor: u8,
        flags: u16,
        /// Raw name bytes as sent; not necessarily UTF-8.
        url: Bytes,
    },
    /// Read bytes at an absolute offset.
    StorageGet {
        descriptor: u8,
        offset: u32,
        length: u16,
    },
    /// Write bytes at an absolute offset.
    StoragePut {
        descriptor: u8,
        offset: u32,
        data: Bytes,
    },
    /// Ask for the host's current date and time.
    GetDateTime,
    /// Release a descriptor. Never answered.
    FileClose { descriptor: u8 },
    /// Ask for the text of the last error.
    GetErrorDetails { code: u16, max_length: u8 },
    /// Read block `block_index` of size `block_length`.
    GetBlock {
        descriptor: u8,
        block_index: u32,
        block_length: u16,
    },
    /// Write block `block_index` of size `block_length`.
    PutBlock {
        descriptor: u8,
        block_index: u32,
        block_length: u16,
        data: Bytes,
    },
    /// End the session. Never answered.
    Goodbye,
}

impl Request {
    /// Decode a request from its type byte and body.
    pub fn decode(msg_type: u8, body: Bytes) -> Result<Self, DecodeError> {
        let mut f = Fields::new(msg_type, body);

        let request = match msg_type {
            msg_type::HELLO => Self::Hello {
                magic: f.array::<3>()?,
                version: f.u16()?,
                options: f.u16()?,
            },
            msg_type::STORAGE_OPEN => Self::StorageOpen {
                descriptor: f.u8()?,
                flags: f.u16()?,
                url: f.prefixed()?,
            },
            msg_type::STORAGE_GET => Self::StorageGet {
                descriptor: f.u8()?,
                offset: f.u32()?,
                length: f.u16()?,
            },
            msg_type::STORAGE_PUT => {
                let descriptor = f.u8()?;
                let offset = f.u32()?;
                let length = f.u16()?;
                Self::StoragePut {
                    descriptor,
                    offset,
                    data: f.bytes(length as usize)?,
                }
            }
            msg_type::GET_DATE_TIME => Self::GetDateTime,
            msg_type::FILE_CLOSE => Self::FileClose {
                descriptor: f.u8()?,
            },
            msg_type::GET_ERROR_DETAILS => Self::GetErrorDetails {
                code: f.u16()?,
                max_length: f.u8()?,
            },
            msg_type::STORAGE_GET_BLOCK => Self::GetBlock {
                descriptor: f.u8()?,
                block_index: f.u32()?,
                block_length: f.u16()?,
            },
            msg_type::STORAGE_PUT_BLOCK => {
                let descriptor = f.u8()?;
                let block_index = f.u32()?;
                let block_length = f.u16()?;
                Self::PutBlock {
                    descriptor,
                    block_index,
                    block_length,
                    data: f.bytes(block_length as usize)?,
                }
            }
            msg_type::GOODBYE => Self::Goodbye,
            other => return Err(DecodeError::UnknownType(other)),
        };

        f.finish()?;
        Ok(request)
    }

    /// Message type byte of this request.
    pub fn msg_type(&self) -> u8 {
        match self {
            Self::Hello { .. } => msg_type::HELLO,
            Self::StorageOpen { .. } => msg_type::STORAGE_OPEN,
            Self::StorageGet { .. } => msg_type::STORAGE_GET,
            Self::StoragePut { .. } => msg_type::STORAGE_PUT,
            Self::GetDateTime => msg_type::GET_DATE_TIME,
            Self::FileClose { .. } => msg_type::FILE_CLOSE,
            Self::GetErrorDetails { .. } => msg_type::GET_ERROR_DETAILS,
            Self::GetBlock { .. } => msg_type::STORAGE_GET_BLOCK,
            Self::PutBlock { .. } => msg_type::STORAGE_PUT_BLOCK,
            Self::Goodbye => msg_type::GOODBYE,
        }
    }

    /// Encode the body (everything after the type byte).
    ///
    /// Strings longer than 255 bytes are truncated. The data length of a
    /// `PutBlock` is taken from `block_length`, as on the wire.
    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Self::Hello {
                magic,
                version,
                options,
            } => {
                buf.put_slice(magic);
                buf.put_u16_le(*version);
                buf.put_u16_le(*options);
            }
            Self::StorageOpen {
                descriptor,
                flags,
                url,
            } => {
                let url = &url[..url.len().min(u8::MAX as usize)];
                buf.put_u8(*descriptor);
                buf.put_u16_le(*flags);
                buf.put_u8(url.len() as u8);
                buf.put_slice(url);
            }
            Self::StorageGet {
                descriptor,
                offset,
                length,
            } => {
                buf.put_u8(*descriptor);
                buf.put_u32_le(*offset);
                buf.put_u16_le(*length);
            }
            Self::StoragePut {
                descriptor,
                offset,
                data,
            } => {
                buf.put_u8(*descriptor);
                buf.put_u32_le(*offset);
                buf.put_u16_le(data.len() as u16);
                buf.put_slice(data);
            }
            Self::GetDateTime | Self::Goodbye => {}
            Self::FileClose { descriptor } => buf.put_u8(*descriptor),
            Self::GetErrorDetails { code, max_length } => {
                buf.put_u16_le(*code);
                buf.put_u8(*max_length);
            }
            Self::GetBlock {
                descriptor,
                block_index,
                block_length,
            } => {
                buf.put_u8(*descriptor);
                buf.put_u32_le(*block_index);
                buf.put_u16_le(*block_length);
            }
            Self::PutBlock {
                descriptor,
                block_index,
                block_length,
                data,
            } => {
                buf.put_u8(*descriptor);
                buf.put_u32_le(*block_index);
                buf.put_u16_le(*block_length);
                buf.put_slice(data);
            }
        }

        buf.freeze()
    }

    /// Encode a complete request frame, sentinel included.
    pub fn to_frame(&self) -> Vec<u8> {
        build_request_frame(self.msg_type(), &self.encode_body())
    }
}
