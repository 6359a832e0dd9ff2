//! Wire format constants and the request header.
//!
//! Request frames (client to server):
//! ```text
//! ┌──────────┬─────────┬──────────┬────────┬──────────────┐
//! │ Sentinel │ Session │ Length   │ Type   │ Body         │
//! │ 0x8F     │ 0x00    │ u16 LE   │ 1 byte │ Length-1     │
//! └──────────┴─────────┴──────────┴────────┴──────────────┘
//! ```
//!
//! Response frames (server to client) carry only the length prefix:
//! ```text
//! ┌──────────┬────────┬──────────────┐
//! │ Length   │ Type   │ Body         │
//! │ u16 LE   │ 1 byte │ Length-1     │
//! └──────────┴────────┴──────────────┘
//! ```
//!
//! The length always counts every byte after the length field.
//! All multi-byte integers are Little Endian.

use crate::error::{NhacpError, Result};

/// First byte of every client message.
pub const REQUEST_SENTINEL: u8 = 0x8F;

/// The only session identifier this server hands out.
pub const SESSION_ID: u8 = 0x00;

/// Size of the request header after the sentinel (session + length).
pub const REQUEST_HEADER_SIZE: usize = 3;

/// Size of the response length prefix.
pub const RESPONSE_LENGTH_SIZE: usize = 2;

/// Maximum value accepted in a request length field.
pub const MAX_FRAME_LENGTH: u16 = 8192;

/// Maximum payload of a single data transfer.
pub const MAX_DATA_LENGTH: usize = 8192;

/// Maximum length of a length-prefixed string.
pub const MAX_STRING_LENGTH: usize = u8::MAX as usize;

/// Magic carried by HELLO.
pub const PROTOCOL_MAGIC: [u8; 3] = *b"ACP";

/// Highest protocol version this server speaks.
pub const PROTOCOL_VERSION: u16 = 0x0001;

/// Adapter name reported in SESSION-STARTED.
pub const DEFAULT_ADAPTER_NAME: &str = "NABU-ADAPTOR-1.1";

/// Message type bytes.
pub mod msg_type {
    pub const HELLO: u8 = 0x00;
    pub const STORAGE_OPEN: u8 = 0x01;
    pub const STORAGE_GET: u8 = 0x02;
    pub const STORAGE_PUT: u8 = 0x03;
    pub const GET_DATE_TIME: u8 = 0x04;
    pub const FILE_CLOSE: u8 = 0x05;
    pub const GET_ERROR_DETAILS: u8 = 0x06;
    pub const STORAGE_GET_BLOCK: u8 = 0x07;
    pub const STORAGE_PUT_BLOCK: u8 = 0x08;
    pub const GOODBYE: u8 = 0xEF;

    pub const SESSION_STARTED: u8 = 0x80;
    pub const OK: u8 = 0x81;
    pub const ERROR: u8 = 0x82;
    pub const STORAGE_LOADED: u8 = 0x83;
    pub const DATA_BUFFER: u8 = 0x84;
    pub const DATE_TIME: u8 = 0x85;

    /// Human-readable name for logging.
    pub fn name(msg_type: u8) -> &'static str {
        match msg_type {
            HELLO => "HELLO",
            STORAGE_OPEN => "STORAGE-OPEN",
            STORAGE_GET => "STORAGE-GET",
            STORAGE_PUT => "STORAGE-PUT",
            GET_DATE_TIME => "GET-DATE-TIME",
            FILE_CLOSE => "FILE-CLOSE",
            GET_ERROR_DETAILS => "GET-ERROR-DETAILS",
            STORAGE_GET_BLOCK => "STORAGE-GET-BLOCK",
            STORAGE_PUT_BLOCK => "STORAGE-PUT-BLOCK",
            GOODBYE => "GOODBYE",
            SESSION_STARTED => "SESSION-STARTED",
            OK => "OK",
            ERROR => "ERROR",
            STORAGE_LOADED => "STORAGE-LOADED",
            DATA_BUFFER => "DATA-BUFFER",
            DATE_TIME => "DATE-TIME",
            _ => "UNKNOWN",
        }
    }
}

/// STORAGE-OPEN flag constants.
pub mod open_flags {
    /// Bits selecting the access mode.
    pub const ACCESS_MASK: u16 = 0b0000_0111;
    /// Access mode: read only.
    pub const READ_ONLY: u16 = 0x0000;
    /// Access mode: read and write.
    pub const READ_WRITE: u16 = 0x0001;
    /// Create the file if it does not exist.
    pub const CREATE: u16 = 0x0008;
    /// With `CREATE`, fail if the file already exists.
    pub const EXCLUSIVE: u16 = 0x0010;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u16, flag: u16) -> bool {
        flags & flag != 0
    }

    /// Check if the access mode requests writing.
    #[inline]
    pub fn is_read_write(flags: u16) -> bool {
        flags & ACCESS_MASK == READ_WRITE
    }
}

/// Request header fields that follow the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Session identifier (always 0 here).
    pub session: u8,
    /// Bytes following the length field (type byte + body).
    pub length: u16,
}

impl RequestHeader {
    /// Create a new header.
    pub fn new(session: u8, length: u16) -> Self {
        Self { session, length }
    }

    /// Encode header to bytes, sentinel not included.
    pub fn encode(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let [lo, hi] = self.length.to_le_bytes();
        [self.session, lo, hi]
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use nhacp_server::protocol::RequestHeader;
    ///
    /// let header = RequestHeader::decode(&[0x00, 0x08, 0x00]).unwrap();
    /// assert_eq!(header.session, 0);
    /// assert_eq!(header.length, 8);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < REQUEST_HEADER_SIZE {
            return None;
        }
        Some(Self {
            session: buf[0],
            length: u16::from_le_bytes([buf[1], buf[2]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Session is the single supported session
    /// - Length covers at least the type byte
    /// - Length doesn't exceed max
    pub fn validate(&self, max_length: u16) -> Result<()> {
        if self.session != SESSION_ID {
            return Err(NhacpError::Protocol(format!(
                "Unknown session {:#04x}",
                self.session
            )));
        }

        if self.length == 0 {
            return Err(NhacpError::Protocol(
                "Length 0 leaves no room for a message type".to_string(),
            ));
        }

        if self.length > max_length {
            return Err(NhacpError::Protocol(format!(
                "Frame length {} exceeds maximum {}",
                self.length, max_length
            )));
        }

        Ok(())
    }

    /// Number of body bytes after the type byte.
    #[inline]
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(1)
    }
}
