//! Frame struct with typed accessors, plus frame builders.
//!
//! A [`Frame`] is one complete request as read off the link: the header,
//! the message type byte and the body that follows it. The body is held as
//! `bytes::Bytes` so decoding can slice it without copying.
//!
//! # Example
//!
//! ```
//! use nhacp_server::protocol::{msg_type, Frame, RequestHeader};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(RequestHeader::new(0, 1), msg_type::GOODBYE, Bytes::new());
//! assert_eq!(frame.msg_type(), msg_type::GOODBYE);
//! assert!(frame.body().is_empty());
//! ```

use bytes::Bytes;

use super::wire_format::{
    msg_type, RequestHeader, REQUEST_HEADER_SIZE, REQUEST_SENTINEL, RESPONSE_LENGTH_SIZE,
    SESSION_ID,
};

/// A complete request frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: RequestHeader,
    /// Message type byte.
    pub msg_type: u8,
    /// Body bytes after the type byte.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from its parts.
    pub fn new(header: RequestHeader, msg_type: u8, body: Bytes) -> Self {
        Self {
            header,
            msg_type,
            body,
        }
    }

    /// Get the message type.
    #[inline]
    pub fn msg_type(&self) -> u8 {
        self.msg_type
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Name of the message type for logging.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        msg_type::name(self.msg_type)
    }
}

/// Build a response frame: length prefix, type byte, body.
///
/// # Example
///
/// ```
/// use nhacp_server::protocol::{build_frame, msg_type};
///
/// let bytes = build_frame(msg_type::OK, b"");
/// assert_eq!(&bytes[..], &[0x01, 0x00, 0x81]);
/// ```
pub fn build_frame(msg_type: u8, body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() < u16::MAX as usize);
    let length = (body.len() + 1) as u16;
    let mut buf = Vec::with_capacity(RESPONSE_LENGTH_SIZE + 1 + body.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.push(msg_type);
    buf.extend_from_slice(body);
    buf
}

/// Build a request frame as a client would send it.
///
/// Used by tests and tooling that play the client side of the link.
///
/// # Example
///
/// ```
/// use nhacp_server::protocol::{build_request_frame, msg_type};
///
/// let bytes = build_request_frame(msg_type::HELLO, b"ACP\x01\x00\x00\x00");
/// assert_eq!(&bytes[..5], &[0x8F, 0x00, 0x08, 0x00, 0x00]);
/// ```
pub fn build_request_frame(msg_type: u8, body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() < u16::MAX as usize);
    let header = RequestHeader::new(SESSION_ID, (body.len() + 1) as u16);
    let mut buf = Vec::with_capacity(1 + REQUEST_HEADER_SIZE + 1 + body.len());
    buf.push(REQUEST_SENTINEL);
    buf.extend_from_slice(&header.encode());
    buf.push(msg_type);
    buf.extend_from_slice(body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(
            RequestHeader::new(0, 6),
            msg_type::FILE_CLOSE,
            Bytes::from_static(b"\x02"),
        );

        assert_eq!(frame.msg_type(), msg_type::FILE_CLOSE);
        assert_eq!(frame.body(), b"\x02");
        assert_eq!(frame.body_len(), 1);
        assert_eq!(frame.type_name(), "FILE-CLOSE");
    }

    #[test]
    fn test_build_frame_length_counts_type_and_body() {
        let bytes = build_frame(msg_type::DATA_BUFFER, b"\x03\x00abc");

        assert_eq!(bytes.len(), RESPONSE_LENGTH_SIZE + 1 + 5);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 6);
        assert_eq!(bytes[2], msg_type::DATA_BUFFER);
        assert_eq!(&bytes[3..], b"\x03\x00abc");
    }

    #[test]
    fn test_build_request_frame_matches_hello_bytes() {
        let bytes = build_request_frame(msg_type::HELLO, b"ACP\x01\x00\x00\x00");
        assert_eq!(
            bytes,
            vec![0x8F, 0x00, 0x08, 0x00, 0x00, 0x41, 0x43, 0x50, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_build_request_frame_empty_body() {
        let bytes = build_request_frame(msg_type::GOODBYE, b"");
        assert_eq!(bytes, vec![0x8F, 0x00, 0x01, 0x00, 0xEF]);
    }
}
