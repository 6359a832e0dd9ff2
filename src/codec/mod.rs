//! Codec module - typed messages to and from frame bodies.
//!
//! - [`Request`] - every message the client may send, decoded from a frame
//! - [`Response`] - every message the server sends, encoded to a frame
//!
//! # Design
//!
//! Each message is an explicit field list read and written through
//! `bytes::Buf`/`BufMut`, never through struct layout. Decoding is strict:
//! the fixed fields must be present, declared sub-lengths must fit, and the
//! body must be consumed exactly.
//!
//! # Example
//!
//! ```
//! use nhacp_server::codec::{Request, Response};
//! use nhacp_server::protocol::msg_type;
//! use bytes::Bytes;
//!
//! let request = Request::decode(msg_type::HELLO, Bytes::from_static(b"ACP\x01\x00\x00\x00")).unwrap();
//! assert!(matches!(request, Request::Hello { version: 1, options: 0, .. }));
//!
//! let frame = Response::Ok.to_frame();
//! assert_eq!(frame, vec![0x01, 0x00, 0x81]);
//! ```

mod fields;
mod request;
mod response;

pub use fields::DecodeError;
pub use request::Request;
pub use response::Response;
