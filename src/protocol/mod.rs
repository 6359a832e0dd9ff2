//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the NHACP link layer:
//! - Request header encoding/decoding and message type constants
//! - Frame reader with timeout and sentinel resynchronization
//! - Frame struct and response frame builder

mod frame;
mod frame_reader;
mod wire_format;

pub use frame::{build_frame, build_request_frame, Frame};
pub use frame_reader::{FrameError, FrameReader, DEFAULT_MAX_RESYNC_BYTES, DEFAULT_READ_TIMEOUT};
pub use wire_format::{
    msg_type, open_flags, RequestHeader, DEFAULT_ADAPTER_NAME, MAX_DATA_LENGTH,
    MAX_FRAME_LENGTH, MAX_STRING_LENGTH, PROTOCOL_MAGIC, PROTOCOL_VERSION, REQUEST_HEADER_SIZE,
    REQUEST_SENTINEL, RESPONSE_LENGTH_SIZE, SESSION_ID,
};
