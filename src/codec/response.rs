//! Responses sent by the server.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};

use super::fields::{DecodeError, Fields};
use crate::error::{ErrorCode, RequestError};
use crate::protocol::{build_frame, msg_type, MAX_STRING_LENGTH};

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer to HELLO.
    SessionStarted {
        session_id: u8,
        version: u16,
        adapter_name: String,
    },
    /// Generic success.
    Ok,
    /// Failure with a code and a human-readable message.
    Error { code: u16, message: String },
    /// Answer to STORAGE-OPEN.
    StorageLoaded { descriptor: u8, length: u32 },
    /// Data read from storage.
    DataBuffer { data: Bytes },
    /// Host local time as ASCII `YYYYMMDD` and `HHMMSS`.
    DateTime { date: [u8; 8], time: [u8; 6] },
}

impl Response {
    /// ERROR response for a failed request.
    pub fn error(err: &RequestError) -> Self {
        Self::Error {
            code: err.code.as_u16(),
            message: err.message.clone(),
        }
    }

    /// ERROR response with the code's generic message.
    pub fn error_code(code: ErrorCode) -> Self {
        Self::Error {
            code: code.as_u16(),
            message: code.default_message().to_string(),
        }
    }

    /// DATE-TIME response for the given local time.
    pub fn date_time(now: NaiveDateTime) -> Self {
        let year = now.year().clamp(0, 9999);
        let date = format!("{:04}{:02}{:02}", year, now.month(), now.day());
        let time = format!("{:02}{:02}{:02}", now.hour(), now.minute(), now.second());

        let mut response_date = [b'0'; 8];
        let mut response_time = [b'0'; 6];
        response_date.copy_from_slice(&date.as_bytes()[..8]);
        response_time.copy_from_slice(&time.as_bytes()[..6]);

        Self::DateTime {
            date: response_date,
            time: response_time,
        }
    }

    /// Message type byte of this response.
    pub fn msg_type(&self) -> u8 {
        match self {
            Self::SessionStarted { .. } => msg_type::SESSION_STARTED,
            Self::Ok => msg_type::OK,
            Self::Error { .. } => msg_type::ERROR,
            Self::StorageLoaded { .. } => msg_type::STORAGE_LOADED,
            Self::DataBuffer { .. } => msg_type::DATA_BUFFER,
            Self::DateTime { .. } => msg_type::DATE_TIME,
        }
    }

    /// Encode the body (everything after the type byte).
    ///
    /// Strings are truncated to 255 bytes to fit their length byte.
    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Self::SessionStarted {
                session_id,
                version,
                adapter_name,
            } => {
                buf.put_u8(*session_id);
                buf.put_u16_le(*version);
                put_string(&mut buf, adapter_name);
            }
            Self::Ok => {}
            Self::Error { code, message } => {
                buf.put_u16_le(*code);
                put_string(&mut buf, message);
            }
            Self::StorageLoaded { descriptor, length } => {
                buf.put_u8(*descriptor);
                buf.put_u32_le(*length);
            }
            Self::DataBuffer { data } => {
                debug_assert!(data.len() <= u16::MAX as usize);
                buf.put_u16_le(data.len() as u16);
                buf.put_slice(data);
            }
            Self::DateTime { date, time } => {
                buf.put_slice(date);
                buf.put_slice(time);
            }
        }

        buf.freeze()
    }

    /// Encode a complete response frame, length prefix included.
    pub fn to_frame(&self) -> Vec<u8> {
        build_frame(self.msg_type(), &self.encode_body())
    }

    /// Decode a response from its type byte and body.
    ///
    /// The server never reads responses; this is the client half of the
    /// codec, used by tooling and tests.
    pub fn decode(msg_type: u8, body: Bytes) -> Result<Self, DecodeError> {
        let mut f = Fields::new(msg_type, body);

        let response = match msg_type {
            msg_type::SESSION_STARTED => Self::SessionStarted {
                session_id: f.u8()?,
                version: f.u16()?,
                adapter_name: f.string()?,
            },
            msg_type::OK => Self::Ok,
            msg_type::ERROR => Self::Error {
                code: f.u16()?,
                message: f.string()?,
            },
            msg_type::STORAGE_LOADED => Self::StorageLoaded {
                descriptor: f.u8()?,
                length: f.u32()?,
            },
            msg_type::DATA_BUFFER => {
                let length = f.u16()?;
                Self::DataBuffer {
                    data: f.bytes(length as usize)?,
                }
            }
            msg_type::DATE_TIME => Self::DateTime {
                date: f.array::<8>()?,
                time: f.array::<6>()?,
            },
            other => return Err(DecodeError::UnknownType(other)),
        };

        f.finish()?;
        Ok(response)
    }
}

fn put_string(buf: &mut BytesMut, value: &str) {
    let bytes = &value.as_bytes()[..value.len().min(MAX_STRING_LENGTH)];
    buf.put_u8(bytes.len() as u8);
    buf.put_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn length_field(frame: &[u8]) -> usize {
        u16::from_le_bytes([frame[0], frame[1]]) as usize
    }

    #[test]
    fn test_session_started_layout() {
        let frame = Response::SessionStarted {
            session_id: 0,
            version: 1,
            adapter_name: "NABU-ADAPTOR-1.1".to_string(),
        }
        .to_frame();

        let mut expected = vec![0x15, 0x00, 0x80, 0x00, 0x01, 0x00, 0x10];
        expected.extend_from_slice(b"NABU-ADAPTOR-1.1");
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_storage_loaded_layout() {
        let frame = Response::StorageLoaded {
            descriptor: 0,
            length: 0x0400,
        }
        .to_frame();

        assert_eq!(frame, vec![0x06, 0x00, 0x83, 0x00, 0x00, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn test_error_layout() {
        let frame = Response::Error {
            code: 1,
            message: "nope".to_string(),
        }
        .to_frame();

        assert_eq!(frame, vec![0x08, 0x00, 0x82, 0x01, 0x00, 0x04, b'n', b'o', b'p', b'e']);
    }

    #[test]
    fn test_error_message_truncated_to_255() {
        let frame = Response::Error {
            code: 4,
            message: "x".repeat(400),
        }
        .to_frame();

        assert_eq!(frame[5], 255);
        assert_eq!(frame.len(), 2 + 1 + 2 + 1 + 255);
        assert_eq!(length_field(&frame), frame.len() - 2);
    }

    #[test]
    fn test_length_field_matches_every_variant() {
        let responses = vec![
            Response::SessionStarted {
                session_id: 0,
                version: 1,
                adapter_name: "adapter".to_string(),
            },
            Response::Ok,
            Response::error_code(ErrorCode::BadDescriptor),
            Response::StorageLoaded {
                descriptor: 7,
                length: 92160,
            },
            Response::DataBuffer {
                data: Bytes::from(vec![0xE5; 8192]),
            },
            Response::DataBuffer { data: Bytes::new() },
            Response::date_time(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(3, 4, 5)
                    .unwrap(),
            ),
        ];

        for response in responses {
            let frame = response.to_frame();
            assert_eq!(length_field(&frame), frame.len() - 2, "{:?}", response.msg_type());
            assert_eq!(frame[2], response.msg_type());
        }
    }

    #[test]
    fn test_date_time_ascii() {
        let now = NaiveDate::from_ymd_opt(1984, 12, 25)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();

        let response = Response::date_time(now);
        assert_eq!(
            response,
            Response::DateTime {
                date: *b"19841225",
                time: *b"093000"
            }
        );
    }

    #[test]
    fn test_decode_data_buffer() {
        let response =
            Response::decode(msg_type::DATA_BUFFER, Bytes::from_static(b"\x03\x00abc")).unwrap();
        assert_eq!(
            response,
            Response::DataBuffer {
                data: Bytes::from_static(b"abc")
            }
        );

        let err = Response::decode(msg_type::DATA_BUFFER, Bytes::from_static(b"\x09\x00abc"));
        assert!(matches!(err, Err(DecodeError::SubLength { declared: 9, .. })));
    }

    #[test]
    fn test_error_from_request_error() {
        let response = Response::error(&RequestError::bad_descriptor(4));
        assert_eq!(
            response,
            Response::Error {
                code: 5,
                message: "descriptor 4 is not open".to_string()
            }
        );
    }
}
