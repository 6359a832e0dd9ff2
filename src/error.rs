//! Error types for nhacp-server.
//!
//! Two families live here:
//! - [`NhacpError`]: failures that end a session (transport I/O, idle timeout).
//! - [`RequestError`]: failures of a single request, answered to the client
//!   with an ERROR response carrying an [`ErrorCode`].

use std::io;

use thiserror::Error;

/// Main error type for session-ending failures.
#[derive(Debug, Error)]
pub enum NhacpError {
    /// I/O error on the link.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The client stayed silent for too many consecutive read timeouts.
    #[error("Session timed out after {0} consecutive idle timeouts")]
    Timeout(u32),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol error that cannot be reported back to the client.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using NhacpError.
pub type Result<T> = std::result::Result<T, NhacpError>;

/// Error codes carried in ERROR responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Undefined = 0,
    NotSupported = 1,
    PermissionDenied = 2,
    NotFound = 3,
    Io = 4,
    BadDescriptor = 5,
    OutOfMemory = 6,
    AccessDenied = 7,
    Busy = 8,
    AlreadyExists = 9,
    IsDirectory = 10,
    InvalidArgument = 11,
    NoFreeSlot = 12,
    FileTooBig = 13,
}

impl ErrorCode {
    /// Wire value of this code.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Look up a code by its wire value.
    pub fn from_u16(code: u16) -> Option<Self> {
        let code = match code {
            0 => Self::Undefined,
            1 => Self::NotSupported,
            2 => Self::PermissionDenied,
            3 => Self::NotFound,
            4 => Self::Io,
            5 => Self::BadDescriptor,
            6 => Self::OutOfMemory,
            7 => Self::AccessDenied,
            8 => Self::Busy,
            9 => Self::AlreadyExists,
            10 => Self::IsDirectory,
            11 => Self::InvalidArgument,
            12 => Self::NoFreeSlot,
            13 => Self::FileTooBig,
            _ => return None,
        };
        Some(code)
    }

    /// Generic message used when no detail is available.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Undefined => "undefined error",
            Self::NotSupported => "operation not supported",
            Self::PermissionDenied => "operation not permitted",
            Self::NotFound => "no such file",
            Self::Io => "I/O error",
            Self::BadDescriptor => "bad file descriptor",
            Self::OutOfMemory => "out of memory",
            Self::AccessDenied => "access denied",
            Self::Busy => "resource busy",
            Self::AlreadyExists => "file exists",
            Self::IsDirectory => "is a directory",
            Self::InvalidArgument => "invalid argument",
            Self::NoFreeSlot => "too many open files",
            Self::FileTooBig => "file too big",
        }
    }
}

/// A request that failed and must be answered with an ERROR response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {})", .code.as_u16())]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

impl RequestError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error carrying the code's generic message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, message)
    }

    pub fn bad_descriptor(descriptor: u8) -> Self {
        Self::new(
            ErrorCode::BadDescriptor,
            format!("descriptor {} is not open", descriptor),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }
}

impl From<io::Error> for RequestError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::PermissionDenied => ErrorCode::AccessDenied,
            io::ErrorKind::AlreadyExists => ErrorCode::AlreadyExists,
            io::ErrorKind::OutOfMemory => ErrorCode::OutOfMemory,
            io::ErrorKind::InvalidInput => ErrorCode::InvalidArgument,
            _ if is_directory_error(&err) => ErrorCode::IsDirectory,
            _ => ErrorCode::Io,
        };
        Self::new(code, err.to_string())
    }
}

/// Raw `EISDIR`; `ErrorKind::IsADirectory` is newer than our MSRV.
#[cfg(unix)]
fn is_directory_error(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EISDIR)
}

#[cfg(not(unix))]
fn is_directory_error(_err: &io::Error) -> bool {
    false
}
