//! Frame reader for the request side of the link.
//!
//! Pulls bytes from any `AsyncRead` and assembles request frames:
//! - hunt for the `0x8F` sentinel, discarding anything else
//! - read session + length as one bounded read and validate them
//! - read exactly `length` bytes (type byte + body)
//!
//! Every individual read is bounded by the configured timeout, and a hunt
//! that discards too many bytes is reported as a timeout as well, so neither
//! silence nor a trickle of garbage can stall the caller forever.
//!
//! # Example
//!
//! ```ignore
//! use nhacp_server::protocol::FrameReader;
//! use std::time::Duration;
//!
//! let mut reader = FrameReader::new(stream, Duration::from_secs(1));
//! let frame = reader.read_frame().await?;
//! println!("Got {} with {} body bytes", frame.type_name(), frame.body_len());
//! ```

use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{RequestHeader, MAX_FRAME_LENGTH, REQUEST_HEADER_SIZE, REQUEST_SENTINEL};
use super::Frame;

/// Default per-read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of non-sentinel bytes tolerated in one hunt.
pub const DEFAULT_MAX_RESYNC_BYTES: usize = 8192;

/// Outcome of a failed frame read.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No data arrived in time, or the sentinel hunt gave up.
    #[error("Timed out waiting for a frame")]
    Timeout,

    /// The peer closed the link.
    #[error("End of stream")]
    Eof,

    /// The transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header was inconsistent; the frame was dropped.
    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// Reads request frames off a byte stream.
pub struct FrameReader<R> {
    reader: R,
    read_timeout: Duration,
    max_frame_length: u16,
    max_resync_bytes: usize,
    /// Total bytes thrown away while hunting for sentinels.
    discarded: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default limits.
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self::with_limits(reader, read_timeout, MAX_FRAME_LENGTH, DEFAULT_MAX_RESYNC_BYTES)
    }

    /// Create a new frame reader with custom limits.
    pub fn with_limits(
        reader: R,
        read_timeout: Duration,
        max_frame_length: u16,
        max_resync_bytes: usize,
    ) -> Self {
        Self {
            reader,
            read_timeout,
            max_frame_length,
            max_resync_bytes,
            discarded: 0,
        }
    }

    /// Read the next complete request frame.
    ///
    /// # Errors
    ///
    /// - `Timeout` if a read stalls or the sentinel hunt exceeds its budget
    /// - `Eof` if the stream ends, even mid-frame
    /// - `Io` if the transport fails
    /// - `Malformed` if the header is invalid; the declared length is never
    ///   read, so the next call resumes hunting right after the header
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        self.hunt_sentinel().await?;

        let mut header_buf = [0u8; REQUEST_HEADER_SIZE];
        self.read_exact_timeout(&mut header_buf).await?;
        let header = RequestHeader::decode(&header_buf)
            .ok_or_else(|| FrameError::Malformed("short header".to_string()))?;

        if let Err(e) = header.validate(self.max_frame_length) {
            return Err(FrameError::Malformed(e.to_string()));
        }

        let mut buf = vec![0u8; header.length as usize];
        self.read_exact_timeout(&mut buf).await?;

        let msg_type = buf[0];
        let body = Bytes::from(buf).slice(1..);

        tracing::trace!(msg_type, length = header.length, "frame received");

        Ok(Frame::new(header, msg_type, body))
    }

    /// Discard bytes until the request sentinel is consumed.
    async fn hunt_sentinel(&mut self) -> Result<(), FrameError> {
        let mut skipped = 0usize;
        let mut byte = [0u8; 1];

        loop {
            self.read_exact_timeout(&mut byte).await?;
            if byte[0] == REQUEST_SENTINEL {
                break;
            }

            skipped += 1;
            self.discarded += 1;
            if skipped >= self.max_resync_bytes {
                tracing::warn!(skipped, "no sentinel found, giving up on this hunt");
                return Err(FrameError::Timeout);
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "discarded bytes before sentinel");
        }
        Ok(())
    }

    /// Fill `buf` completely, bounding every read by the timeout.
    async fn read_exact_timeout(&mut self, buf: &mut [u8]) -> Result<(), FrameError> {
        let mut filled = 0;

        while filled < buf.len() {
            let read = tokio::time::timeout(self.read_timeout, self.reader.read(&mut buf[filled..]));
            match read.await {
                Err(_) => return Err(FrameError::Timeout),
                Ok(Err(e)) => return Err(FrameError::Io(e)),
                Ok(Ok(0)) => return Err(FrameError::Eof),
                Ok(Ok(n)) => filled += n,
            }
        }

        Ok(())
    }

    /// Total bytes discarded while resynchronizing.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Get the configured per-read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Consume the frame reader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
