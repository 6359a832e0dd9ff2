//! Response writer for the server side of the link.
//!
//! Each response is written as one vectored write (length + type header,
//! then body) and flushed immediately. The client blocks on every reply, so
//! nothing is ever batched.

use std::io::{self, IoSlice};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::Response;
use crate::error::Result;
use crate::protocol::RESPONSE_LENGTH_SIZE;

/// Size of the response header: length + type byte.
const RESPONSE_HEADER_SIZE: usize = RESPONSE_LENGTH_SIZE + 1;

/// Writes encoded responses to the link.
pub struct ResponseWriter<W> {
    inner: W,
    frames_sent: u64,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Encode and send one response, then flush.
    pub async fn send(&mut self, response: &Response) -> Result<()> {
        let body = response.encode_body();
        let length = (body.len() + 1) as u16;

        let mut header = [0u8; RESPONSE_HEADER_SIZE];
        header[..RESPONSE_LENGTH_SIZE].copy_from_slice(&length.to_le_bytes());
        header[RESPONSE_LENGTH_SIZE] = response.msg_type();

        self.write_frame(&header, &body).await?;
        self.inner.flush().await?;

        self.frames_sent += 1;
        self.bytes_sent += (RESPONSE_HEADER_SIZE + body.len()) as u64;

        tracing::trace!(
            msg_type = response.msg_type(),
            length,
            "response sent"
        );
        Ok(())
    }

    async fn write_frame(&mut self, header: &[u8], body: &[u8]) -> io::Result<()> {
        let slices = [IoSlice::new(header), IoSlice::new(body)];
        let written = self.inner.write_vectored(&slices).await?;
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }

        // Finish whatever the vectored write left behind.
        if written < header.len() {
            self.inner.write_all(&header[written..]).await?;
            self.inner.write_all(body).await?;
        } else {
            self.inner.write_all(&body[written - header.len()..]).await?;
        }
        Ok(())
    }

    /// Number of responses written so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Number of bytes written so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
