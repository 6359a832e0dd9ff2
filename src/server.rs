//! Server entry point and configuration.
//!
//! [`Server::serve`] runs one protocol session over any byte reader/writer
//! pair until the client says GOODBYE, the link closes, or the client goes
//! silent for too long.
//!
//! # Example
//!
//! ```no_run
//! use nhacp_server::Server;
//!
//! # async fn run() -> nhacp_server::error::Result<()> {
//! let server = Server::builder()
//!     .storage_root("/srv/nabu")
//!     .max_descriptors(16)
//!     .build();
//!
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:5816").await?;
//! let (reader, writer) = stream.into_split();
//! let end = server.serve(reader, writer).await?;
//! println!("session ended: {:?}", end);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::error::{NhacpError, Result};
use crate::handler::Session;
use crate::protocol::{
    FrameError, FrameReader, DEFAULT_ADAPTER_NAME, DEFAULT_MAX_RESYNC_BYTES, DEFAULT_READ_TIMEOUT,
    MAX_FRAME_LENGTH,
};
use crate::storage::DEFAULT_MAX_DESCRIPTORS;
use crate::writer::ResponseWriter;

/// Default number of consecutive idle read timeouts before a session ends.
pub const DEFAULT_MAX_IDLE_TIMEOUTS: u32 = 300;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory that storage URLs resolve under. Default: `.`
    pub storage_root: PathBuf,
    /// Bound on every individual read. Default: 1 second
    pub read_timeout: Duration,
    /// Consecutive timeouts tolerated while waiting for a frame.
    /// `None` waits forever. Default: 300
    pub max_idle_timeouts: Option<u32>,
    /// Bytes discarded while hunting for a sentinel before the hunt counts
    /// as a timeout. Default: 8192
    pub max_resync_bytes: usize,
    /// Size of the descriptor table. Default: 8
    pub max_descriptors: usize,
    /// Allow STORAGE-PUT, PUT-BLOCK and read-write opens. Default: false
    pub allow_writes: bool,
    /// Name reported in SESSION-STARTED.
    pub adapter_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("."),
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_idle_timeouts: Some(DEFAULT_MAX_IDLE_TIMEOUTS),
            max_resync_bytes: DEFAULT_MAX_RESYNC_BYTES,
            max_descriptors: DEFAULT_MAX_DESCRIPTORS,
            allow_writes: false,
            adapter_name: DEFAULT_ADAPTER_NAME.to_string(),
        }
    }
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent GOODBYE.
    Goodbye,
    /// The link reached end-of-stream.
    Disconnected,
}

/// Builder for configuring a [`Server`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory storage URLs resolve under.
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    /// Set the per-read timeout.
    ///
    /// Default: 1 second
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set how many consecutive idle timeouts end the session.
    ///
    /// `None` keeps the session open indefinitely.
    /// Default: 300
    pub fn max_idle_timeouts(mut self, limit: Option<u32>) -> Self {
        self.config.max_idle_timeouts = limit;
        self
    }

    /// Set the sentinel hunt budget.
    ///
    /// Default: 8192
    pub fn max_resync_bytes(mut self, limit: usize) -> Self {
        self.config.max_resync_bytes = limit;
        self
    }

    /// Set the number of descriptors per session (clamped to 1..=256).
    ///
    /// Default: 8
    pub fn max_descriptors(mut self, count: usize) -> Self {
        self.config.max_descriptors = count;
        self
    }

    /// Enable or disable write requests.
    ///
    /// Default: false
    pub fn allow_writes(mut self, allow: bool) -> Self {
        self.config.allow_writes = allow;
        self
    }

    /// Set the adapter name sent in SESSION-STARTED.
    pub fn adapter_name(mut self, name: impl Into<String>) -> Self {
        self.config.adapter_name = name.into();
        self
    }

    pub fn build(self) -> Server {
        Server::new(self.config)
    }
}

/// Protocol server. Holds configuration only; every call to
/// [`serve`](Server::serve) runs an independent session.
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run one session over `reader` and `writer`.
    ///
    /// Every descriptor the client opened is released before this returns,
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `Io` if the link fails
    /// - `Timeout` if the client stays silent for `max_idle_timeouts` reads
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<SessionEnd>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut frames = FrameReader::with_limits(
            BufReader::new(reader),
            self.config.read_timeout,
            MAX_FRAME_LENGTH,
            self.config.max_resync_bytes,
        );
        let mut writer = ResponseWriter::new(writer);
        let mut session = Session::new(&self.config);

        tracing::info!(root = %self.config.storage_root.display(), "waiting for HELLO");

        let result = self.run(&mut frames, &mut writer, &mut session).await;
        let released = session.close();

        match &result {
            Ok(end) => tracing::info!(
                ?end,
                released,
                responses = writer.frames_sent(),
                discarded = frames.discarded_bytes(),
                "session ended"
            ),
            Err(e) => tracing::error!(error = %e, released, "session failed"),
        }

        result
    }

    async fn run<R, W>(
        &self,
        frames: &mut FrameReader<R>,
        writer: &mut ResponseWriter<W>,
        session: &mut Session,
    ) -> Result<SessionEnd>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut idle = 0u32;

        loop {
            let frame = match frames.read_frame().await {
                Ok(frame) => frame,
                Err(FrameError::Timeout) => {
                    idle += 1;
                    if let Some(limit) = self.config.max_idle_timeouts {
                        if idle >= limit {
                            tracing::warn!(idle, "client idle, giving up");
                            return Err(NhacpError::Timeout(idle));
                        }
                    }
                    continue;
                }
                Err(FrameError::Eof) => return Ok(SessionEnd::Disconnected),
                Err(FrameError::Io(e)) => return Err(NhacpError::Io(e)),
                Err(FrameError::Malformed(reason)) => {
                    idle = 0;
                    tracing::warn!(%reason, "dropping malformed frame");
                    continue;
                }
            };

            idle = 0;
            tracing::debug!(
                msg_type = frame.type_name(),
                length = frame.header.length,
                "request"
            );

            if let Some(response) = session.handle_frame(&frame).await {
                writer.send(&response).await?;
            }

            if session.is_closed() {
                return Ok(SessionEnd::Goodbye);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Request, Response};
    use bytes::Bytes;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, ReadBuf};

    /// Link that delivers `data`, then fails every later read.
    struct DroppedLine {
        data: Vec<u8>,
    }

    impl AsyncRead for DroppedLine {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.data.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "line dropped",
                )));
            }
            let n = self.data.len().min(buf.remaining());
            buf.put_slice(&self.data[..n]);
            self.data.drain(..n);
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.storage_root, PathBuf::from("."));
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.max_idle_timeouts, Some(300));
        assert_eq!(config.max_descriptors, 8);
        assert!(!config.allow_writes);
        assert_eq!(config.adapter_name, "NABU-ADAPTOR-1.1");
    }

    #[test]
    fn test_builder() {
        let server = Server::builder()
            .storage_root("/srv/nabu")
            .read_timeout(Duration::from_millis(250))
            .max_idle_timeouts(None)
            .max_resync_bytes(64)
            .max_descriptors(16)
            .allow_writes(true)
            .adapter_name("TEST")
            .build();

        let config = server.config();
        assert_eq!(config.storage_root, PathBuf::from("/srv/nabu"));
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.max_idle_timeouts, None);
        assert_eq!(config.max_resync_bytes, 64);
        assert_eq!(config.max_descriptors, 16);
        assert!(config.allow_writes);
        assert_eq!(config.adapter_name, "TEST");
    }

    #[tokio::test]
    async fn test_eof_before_hello_is_disconnect() {
        let (client, server_side) = duplex(1024);
        drop(client);
        let (reader, writer) = tokio::io::split(server_side);

        let end = Server::builder().build().serve(reader, writer).await.unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_idle_timeouts_end_session() {
        let (_client, server_side) = duplex(1024);
        let (reader, writer) = tokio::io::split(server_side);
        let server = Server::builder()
            .read_timeout(Duration::from_millis(10))
            .max_idle_timeouts(Some(3))
            .build();

        let err = server.serve(reader, writer).await.unwrap_err();
        assert!(matches!(err, NhacpError::Timeout(3)));
    }

    #[tokio::test]
    async fn test_hello_then_goodbye() {
        let (mut client, server_side) = duplex(1024);
        let (reader, writer) = tokio::io::split(server_side);
        let server = Server::builder().build();
        let task = tokio::spawn(async move { server.serve(reader, writer).await });

        let hello = Request::Hello {
            magic: *b"ACP",
            version: 1,
            options: 0,
        };
        client.write_all(&hello.to_frame()).await.unwrap();

        let mut buf = [0u8; 23];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[2], 0x80);

        client
            .write_all(&Request::Goodbye.to_frame())
            .await
            .unwrap();

        let end = task.await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::Goodbye);
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_no_reply() {
        let (mut client, server_side) = duplex(1024);
        let (reader, writer) = tokio::io::split(server_side);
        let server = Server::builder().build();
        let task = tokio::spawn(async move { server.serve(reader, writer).await });

        // Zero-length frame, then a real request.
        client.write_all(&[0x8F, 0x00, 0x00, 0x00]).await.unwrap();
        client
            .write_all(&Request::GetDateTime.to_frame())
            .await
            .unwrap();

        let mut head = [0u8; 3];
        client.read_exact(&mut head).await.unwrap();
        let length = u16::from_le_bytes([head[0], head[1]]) as usize;
        let mut body = vec![0u8; length - 1];
        client.read_exact(&mut body).await.unwrap();

        // GET-DATE-TIME before HELLO is refused; the malformed frame was silent.
        let response = Response::decode(head[2], body.into()).unwrap();
        assert!(matches!(response, Response::Error { code: 2, .. }));

        drop(client);
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_read_error_ends_session_with_open_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("disk.img"), b"NABU").unwrap();

        let mut data = Request::Hello {
            magic: *b"ACP",
            version: 1,
            options: 0,
        }
        .to_frame();
        data.extend(
            Request::StorageOpen {
                descriptor: 0,
                flags: 0,
                url: Bytes::from_static(b"disk.img"),
            }
            .to_frame(),
        );

        let (writer, mut replies) = duplex(1024);
        let server = Server::builder().storage_root(dir.path()).build();

        let err = server
            .serve(DroppedLine { data }, writer)
            .await
            .unwrap_err();
        match err {
            NhacpError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected I/O error, got {:?}", other),
        }

        // Both requests were answered before the line dropped.
        let mut out = Vec::new();
        replies.read_to_end(&mut out).await.unwrap();
        assert_eq!(out[2], 0x80);
        let loaded = Response::StorageLoaded {
            descriptor: 0,
            length: 4,
        }
        .to_frame();
        assert!(out.ends_with(&loaded));
    }
}
