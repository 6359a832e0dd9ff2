//! TCP transport for emulators.

use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::error::Result;

/// TCP listener handing out one connection at a time.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Bind to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept a single connection.
    ///
    /// Nagle is disabled since every response is a small flushed frame.
    pub async fn accept(&self) -> Result<(OwnedReadHalf, OwnedWriteHalf, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok((reader, writer, peer))
    }

    /// Get the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
