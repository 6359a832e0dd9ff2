//! # nhacp-server
//!
//! Server side of the NABU Cloud Access Protocol (NHACP).
//!
//! A NABU computer talks to the host over a point-to-point link (a serial
//! line through the adapter, or TCP from an emulator). This crate frames the
//! incoming byte stream, decodes requests, serves disk-image files from a
//! storage directory through a small table of virtual descriptors, and
//! writes back framed responses.
//!
//! ## Architecture
//!
//! ```text
//! link ─► FrameReader ─► Request ─► Session ─► DescriptorTable ─► files
//!                                      │
//! link ◄─ ResponseWriter ◄─ Response ◄─┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use nhacp_server::transport::SerialPort;
//! use nhacp_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> nhacp_server::error::Result<()> {
//!     let server = Server::builder().storage_root("/srv/nabu").build();
//!
//!     let port = SerialPort::open("/dev/ttyUSB1").await?;
//!     let (reader, writer) = port.into_split();
//!     server.serve(reader, writer).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod storage;
pub mod transport;

mod server;
mod writer;

pub use error::{ErrorCode, NhacpError, RequestError};
pub use server::{Server, ServerBuilder, ServerConfig, SessionEnd, DEFAULT_MAX_IDLE_TIMEOUTS};
pub use writer::ResponseWriter;
