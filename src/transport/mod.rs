//! Transport module - links the server can run a session over.
//!
//! - [`SerialPort`]: a tty device (the adapter's usual link)
//! - [`TcpServer`]: a TCP listener for emulators, one client at a time
//!
//! Line settings (baud rate, control lines) are left to the host; these are
//! thin wrappers that hand a reader and writer to [`Server::serve`](crate::Server::serve).

mod serial;
mod tcp;

pub use serial::SerialPort;
pub use tcp::TcpServer;
