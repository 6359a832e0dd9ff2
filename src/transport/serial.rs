//! Serial device transport.
//!
//! The device is used as-is. It must already be in raw mode at the
//! adapter's baud rate, otherwise echo, CR/LF translation and line
//! buffering corrupt the binary frames:
//!
//! ```text
//! stty -F /dev/ttyUSB1 raw -echo 115200
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nhacp_server::transport::SerialPort;
//!
//! # async fn run() -> nhacp_server::error::Result<()> {
//! let port = SerialPort::open("/dev/ttyUSB1").await?;
//! let (reader, writer) = port.into_split();
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::error::Result;

/// An open serial device, readable and writable through separate handles.
#[derive(Debug)]
pub struct SerialPort {
    reader: File,
    writer: File,
    path: PathBuf,
}

impl SerialPort {
    /// Open `path` for reading and writing.
    ///
    /// On Unix the device never becomes the controlling terminal.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        options.custom_flags(libc::O_NOCTTY);

        let reader = options.open(path).await?;
        let writer = reader.try_clone().await?;

        tracing::debug!(path = %path.display(), "serial device opened");

        Ok(Self {
            reader,
            writer,
            path: path.to_path_buf(),
        })
    }

    /// Get the device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow both halves, keeping the device open for the next session.
    pub fn halves(&mut self) -> (&mut File, &mut File) {
        (&mut self.reader, &mut self.writer)
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (File, File) {
        (self.reader, self.writer)
    }
}
