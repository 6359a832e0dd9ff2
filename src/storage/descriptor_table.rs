//! Fixed-size table of open storage descriptors.
//!
//! Each slot either holds an [`OpenFile`] or is free. The table owns every
//! backing file handle; dropping an entry (close, `close_all`, or dropping
//! the table) closes the file.
//!
//! Reads are short near end-of-file rather than failing. Writes are refused
//! with `NotSupported` unless the table was created with writes enabled.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{ErrorCode, RequestError};
use crate::protocol::{open_flags, MAX_DATA_LENGTH};

/// Default number of descriptor slots.
pub const DEFAULT_MAX_DESCRIPTORS: usize = 8;

/// Highest number of slots a u8 descriptor can address.
pub const MAX_DESCRIPTORS: usize = 256;

/// Access granted to a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A backing file bound to a descriptor.
#[derive(Debug)]
pub struct OpenFile {
    file: File,
    path: PathBuf,
    length: u64,
    access: Access,
}

impl OpenFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length as tracked by the table.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn access(&self) -> Access {
        self.access
    }
}

/// The descriptor table of one session.
#[derive(Debug)]
pub struct DescriptorTable {
    slots: Vec<Option<OpenFile>>,
    writes_enabled: bool,
}

impl DescriptorTable {
    /// Create a table with `capacity` slots (clamped to 1..=256).
    pub fn new(capacity: usize, writes_enabled: bool) -> Self {
        let capacity = capacity.clamp(1, MAX_DESCRIPTORS);
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            writes_enabled,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn writes_enabled(&self) -> bool {
        self.writes_enabled
    }

    /// Check if a descriptor is bound to a file.
    pub fn is_open(&self, descriptor: u8) -> bool {
        self.get(descriptor).is_some()
    }

    /// Number of open descriptors.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Look up an open descriptor.
    pub fn get(&self, descriptor: u8) -> Option<&OpenFile> {
        self.slots.get(descriptor as usize).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, descriptor: u8) -> Result<&mut OpenFile, RequestError> {
        self.slots
            .get_mut(descriptor as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| RequestError::bad_descriptor(descriptor))
    }

    /// The hinted slot if it exists and is free, else the lowest free slot.
    fn free_slot(&self, hint: u8) -> Option<usize> {
        let hint = hint as usize;
        if matches!(self.slots.get(hint), Some(None)) {
            return Some(hint);
        }
        self.slots.iter().position(Option::is_none)
    }

    /// Open `path` and bind it to a descriptor.
    ///
    /// Returns the assigned descriptor and the file length. On any failure
    /// the table is left untouched.
    pub async fn open(
        &mut self,
        hint: u8,
        flags: u16,
        path: &Path,
    ) -> Result<(u8, u64), RequestError> {
        let slot = self.free_slot(hint).ok_or_else(|| {
            RequestError::new(
                ErrorCode::NoFreeSlot,
                format!("all {} descriptors are in use", self.capacity()),
            )
        })?;

        let access = match flags & open_flags::ACCESS_MASK {
            open_flags::READ_ONLY => Access::ReadOnly,
            open_flags::READ_WRITE => Access::ReadWrite,
            mode => {
                return Err(RequestError::not_supported(format!(
                    "access mode {} not supported",
                    mode
                )))
            }
        };
        let create = open_flags::has_flag(flags, open_flags::CREATE);

        if (access == Access::ReadWrite || create) && !self.writes_enabled {
            return Err(RequestError::new(
                ErrorCode::AccessDenied,
                format!("{}: storage is read-only", path.display()),
            ));
        }

        let mut options = OpenOptions::new();
        options.read(true);
        if access == Access::ReadWrite || create {
            options.write(true);
        }
        if create {
            if open_flags::has_flag(flags, open_flags::EXCLUSIVE) {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }

        let file = options
            .open(path)
            .await
            .map_err(|e| with_path(path, e.into()))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| with_path(path, e.into()))?;

        if metadata.is_dir() {
            return Err(RequestError::new(
                ErrorCode::IsDirectory,
                format!("{}: is a directory", path.display()),
            ));
        }

        let length = metadata.len();
        self.slots[slot] = Some(OpenFile {
            file,
            path: path.to_path_buf(),
            length,
            access,
        });

        tracing::debug!(descriptor = slot, path = %path.display(), length, ?access, "descriptor opened");
        Ok((slot as u8, length))
    }

    /// Read block `block_index` of `block_length` bytes.
    ///
    /// Blocks extending past end-of-file come back short, possibly empty.
    pub async fn get_block(
        &mut self,
        descriptor: u8,
        block_index: u32,
        block_length: u16,
    ) -> Result<Bytes, RequestError> {
        let offset = block_index as u64 * block_length as u64;
        self.read_at(descriptor, offset, block_length as usize).await
    }

    /// Read up to `length` bytes at `offset`.
    pub async fn read_at(
        &mut self,
        descriptor: u8,
        offset: u64,
        length: usize,
    ) -> Result<Bytes, RequestError> {
        if length > MAX_DATA_LENGTH {
            return Err(RequestError::invalid_argument(format!(
                "read of {} bytes exceeds maximum {}",
                length, MAX_DATA_LENGTH
            )));
        }

        let entry = self.entry_mut(descriptor)?;
        entry.file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(length);
        (&mut entry.file)
            .take(length as u64)
            .read_to_end(&mut buf)
            .await?;

        Ok(Bytes::from(buf))
    }

    /// Write `data` as block `block_index` of `block_length` bytes.
    pub async fn put_block(
        &mut self,
        descriptor: u8,
        block_index: u32,
        block_length: u16,
        data: &[u8],
    ) -> Result<(), RequestError> {
        if !self.writes_enabled {
            return Err(RequestError::not_supported("block writes are not supported"));
        }
        if data.len() != block_length as usize {
            return Err(RequestError::invalid_argument(format!(
                "block of {} bytes carries {} bytes of data",
                block_length,
                data.len()
            )));
        }

        let offset = block_index as u64 * block_length as u64;
        self.write_at(descriptor, offset, data).await
    }

    /// Write `data` at `offset`, growing the file as needed.
    pub async fn write_at(
        &mut self,
        descriptor: u8,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RequestError> {
        if !self.writes_enabled {
            return Err(RequestError::not_supported("writes are not supported"));
        }
        if data.len() > MAX_DATA_LENGTH {
            return Err(RequestError::invalid_argument(format!(
                "write of {} bytes exceeds maximum {}",
                data.len(),
                MAX_DATA_LENGTH
            )));
        }

        let entry = self.entry_mut(descriptor)?;
        if entry.access != Access::ReadWrite {
            return Err(RequestError::new(
                ErrorCode::AccessDenied,
                format!("descriptor {} is read-only", descriptor),
            ));
        }

        let end = offset + data.len() as u64;
        if end > u32::MAX as u64 {
            return Err(RequestError::from_code(ErrorCode::FileTooBig));
        }

        entry.file.seek(SeekFrom::Start(offset)).await?;
        entry.file.write_all(data).await?;
        entry.file.flush().await?;
        entry.length = entry.length.max(end);

        Ok(())
    }

    /// Release a descriptor. Closing a free or unknown descriptor is a no-op.
    ///
    /// Returns whether a file was actually closed.
    pub fn close(&mut self, descriptor: u8) -> bool {
        let Some(slot) = self.slots.get_mut(descriptor as usize) else {
            return false;
        };

        match slot.take() {
            Some(entry) => {
                tracing::debug!(descriptor, path = %entry.path.display(), "descriptor closed");
                true
            }
            None => false,
        }
    }

    /// Release every descriptor, returning how many were open.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for slot in self.slots.iter_mut() {
            if slot.take().is_some() {
                closed += 1;
            }
        }
        closed
    }
}

fn with_path(path: &Path, mut err: RequestError) -> RequestError {
    err.message = format!("{}: {}", path.display(), err.message);
    err
}
