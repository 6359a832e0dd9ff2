//! Mapping of client URLs onto files under the storage root.
//!
//! Only local names are served. A `file:` or `file://` prefix is accepted
//! and stripped; every other scheme is refused. The remaining path is always
//! interpreted relative to the root, and `..` is refused outright so nothing
//! outside the root can be named.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{ErrorCode, RequestError};

/// Directory that all storage URLs resolve under.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a client URL to a path under the root.
    ///
    /// The URL is taken as raw bytes; names in the client's 8-bit character
    /// set reach the filesystem unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use nhacp_server::storage::StorageRoot;
    ///
    /// let root = StorageRoot::new("/srv/nabu");
    /// let path = root.resolve(b"file:///disks/cpm.img").unwrap();
    /// assert_eq!(path, std::path::Path::new("/srv/nabu/disks/cpm.img"));
    /// assert!(root.resolve(b"../etc/passwd").is_err());
    /// ```
    pub fn resolve(&self, url: &[u8]) -> Result<PathBuf, RequestError> {
        let path = strip_scheme(url)?;

        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in path.split(|&b| b == b'/' || b == b'\\') {
            match component {
                b"" | b"." => continue,
                b".." => {
                    return Err(RequestError::new(
                        ErrorCode::AccessDenied,
                        format!(
                            "{}: parent directory references are not allowed",
                            String::from_utf8_lossy(url)
                        ),
                    ))
                }
                name => {
                    resolved.push(os_name(name)?);
                    depth += 1;
                }
            }
        }

        if depth == 0 {
            return Err(RequestError::invalid_argument(format!(
                "{:?} does not name a file",
                String::from_utf8_lossy(url)
            )));
        }

        Ok(resolved)
    }
}

#[cfg(unix)]
fn os_name(name: &[u8]) -> Result<&OsStr, RequestError> {
    use std::os::unix::ffi::OsStrExt;
    Ok(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn os_name(name: &[u8]) -> Result<&OsStr, RequestError> {
    std::str::from_utf8(name).map(OsStr::new).map_err(|_| {
        RequestError::invalid_argument(format!(
            "{}: name is not valid UTF-8",
            String::from_utf8_lossy(name)
        ))
    })
}

fn strip_scheme(url: &[u8]) -> Result<&[u8], RequestError> {
    if let Some(rest) = url.strip_prefix(b"file://") {
        return Ok(rest);
    }
    if let Some(rest) = url.strip_prefix(b"file:") {
        return Ok(rest);
    }
    if let Some(at) = url.windows(3).position(|w| w == b"://") {
        return Err(RequestError::not_supported(format!(
            "{}: scheme not supported",
            String::from_utf8_lossy(&url[..at])
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> StorageRoot {
        StorageRoot::new("/srv/nabu")
    }

    #[test]
    fn test_plain_name() {
        assert_eq!(
            root().resolve(b"cpm22.img").unwrap(),
            PathBuf::from("/srv/nabu/cpm22.img")
        );
    }

    #[test]
    fn test_absolute_path_stays_under_root() {
        assert_eq!(
            root().resolve(b"/disks/a.img").unwrap(),
            PathBuf::from("/srv/nabu/disks/a.img")
        );
    }

    #[test]
    fn test_file_scheme_stripped() {
        assert_eq!(
            root().resolve(b"file:a.img").unwrap(),
            PathBuf::from("/srv/nabu/a.img")
        );
        assert_eq!(
            root().resolve(b"file:///disks/./a.img").unwrap(),
            PathBuf::from("/srv/nabu/disks/a.img")
        );
    }

    #[test]
    fn test_parent_reference_rejected() {
        let err = root().resolve(b"disks/../../etc/passwd").unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);

        let err = root().resolve(b"..\\secret").unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_8bit_name_kept_verbatim() {
        use std::os::unix::ffi::OsStrExt;

        let path = root().resolve(b"disks/caf\xe9.img").unwrap();
        assert_eq!(path.file_name().unwrap().as_bytes(), b"caf\xe9.img");
        assert!(path.starts_with("/srv/nabu/disks"));
    }

    #[test]
    fn test_other_scheme_not_supported() {
        let err = root().resolve(b"http://example.com/a.img").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotSupported);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(root().resolve(b"").unwrap_err().code, ErrorCode::InvalidArgument);
        assert_eq!(root().resolve(b"/./").unwrap_err().code, ErrorCode::InvalidArgument);
    }
}
