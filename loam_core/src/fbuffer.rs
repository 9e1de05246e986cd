//! Whole-file reads with modification-time change detection.
//!
//! Config loading re-reads files only when their modification time moves
//! past the one recorded at the previous read.

use crate::error::{Error, IoResultExt, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// An owned copy of a file's bytes, with the modification time observed
/// when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuffer {
    data: Vec<u8>,
    modified: SystemTime,
}

impl FileBuffer {
    /// The buffered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Modification time of the file at read time.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Drop trailing whitespace in place. Capacity is kept.
    pub fn trim_end_whitespace(&mut self) {
        while let Some(&last) = self.data.last()
            && is_space(last)
        {
            self.data.pop();
        }
    }

    /// Take ownership of the bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// The C `isspace` set, which includes vertical tab.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Read the whole file at `path`.
pub fn read(path: &Path) -> Result<FileBuffer> {
    let (mut file, len, modified) = open_regular(path)?;
    read_contents(&mut file, path, len, modified)
}

/// Read the whole file at `path` unless it is unchanged.
///
/// With `mtime` given, returns `Ok(None)` without reading when `*mtime` is
/// not older than the file's modification time. Otherwise the file is read
/// and `*mtime` is advanced to the file's modification time.
///
/// A missing file is an error whose [`kind`](crate::Error::kind) is
/// `NotFound`; a directory is [`Error::IsADirectory`].
pub fn read_if_updated(path: &Path, mtime: Option<&mut SystemTime>) -> Result<Option<FileBuffer>> {
    let (mut file, len, modified) = open_regular(path)?;

    if let Some(seen) = mtime.as_deref()
        && *seen >= modified
    {
        debug!(path = %path.display(), "file unchanged, skipping read");
        return Ok(None);
    }

    let buffer = read_contents(&mut file, path, len, modified)?;
    if let Some(seen) = mtime {
        *seen = modified;
    }
    Ok(Some(buffer))
}

/// Open `path`, rejecting directories and files too large to buffer.
fn open_regular(path: &Path) -> Result<(File, usize, SystemTime)> {
    let file = File::open(path).with_path("read file", path)?;
    let metadata = file.metadata().with_path("stat", path)?;

    if metadata.is_dir() {
        return Err(Error::IsADirectory {
            path: path.to_path_buf(),
        });
    }

    let size = metadata.len();
    let len = usize::try_from(size)
        .ok()
        .filter(|len| len.checked_add(1).is_some())
        .ok_or_else(|| Error::FileTooLarge {
            path: path.to_path_buf(),
            size,
        })?;

    let modified = metadata.modified().with_path("stat", path)?;
    Ok((file, len, modified))
}

fn read_contents(file: &mut File, path: &Path, len: usize, modified: SystemTime) -> Result<FileBuffer> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory { size: len })?;
    data.resize(len, 0);
    file.read_exact(&mut data)
        .with_path("read descriptor for", path)?;

    debug!(path = %path.display(), bytes = len, "read file");
    Ok(FileBuffer { data, modified })
}
