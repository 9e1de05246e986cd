//! Read-only memory mappings over open files.

use crate::error::{IoResultExt, Result};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Deref;

/// A shared, read-only view of `len` bytes of a file starting at `offset`.
///
/// The file must not be truncated while the view is alive; reading a page
/// past the new end of file faults.
#[derive(Debug)]
pub struct MappedView {
    map: Mmap,
    offset: u64,
}

impl MappedView {
    /// Map `len` bytes of `file` starting at `offset`.
    pub fn map_readonly(file: &File, offset: u64, len: usize) -> Result<Self> {
        // Safety: the mapping is read-only and shared; callers guarantee the
        // file is not shrunk while the view exists.
        let map = unsafe { MmapOptions::new().offset(offset).len(len).map(file) }
            .with_op("map file")?;
        Ok(Self { map, offset })
    }

    /// Byte offset into the file where the view begins.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Release the mapping. Equivalent to dropping the view.
    pub fn unmap(self) {
        drop(self)
    }
}

impl Deref for MappedView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl AsRef<[u8]> for MappedView {
    fn as_ref(&self) -> &[u8] {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_map_whole_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("packed");
        fs::write(&path, b"mapped bytes").unwrap();

        let file = File::open(&path).unwrap();
        let view = MappedView::map_readonly(&file, 0, 12).unwrap();
        assert_eq!(&view[..], b"mapped bytes");
        view.unmap();
    }

    #[test]
    fn test_map_range() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big");
        let mut data = vec![0u8; 3 * 4096];
        data[8192..8196].copy_from_slice(b"page");
        fs::write(&path, &data).unwrap();

        let file = File::open(&path).unwrap();
        // Unaligned offsets are accepted and adjusted internally
        let view = MappedView::map_readonly(&file, 8192, 4).unwrap();
        assert_eq!(view.as_ref(), b"page");
        assert_eq!(view.offset(), 8192);

        let view = MappedView::map_readonly(&file, 8193, 3).unwrap();
        assert_eq!(&view[..], b"age");
    }

    #[test]
    #[cfg(unix)]
    fn test_map_write_only_handle_names_operation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("write-only");
        fs::write(&path, b"data").unwrap();

        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        let err = MappedView::map_readonly(&file, 0, 4).unwrap_err();
        assert!(err.to_string().starts_with("Failed to map file"));
    }
}
