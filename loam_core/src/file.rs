//! File creation primitives.
//!
//! [`create_locked_with_parents`] is the only coordination primitive this
//! layer offers: of any number of concurrent callers for one path, exactly
//! one succeeds. Lock files and loose-object staging are built on it and on
//! [`create_temp`].

use crate::dir::mkpath_to_file;
use crate::error::{Error, IoResultExt, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default mode for regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Placeholder appended to temp-file prefixes; the random part replaces the
/// trailing run of `X`.
pub const TEMP_SUFFIX_TEMPLATE: &str = "_loam_XXXXXX";

/// Create (or truncate) `path` for writing, creating parent directories.
pub fn create_with_parents(path: &Path, dir_mode: u32, mode: u32) -> Result<File> {
    mkpath_to_file(path, dir_mode)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    set_mode(&mut options, mode);

    options.open(path).with_path("create file", path)
}

/// Create `path` exclusively. Fails with [`Error::AlreadyExists`] when any
/// entry is already present at `path`.
pub fn create_locked(path: &Path, mode: u32) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    set_mode(&mut options, mode);

    match options.open(path) {
        Ok(file) => {
            debug!(path = %path.display(), "created locked file");
            Ok(file)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::AlreadyExists {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(Error::os("create locked file", path, e)),
    }
}

/// [`create_locked`] after creating parent directories.
pub fn create_locked_with_parents(path: &Path, dir_mode: u32, mode: u32) -> Result<File> {
    mkpath_to_file(path, dir_mode)?;
    create_locked(path, mode)
}

/// Create a uniquely named file next to `prefix`.
///
/// The name is `prefix` followed by [`TEMP_SUFFIX_TEMPLATE`] with its
/// placeholder filled in. The file is not deleted automatically; the caller
/// owns both the handle and the returned path.
pub fn create_temp(prefix: &Path) -> Result<(File, PathBuf)> {
    let dir = match prefix.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let fixed = TEMP_SUFFIX_TEMPLATE.trim_end_matches('X');
    let random_len = TEMP_SUFFIX_TEMPLATE.len() - fixed.len();

    let template = format!("{}{}", stem, TEMP_SUFFIX_TEMPLATE);
    let named = tempfile::Builder::new()
        .prefix(&format!("{}{}", stem, fixed))
        .rand_bytes(random_len)
        .tempfile_in(dir)
        .with_path("create temporary file", &dir.join(template))?;

    let (file, path) = named.keep()?;
    debug!(path = %path.display(), "created temporary file");
    Ok((file, path))
}

/// Rename `from` to `to`, creating the parent directories of `to` first.
pub fn move_with_parents(from: &Path, to: &Path, dir_mode: u32) -> Result<()> {
    mkpath_to_file(to, dir_mode)?;
    fs::rename(from, to).with_path("rename", from)
}

/// Size of an open file in bytes.
pub fn file_size(file: &File) -> Result<u64> {
    Ok(file.metadata().with_op("stat open file")?.len())
}

#[cfg(unix)]
fn set_mode(options: &mut OpenOptions, mode: u32) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(mode);
}

#[cfg(not(unix))]
fn set_mode(_options: &mut OpenOptions, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::DEFAULT_DIR_MODE;
    use crate::error::ErrorKind;
    use std::io::Write;
    use std::sync::Barrier;
    use tempfile::TempDir;

    #[test]
    fn test_create_with_parents_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("deep/er/file.txt");

        let mut file = create_with_parents(&path, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE).unwrap();
        file.write_all(b"first version").unwrap();
        drop(file);

        let mut file = create_with_parents(&path, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE).unwrap();
        file.write_all(b"v2").unwrap();
        drop(file);

        assert_eq!(fs::read(&path).unwrap(), b"v2");
    }

    #[test]
    fn test_create_locked_rejects_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.lock");

        create_locked(&path, DEFAULT_FILE_MODE).unwrap();
        let err = create_locked(&path, DEFAULT_FILE_MODE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_create_locked_with_parents_race() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("refs/heads/main.lock");
        let barrier = Barrier::new(2);

        let results: Vec<Result<File>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        create_locked_with_parents(&path, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let failure = results.into_iter().find_map(|r| r.err()).unwrap();
        assert_eq!(failure.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_create_temp_names_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let prefix = temp_dir.path().join("object");

        let (_f1, p1) = create_temp(&prefix).unwrap();
        let (_f2, p2) = create_temp(&prefix).unwrap();

        assert_ne!(p1, p2);
        assert!(p1.exists());
        assert!(p2.exists());

        let name = p1.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("object_loam_"));
        assert_eq!(name.len(), "object".len() + TEMP_SUFFIX_TEMPLATE.len());
        assert_eq!(p1.parent().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_create_temp_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let prefix = temp_dir.path().join("missing/object");

        let err = create_temp(&prefix).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_move_with_parents() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("staged");
        fs::write(&from, b"payload").unwrap();

        let to = temp_dir.path().join("ab/cdef");
        move_with_parents(&from, &to, DEFAULT_DIR_MODE).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"payload");
    }

    #[test]
    fn test_file_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sized");
        fs::write(&path, vec![7u8; 1234]).unwrap();

        let file = File::open(&path).unwrap();
        assert_eq!(file_size(&file).unwrap(), 1234);
    }
}
