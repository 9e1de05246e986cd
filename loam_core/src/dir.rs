//! Recursive directory creation and removal.
//!
//! Creation is idempotent: a directory that already exists (or appears while
//! we are creating it) is success, because concurrent writers race to create
//! the same fan-out directories. Neither operation rolls back partial
//! progress.

use crate::error::{Error, IoResultExt, Result, ResultExt};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Default mode for directories created by the object database.
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// Create `path` and every missing parent (`mkdir -p`).
///
/// When `base` is given the directory created is `base/path`, and `base`
/// itself is assumed to exist: only components below it are created. Drive
/// and root prefixes are never created. Each missing component is created
/// with `mode` (ignored on platforms without POSIX permissions).
///
/// A component that exists but is not a directory is a hard
/// [`Error::NotADirectory`]. Directories created before a failure stay.
pub fn create_recursive(path: &Path, base: Option<&Path>, mode: u32) -> Result<()> {
    let (full, skip) = match base {
        Some(base) if !path.is_absolute() => (base.join(path), base.components().count()),
        _ => (path.to_path_buf(), 0),
    };

    let mut current = PathBuf::new();
    for (i, component) in full.components().enumerate() {
        current.push(component);

        if matches!(component, Component::Prefix(_) | Component::RootDir) || i < skip {
            continue;
        }

        make_dir(&current, mode).annotate(|| {
            format!(
                "Failed to recursively create '{}' tree structure",
                full.display()
            )
        })?;
    }

    Ok(())
}

/// Create one directory, treating "already a directory" as success.
fn make_dir(path: &Path, mode: u32) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    match dir_builder(mode).create(path) {
        Ok(()) => {
            debug!(path = %path.display(), mode = %format!("{:o}", mode), "created directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if path.is_dir() {
                Ok(())
            } else {
                Err(Error::NotADirectory {
                    path: path.to_path_buf(),
                })
            }
        }
        Err(e) => Err(Error::os("create directory", path, e)),
    }
}

#[cfg(unix)]
fn dir_builder(mode: u32) -> fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = fs::DirBuilder::new();
    builder.mode(mode);
    builder
}

#[cfg(not(unix))]
fn dir_builder(_mode: u32) -> fs::DirBuilder {
    fs::DirBuilder::new()
}

/// Join `relative` onto `base`, dropping any root or drive prefix from
/// `relative` first so the result always starts with `base`.
pub fn join_under(base: &Path, relative: &Path) -> PathBuf {
    let mut joined = base.to_path_buf();
    for component in relative.components() {
        if !matches!(component, Component::Prefix(_) | Component::RootDir) {
            joined.push(component);
        }
    }
    joined
}

/// Ensure the directory that will hold `file_path` exists.
pub fn mkpath_to_file(file_path: &Path, dir_mode: u32) -> Result<()> {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            create_recursive(parent, None, dir_mode)
        }
        _ => Ok(()),
    }
}

/// Remove `path` and everything below it (`rm -rf` when `force` is set).
///
/// Children are removed before their parent. Symbolic links are removed,
/// never followed. Without `force`, a tree containing any non-directory entry
/// is rejected with [`Error::DirectoryNotEmpty`] before anything is deleted,
/// so only trees made purely of directories are removed.
pub fn remove_recursive(path: &Path, force: bool) -> Result<()> {
    if !force {
        ensure_only_directories(path)?;
    }

    remove_entry(path, force).annotate(|| format!("Failed to remove directory '{}'", path.display()))
}

fn remove_entry(path: &Path, force: bool) -> Result<()> {
    let metadata = fs::symlink_metadata(path).with_path("stat", path)?;

    if metadata.is_dir() {
        for entry in fs::read_dir(path).with_path("read directory", path)? {
            let entry = entry.with_path("read directory", path)?;
            remove_entry(&entry.path(), force)?;
        }
        fs::remove_dir(path).with_path("remove directory", path)?;
        debug!(path = %path.display(), "removed directory");
        Ok(())
    } else if force {
        fs::remove_file(path).with_path("unlink", path)
    } else {
        Err(Error::DirectoryNotEmpty {
            path: path.to_path_buf(),
        })
    }
}

/// Fail with the first directory found to contain a non-directory entry.
fn ensure_only_directories(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).with_path("stat", path)?;
    if !metadata.is_dir() {
        return Err(Error::DirectoryNotEmpty {
            path: path.to_path_buf(),
        });
    }

    for entry in fs::read_dir(path).with_path("read directory", path)? {
        let entry = entry.with_path("read directory", path)?;
        let file_type = entry.file_type().with_path("stat", &entry.path())?;
        if file_type.is_dir() {
            ensure_only_directories(&entry.path())?;
        } else {
            return Err(Error::DirectoryNotEmpty {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}
