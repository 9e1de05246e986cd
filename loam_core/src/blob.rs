//! Blob ingestion: buffers, working-directory files and symbolic links.

use crate::dir::join_under;
use crate::error::{Error, IoResultExt, Result, ResultExt};
use crate::object::ObjectKind;
use crate::odb::WriteStream;
use crate::oid::ObjectId;
use crate::repo::Repository;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path};
use tracing::debug;

/// Read buffer size when streaming a file into the object database.
const READ_CHUNK_SIZE: usize = 8192;

/// A blob loaded from the object database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    id: ObjectId,
    data: Vec<u8>,
}

impl Blob {
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn raw_content(&self) -> &[u8] {
        &self.data
    }

    pub fn raw_size(&self) -> usize {
        self.data.len()
    }
}

impl Repository {
    /// Store `content` as a blob.
    pub fn create_blob_from_buffer(&self, content: &[u8]) -> Result<ObjectId> {
        let mut stream = self
            .odb()
            .open_wstream(content.len() as u64, ObjectKind::Blob)
            .annotate(|| "Failed to create blob")?;

        stream.write(content).annotate(|| "Failed to create blob")?;
        stream.finalize().annotate(|| "Failed to create blob")
    }

    /// Store the file or symbolic link at `relative` (under the working
    /// directory) as a blob.
    ///
    /// A leading root in `relative` is ignored and `..` components are
    /// rejected, so the path always resolves inside the working directory.
    /// A symbolic link is stored as its target path, never followed. A
    /// regular file is streamed in fixed-size chunks; if its size changes
    /// while it is being read the ingestion fails.
    pub fn create_blob_from_workdir(&self, relative: &Path) -> Result<ObjectId> {
        let workdir = self.workdir().ok_or_else(|| {
            Error::NoWorkdir {
                path: self.path().to_path_buf(),
            }
            .annotate("Failed to create blob")
        })?;

        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::PathOutsideWorkdir {
                path: relative.to_path_buf(),
            }
            .annotate("Failed to create blob"));
        }

        let full_path = join_under(workdir, relative);
        self.create_blob_from_fs(&full_path)
            .annotate(|| format!("Failed to create blob from '{}'", relative.display()))
    }

    fn create_blob_from_fs(&self, path: &Path) -> Result<ObjectId> {
        let metadata = fs::symlink_metadata(path).with_path("stat blob", path)?;
        let size = metadata.len();
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            let target = read_link_bytes(path)?;
            if cfg!(unix) && target.len() as u64 != size {
                return Err(Error::size_mismatch(
                    format!("symlink '{}'", path.display()),
                    size,
                    target.len() as u64,
                ));
            }
            debug!(path = %path.display(), "ingesting symlink target");
            self.create_blob_from_buffer(&target)
        } else if file_type.is_file() {
            let mut file = File::open(path).with_path("open", path)?;
            let mut stream = self.odb().open_wstream(size, ObjectKind::Blob)?;
            stream_exact(&mut stream, &mut file, path)?;
            debug!(path = %path.display(), size, "ingested file");
            stream.finalize()
        } else if file_type.is_dir() {
            Err(Error::IsADirectory {
                path: path.to_path_buf(),
            })
        } else {
            Err(Error::UnsupportedFileType {
                path: path.to_path_buf(),
            })
        }
    }

    /// Load a blob by id.
    pub fn lookup_blob(&self, id: &ObjectId) -> Result<Blob> {
        let object = self.odb().read(id)?;
        if object.kind != ObjectKind::Blob {
            return Err(Error::invalid_object_type(
                ObjectKind::Blob.as_str(),
                object.kind.as_str(),
            ));
        }
        Ok(Blob {
            id: *id,
            data: object.data,
        })
    }
}

/// Copy exactly the stream's declared length from `reader`.
///
/// The source ending early, or still having bytes once the declared length
/// is reached, is a size mismatch.
fn stream_exact<R: Read>(stream: &mut WriteStream<'_>, reader: &mut R, path: &Path) -> Result<()> {
    let declared = stream.declared_len();
    let mut buf = [0u8; READ_CHUNK_SIZE];

    while stream.written() < declared {
        let want = (declared - stream.written()).min(READ_CHUNK_SIZE as u64) as usize;
        let n = read_retrying(reader, &mut buf[..want]).with_path("read", path)?;
        if n == 0 {
            return Err(Error::size_mismatch(
                format!("file '{}' (shrank while reading)", path.display()),
                declared,
                stream.written(),
            ));
        }
        stream.write(&buf[..n])?;
    }

    let mut extra = 0u64;
    loop {
        let n = read_retrying(reader, &mut buf).with_path("read", path)?;
        if n == 0 {
            break;
        }
        extra += n as u64;
    }
    if extra > 0 {
        return Err(Error::size_mismatch(
            format!("file '{}' (grew while reading)", path.display()),
            declared,
            declared + extra,
        ));
    }

    Ok(())
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(unix)]
fn read_link_bytes(path: &Path) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    let target = fs::read_link(path).with_path("read symlink", path)?;
    Ok(target.as_os_str().as_bytes().to_vec())
}

#[cfg(not(unix))]
fn read_link_bytes(path: &Path) -> Result<Vec<u8>> {
    let target = fs::read_link(path).with_path("read symlink", path)?;
    Ok(target.to_string_lossy().replace('\\', "/").into_bytes())
}
