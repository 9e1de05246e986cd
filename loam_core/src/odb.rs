//! Loose object database.
//!
//! Objects are written through a [`WriteStream`] that declares its length
//! and kind up front. Bytes are staged in a uniquely named temp file under
//! `objects/` and only moved to `objects/<prefix>/<suffix>` once the stream
//! is finalized, so readers never see a partial object.

use crate::dir::{DEFAULT_DIR_MODE, create_recursive};
use crate::error::{Error, IoResultExt, Result};
use crate::file::{create_temp, move_with_parents};
use crate::object::{CompressionType, HEADER_SIZE, ObjectHeader, ObjectKind};
use crate::oid::{Algorithm, ObjectHasher, ObjectId};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Compression threshold: objects declared at >= 4KB are compressed.
const COMPRESSION_THRESHOLD: u64 = 4096;

/// Prefix for staged objects inside the objects directory.
const TEMP_OBJECT_PREFIX: &str = "tmp_obj";

/// An object read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdbObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

/// A directory of loose objects.
#[derive(Debug)]
pub struct Odb {
    objects_dir: PathBuf,
    algorithm: Algorithm,
}

impl Odb {
    /// Create the objects directory (if needed) and open it.
    pub fn init<P: AsRef<Path>>(objects_dir: P, algorithm: Algorithm) -> Result<Self> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        create_recursive(&objects_dir, None, DEFAULT_DIR_MODE)?;
        Ok(Self {
            objects_dir,
            algorithm,
        })
    }

    /// Open an existing objects directory.
    pub fn open<P: AsRef<Path>>(objects_dir: P, algorithm: Algorithm) -> Result<Self> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        if !objects_dir.is_dir() {
            return Err(Error::invalid_repository(
                &objects_dir,
                "objects directory missing",
            ));
        }
        Ok(Self {
            objects_dir,
            algorithm,
        })
    }

    /// Get the path to an object file given its id.
    ///
    /// Returns: `objects/{prefix}/{suffix}`
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.objects_dir.join(id.prefix()).join(id.suffix())
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn exists(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Start writing an object of exactly `declared_len` bytes.
    pub fn open_wstream(&self, declared_len: u64, kind: ObjectKind) -> Result<WriteStream<'_>> {
        let (file, path) = create_temp(&self.objects_dir.join(TEMP_OBJECT_PREFIX))?;
        let temp = TempObject { path, armed: true };

        let compression = if declared_len >= COMPRESSION_THRESHOLD {
            CompressionType::Zstd
        } else {
            CompressionType::None
        };
        let header = ObjectHeader::new(kind, self.algorithm, compression, declared_len);

        let mut writer = BufWriter::new(file);
        writer
            .write_all(&header.encode())
            .with_path("write", &temp.path)?;

        let sink = match compression {
            CompressionType::None => Sink::Plain(writer),
            CompressionType::Zstd => Sink::Zstd(
                zstd::Encoder::new(writer, 3)
                    .map_err(|e| Error::compression_error(format!("zstd init failed: {}", e)))?,
            ),
        };

        debug!(kind = kind.as_str(), declared_len, "opened write stream");
        Ok(WriteStream {
            odb: self,
            kind,
            declared: declared_len,
            written: 0,
            hasher: ObjectHasher::new(kind, declared_len),
            sink,
            temp,
        })
    }

    /// Write a whole object in one call.
    pub fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId> {
        let mut stream = self.open_wstream(data.len() as u64, kind)?;
        stream.write(data)?;
        stream.finalize()
    }

    /// Read and decode only the header of an object.
    pub fn read_header(&self, id: &ObjectId) -> Result<ObjectHeader> {
        let path = self.object_path(id);
        let mut file = open_object(&path, id)?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf).with_path("read", &path)?;
        ObjectHeader::decode(&buf).map_err(|e| Error::corrupted_object(&path, e.to_string()))
    }

    /// Read an object and verify its content against its id.
    pub fn read(&self, id: &ObjectId) -> Result<OdbObject> {
        let path = self.object_path(id);
        let mut file = open_object(&path, id)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).with_path("read", &path)?;

        let header = ObjectHeader::decode(&bytes)
            .map_err(|e| Error::corrupted_object(&path, e.to_string()))?;
        let payload = &bytes[HEADER_SIZE..];

        let data = match header.compression {
            CompressionType::None => payload.to_vec(),
            CompressionType::Zstd => decompress_zstd(payload)?,
        };

        if data.len() as u64 != header.content_len {
            return Err(Error::corrupted_object(
                &path,
                format!(
                    "Content length mismatch: expected {}, got {}",
                    header.content_len,
                    data.len()
                ),
            ));
        }

        let computed = ObjectId::for_content(header.kind, &data);
        if computed != *id {
            return Err(Error::corrupted_object(
                &path,
                format!("Hash mismatch: expected {}, got {}", id, computed),
            ));
        }

        Ok(OdbObject {
            kind: header.kind,
            data,
        })
    }
}

fn open_object(path: &Path, id: &ObjectId) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::object_not_found(id.to_hex()),
        _ => Error::os("open object", path, e),
    })
}

/// A single-use writer for one object.
///
/// Dropping the stream without calling [`finalize`](Self::finalize) discards
/// the staged bytes.
pub struct WriteStream<'a> {
    odb: &'a Odb,
    kind: ObjectKind,
    declared: u64,
    written: u64,
    hasher: ObjectHasher,
    sink: Sink,
    temp: TempObject,
}

impl WriteStream<'_> {
    /// Append `data` to the object. Writing past the declared length fails.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let total = self.written + data.len() as u64;
        if total > self.declared {
            return Err(Error::size_mismatch(
                format!("{} write stream", self.kind.as_str()),
                self.declared,
                total,
            ));
        }

        self.hasher.update(data);
        self.sink.write_all(data).with_path("write", &self.temp.path)?;
        self.written = total;
        Ok(data.len())
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// The length declared when the stream was opened.
    pub fn declared_len(&self) -> u64 {
        self.declared
    }

    /// Complete the object and move it into place, returning its id.
    ///
    /// Fails with a size mismatch unless exactly the declared number of bytes
    /// was written.
    pub fn finalize(self) -> Result<ObjectId> {
        let WriteStream {
            odb,
            kind,
            declared,
            written,
            hasher,
            sink,
            mut temp,
        } = self;

        if written != declared {
            return Err(Error::size_mismatch(
                format!("{} write stream", kind.as_str()),
                declared,
                written,
            ));
        }

        let mut file = sink.finish().with_path("flush", &temp.path)?;
        file.flush().with_path("flush", &temp.path)?;
        drop(file);

        let id = hasher.finalize();
        let dest = odb.object_path(&id);

        if dest.exists() {
            debug!(%id, "object already present");
            return Ok(id);
        }

        if let Err(e) = move_with_parents(&temp.path, &dest, DEFAULT_DIR_MODE) {
            // Another writer may have placed the same object first
            if dest.exists() {
                return Ok(id);
            }
            return Err(e);
        }
        temp.armed = false;

        debug!(%id, kind = kind.as_str(), len = declared, "wrote object");
        Ok(id)
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Zstd(zstd::Encoder<'static, BufWriter<File>>),
}

impl Sink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.write_all(data),
            Sink::Zstd(w) => w.write_all(data),
        }
    }

    fn finish(self) -> io::Result<File> {
        let writer = match self {
            Sink::Plain(w) => w,
            Sink::Zstd(w) => w.finish()?,
        };
        writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Staged object file, deleted on drop unless moved into place.
struct TempObject {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempObject {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove staged object");
        }
    }
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn staged_files(odb: &Odb) -> usize {
        fs::read_dir(odb.objects_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(TEMP_OBJECT_PREFIX)
            })
            .count()
    }

    fn new_odb(temp_dir: &TempDir) -> Odb {
        Odb::init(temp_dir.path().join("objects"), Algorithm::Blake3).unwrap()
    }

    #[test]
    fn test_write_read_small() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let id = odb.write(ObjectKind::Blob, b"hello world").unwrap();
        assert_eq!(id, ObjectId::for_content(ObjectKind::Blob, b"hello world"));
        assert!(odb.exists(&id));

        let object = odb.read(&id).unwrap();
        assert_eq!(object.kind, ObjectKind::Blob);
        assert_eq!(object.data, b"hello world");

        let header = odb.read_header(&id).unwrap();
        assert_eq!(header.compression, CompressionType::None);
        assert_eq!(header.content_len, 11);
    }

    #[test]
    fn test_write_read_compressed() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let data = vec![0x5Au8; 64 * 1024];
        let mut stream = odb.open_wstream(data.len() as u64, ObjectKind::Blob).unwrap();
        for chunk in data.chunks(1000) {
            assert_eq!(stream.write(chunk).unwrap(), chunk.len());
        }
        let id = stream.finalize().unwrap();

        let header = odb.read_header(&id).unwrap();
        assert_eq!(header.compression, CompressionType::Zstd);
        assert!(fs::metadata(odb.object_path(&id)).unwrap().len() < data.len() as u64);

        assert_eq!(odb.read(&id).unwrap().data, data);
        assert_eq!(staged_files(&odb), 0);
    }

    #[test]
    fn test_write_empty_object() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let stream = odb.open_wstream(0, ObjectKind::Blob).unwrap();
        let id = stream.finalize().unwrap();
        assert!(odb.read(&id).unwrap().data.is_empty());
    }

    #[test]
    fn test_duplicate_write_is_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let id1 = odb.write(ObjectKind::Blob, b"same").unwrap();
        let id2 = odb.write(ObjectKind::Blob, b"same").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(staged_files(&odb), 0);
    }

    #[test]
    fn test_kind_changes_id() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let blob = odb.write(ObjectKind::Blob, b"payload").unwrap();
        let tag = odb.write(ObjectKind::Tag, b"payload").unwrap();
        assert_ne!(blob, tag);
        assert_eq!(odb.read(&tag).unwrap().kind, ObjectKind::Tag);
    }

    #[test]
    fn test_write_past_declared_length() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let mut stream = odb.open_wstream(3, ObjectKind::Blob).unwrap();
        stream.write(b"ab").unwrap();
        let err = stream.write(b"cd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
        assert_eq!(stream.written(), 2);
    }

    #[test]
    fn test_finalize_short_stream_fails_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let mut stream = odb.open_wstream(10, ObjectKind::Blob).unwrap();
        stream.write(b"short").unwrap();
        assert_eq!(staged_files(&odb), 1);

        let err = stream.finalize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
        assert_eq!(staged_files(&odb), 0);
    }

    #[test]
    fn test_dropped_stream_is_released() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        {
            let mut stream = odb.open_wstream(4, ObjectKind::Blob).unwrap();
            stream.write(b"ab").unwrap();
        }
        assert_eq!(staged_files(&odb), 0);
    }

    #[test]
    fn test_read_missing_object() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let id = ObjectId::for_content(ObjectKind::Blob, b"never written");
        let err = odb.read(&id).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_detects_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let odb = new_odb(&temp_dir);

        let id = odb.write(ObjectKind::Blob, b"test").unwrap();
        let path = odb.object_path(&id);
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let err = odb.read(&id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_open_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Odb::open(temp_dir.path().join("nope"), Algorithm::Blake3).is_err());

        new_odb(&temp_dir);
        assert!(Odb::open(temp_dir.path().join("objects"), Algorithm::Blake3).is_ok());
    }
}
