//! Error types for loam_core.
//!
//! Every OS-facing call site wraps its `io::Error` with the operation and the
//! path it touched. Higher layers add context with [`ResultExt::annotate`]
//! instead of replacing the underlying error, so [`Error::kind`] still reports
//! the original category.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using loam_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file, directory or object does not exist.
    NotFound,
    /// Exclusive creation collided with an existing entry.
    AlreadyExists,
    /// Any other operating system failure (permissions, I/O, disk full).
    Os,
    /// Declared and actual byte counts disagree.
    SizeMismatch,
    /// A buffer could not be allocated.
    OutOfMemory,
    /// A path component that must be a directory is not one.
    NotADirectory,
    /// A directory was found where a file was expected.
    IsADirectory,
    /// Non-forced removal hit a non-directory entry.
    DirectoryNotEmpty,
    /// No home-directory environment variable is set.
    HomeNotFound,
    /// Stored data failed validation.
    Corrupt,
    /// Malformed input (ids, config, names).
    Invalid,
}

/// Errors that can occur in filesystem and object database operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An OS call failed on a specific path.
    #[error("Failed to {op} '{}': {source}", path.display())]
    Os {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An OS call on an open handle failed.
    #[error("Failed to {op}: {source}")]
    Op {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// I/O error without path information.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// A named thing was looked up and is absent.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Exclusive creation found the path already present.
    #[error("Path already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// A path component exists but is not a directory.
    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// A directory was given where a file is required.
    #[error("Is a directory: {}", path.display())]
    IsADirectory { path: PathBuf },

    /// Non-forced recursive removal met a file.
    #[error("Failed to remove directory. '{}' is not empty", path.display())]
    DirectoryNotEmpty { path: PathBuf },

    /// Neither HOME nor USERPROFILE is set.
    #[error("Failed to open global {filename} file. Cannot locate the user's home directory")]
    HomeNotFound { filename: String },

    /// The repository has no working directory (bare).
    #[error("No working directory found for repository at {}", path.display())]
    NoWorkdir { path: PathBuf },

    /// Byte counts disagree with what was declared up front.
    #[error("Size mismatch for {what}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        what: String,
        expected: u64,
        actual: u64,
    },

    /// File is too large to be held in a single buffer.
    #[error("File too large to read into memory: {} ({size} bytes)", path.display())]
    FileTooLarge { path: PathBuf, size: u64 },

    /// Allocation failure.
    #[error("Out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },

    /// Unsupported file type for ingestion.
    #[error("Unsupported file type: {}", path.display())]
    UnsupportedFileType { path: PathBuf },

    /// Object file is corrupted or invalid.
    #[error("Corrupted object at {}: {reason}", path.display())]
    CorruptedObject { path: PathBuf, reason: String },

    /// Object header bytes are malformed.
    #[error("Invalid object header: {reason}")]
    InvalidHeader { reason: String },

    /// A working-directory path points outside the working directory.
    #[error("Path escapes the working directory: {}", path.display())]
    PathOutsideWorkdir { path: PathBuf },

    /// Invalid object id format or encoding.
    #[error("Invalid object id: {reason}")]
    InvalidOid { reason: String },

    /// Object not found in the database.
    #[error("Object not found: {id}")]
    ObjectNotFound { id: String },

    /// Repository is invalid or not initialized.
    #[error("Invalid repository at {}: {reason}", path.display())]
    InvalidRepository { path: PathBuf, reason: String },

    /// Invalid object kind.
    #[error("Invalid object type: expected {expected}, got {got}")]
    InvalidObjectType { expected: String, got: String },

    /// Malformed configuration.
    #[error("Invalid config at {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Compression or decompression error.
    #[error("Compression error: {reason}")]
    CompressionError { reason: String },

    /// A lower-level error re-raised with a message.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Classify this error, looking through any context layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Os { source, .. } | Error::Op { source, .. } | Error::Io { source } => {
                match source.kind() {
                    io::ErrorKind::NotFound => ErrorKind::NotFound,
                    io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                    io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
                    io::ErrorKind::NotADirectory => ErrorKind::NotADirectory,
                    io::ErrorKind::IsADirectory => ErrorKind::IsADirectory,
                    io::ErrorKind::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty,
                    _ => ErrorKind::Os,
                }
            }
            Error::NotFound { .. } | Error::NoWorkdir { .. } | Error::ObjectNotFound { .. } => {
                ErrorKind::NotFound
            }
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::NotADirectory { .. } => ErrorKind::NotADirectory,
            Error::IsADirectory { .. } => ErrorKind::IsADirectory,
            Error::DirectoryNotEmpty { .. } => ErrorKind::DirectoryNotEmpty,
            Error::HomeNotFound { .. } => ErrorKind::HomeNotFound,
            Error::SizeMismatch { .. } | Error::FileTooLarge { .. } => ErrorKind::SizeMismatch,
            Error::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Error::CorruptedObject { .. }
            | Error::InvalidHeader { .. }
            | Error::CompressionError { .. } => ErrorKind::Corrupt,
            Error::UnsupportedFileType { .. }
            | Error::PathOutsideWorkdir { .. }
            | Error::InvalidOid { .. }
            | Error::InvalidRepository { .. }
            | Error::InvalidObjectType { .. }
            | Error::InvalidConfig { .. }
            | Error::UnsupportedAlgorithm { .. } => ErrorKind::Invalid,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::NotFound`.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Wrap an `io::Error` with the failing operation and path.
    pub fn os(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Os {
            op,
            path: path.into(),
            source,
        }
    }

    /// Wrap an `io::Error` from a call that has no path, only a handle.
    pub fn op(op: &'static str, source: io::Error) -> Self {
        Error::Op { op, source }
    }

    /// Create an InvalidHeader error.
    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Error::InvalidHeader {
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Create a SizeMismatch error.
    pub fn size_mismatch(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        Error::SizeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidOid error.
    pub fn invalid_oid(reason: impl Into<String>) -> Self {
        Error::InvalidOid {
            reason: reason.into(),
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(id: impl Into<String>) -> Self {
        Error::ObjectNotFound { id: id.into() }
    }

    /// Create an InvalidRepository error.
    pub fn invalid_repository(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidRepository {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidObjectType error.
    pub fn invalid_object_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::InvalidObjectType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create a CompressionError.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::CompressionError {
            reason: reason.into(),
        }
    }

    /// Re-raise this error under an additional message.
    pub fn annotate(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Attach context to a loam_core result.
pub trait ResultExt<T> {
    /// Wrap the error, if any, in an [`Error::Context`] layer.
    fn annotate<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn annotate<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|e| e.annotate(context()))
    }
}

/// Attach an operation and path to a raw `io::Result`.
pub trait IoResultExt<T> {
    fn with_path(self, op: &'static str, path: &Path) -> Result<T>;

    /// Attach only the operation, for calls on an already open handle.
    fn with_op(self, op: &'static str) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|e| Error::os(op, path, e))
    }

    fn with_op(self, op: &'static str) -> Result<T> {
        self.map_err(|e| Error::op(op, e))
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
