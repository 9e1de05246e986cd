//! # Loam Core
//!
//! Blob ingestion into a loose object database, on top of a small durable
//! filesystem layer.
//!
//! The filesystem layer covers the operations a version-control style store
//! needs to get right: recursive directory creation and removal, exclusive
//! and temporary file creation, whole-file reads with an mtime cache,
//! read-only memory maps and locating global and system config files.
//!
//! Objects are identified by the BLAKE3 hash of `"<kind> <len>\0"` followed by
//! their content, and are written through a [`WriteStream`] that stages bytes
//! in a temp file until the declared length has been received.
//!
//! ## Example
//!
//! ```no_run
//! use loam_core::Repository;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::init("./my-project", false)?;
//!
//! // Store a file from the working directory
//! let id = repo.create_blob_from_workdir(Path::new("README.md"))?;
//!
//! // Or an in-memory buffer
//! let same = repo.create_blob_from_buffer(&std::fs::read("./my-project/README.md")?)?;
//! assert_eq!(id, same);
//!
//! let blob = repo.lookup_blob(&id)?;
//! println!("{} bytes", blob.raw_size());
//! # Ok(())
//! # }
//! ```

mod blob;
pub mod config;
pub mod dir;
mod error;
pub mod fbuffer;
pub mod file;
pub mod locate;
pub mod map;
mod object;
mod odb;
mod oid;
mod repo;

pub use blob::Blob;
pub use config::{Config, ConfigFile};
pub use error::{Error, ErrorKind, IoResultExt, Result, ResultExt};
pub use fbuffer::FileBuffer;
pub use map::MappedView;
pub use object::{CompressionType, ObjectHeader, ObjectKind};
pub use odb::{Odb, OdbObject, WriteStream};
pub use oid::{Algorithm, ObjectId};
pub use repo::{METADATA_DIR, Repository};
