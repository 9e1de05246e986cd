//! Repository layout and lifecycle.

use crate::config::{Config, ConfigFile};
use crate::dir::{DEFAULT_DIR_MODE, create_recursive};
use crate::error::{Error, Result};
use crate::odb::Odb;
use crate::oid::Algorithm;
use std::path::{Path, PathBuf};

/// Metadata directory inside a working directory.
pub const METADATA_DIR: &str = ".loam";

/// Current repository format version.
const FORMAT_VERSION: &str = "1";

/// A repository: an object database plus an optional working directory.
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    workdir: Option<PathBuf>,
    odb: Odb,
    config: ConfigFile,
}

impl Repository {
    /// Initialize a new repository at the given path.
    ///
    /// A non-bare repository keeps its metadata in `<path>/.loam/` and uses
    /// `<path>` as the working directory. A bare repository keeps its
    /// metadata directly in `<path>` and has no working directory.
    ///
    /// Creates:
    /// - `objects/` for loose objects
    /// - `config` with version, algorithm and bareness
    pub fn init<P: AsRef<Path>>(path: P, bare: bool) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let (meta, workdir) = if bare {
            (root, None)
        } else {
            (root.join(METADATA_DIR), Some(root))
        };

        create_recursive(&meta, None, DEFAULT_DIR_MODE)?;

        let algorithm = Algorithm::Blake3;
        let odb = Odb::init(meta.join("objects"), algorithm)?;

        let mut config = ConfigFile::new(meta.join("config"));
        config.set("version", FORMAT_VERSION);
        config.set("algo", algorithm.as_str());
        config.set("bare", bare.to_string());
        config.save()?;

        Ok(Self {
            path: meta,
            workdir,
            odb,
            config,
        })
    }

    /// Open an existing repository.
    ///
    /// `path` may be a working directory containing `.loam/` or a metadata
    /// directory (bare or not).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::invalid_repository(path, "directory does not exist"));
        }

        let meta = if path.join(METADATA_DIR).is_dir() {
            path.join(METADATA_DIR)
        } else {
            path.to_path_buf()
        };

        let config_path = meta.join("config");
        if !config_path.is_file() {
            return Err(Error::invalid_repository(path, "config file not found"));
        }

        let config = ConfigFile::open(&config_path)?;
        let algorithm = Self::validate_config(&meta, &config)?;

        let bare = match config.get("bare") {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => {
                return Err(Error::invalid_config(
                    &config_path,
                    format!("bare must be true or false, got {:?}", other),
                ));
            }
        };

        let workdir = if bare {
            None
        } else {
            meta.parent().map(Path::to_path_buf)
        };

        let odb = Odb::open(meta.join("objects"), algorithm)?;

        Ok(Self {
            path: meta,
            workdir,
            odb,
            config,
        })
    }

    /// Check the format version and return the configured algorithm.
    fn validate_config(meta: &Path, config: &ConfigFile) -> Result<Algorithm> {
        match config.get("version") {
            Some(FORMAT_VERSION) => {}
            other => {
                return Err(Error::invalid_repository(
                    meta,
                    format!("Unsupported config version: {:?}", other),
                ));
            }
        }

        let algo = config
            .get("algo")
            .ok_or_else(|| Error::invalid_repository(meta, "Missing algo in config"))?;
        Algorithm::parse(algo)
    }

    /// The metadata directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The working directory, or `None` for a bare repository.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.workdir.is_none()
    }

    pub fn odb(&self) -> &Odb {
        &self.odb
    }

    /// The repository's own config file.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigFile {
        &mut self.config
    }

    /// System, global and repository config layered together.
    pub fn layered_config(&self) -> Result<Config> {
        Config::load(self.config.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_init_non_bare() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path(), false).unwrap();

        assert_eq!(repo.path(), temp_dir.path().join(METADATA_DIR));
        assert_eq!(repo.workdir(), Some(temp_dir.path()));
        assert!(!repo.is_bare());
        assert!(temp_dir.path().join(".loam/objects").is_dir());

        let config = fs::read_to_string(temp_dir.path().join(".loam/config")).unwrap();
        assert!(config.contains("version=1"));
        assert!(config.contains("algo=blake3-256"));
        assert!(config.contains("bare=false"));
    }

    #[test]
    fn test_init_bare() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("store.loam");
        let repo = Repository::init(&root, true).unwrap();

        assert_eq!(repo.path(), root);
        assert!(repo.workdir().is_none());
        assert!(root.join("objects").is_dir());
    }

    #[test]
    fn test_open_from_workdir_and_metadata_dir() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path(), false).unwrap();

        let repo = Repository::open(temp_dir.path()).unwrap();
        assert_eq!(repo.workdir(), Some(temp_dir.path()));

        let repo = Repository::open(temp_dir.path().join(METADATA_DIR)).unwrap();
        assert_eq!(repo.workdir(), Some(temp_dir.path()));
    }

    #[test]
    fn test_open_bare() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path(), true).unwrap();

        let repo = Repository::open(temp_dir.path()).unwrap();
        assert!(repo.is_bare());
    }

    #[test]
    fn test_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Repository::open(temp_dir.path().join("nonexistent")).is_err());
    }

    #[test]
    fn test_open_invalid_no_config() {
        let temp_dir = TempDir::new().unwrap();
        let err = Repository::open(temp_dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_open_invalid_version() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path(), true).unwrap();
        fs::write(
            temp_dir.path().join("config"),
            "version=99\nalgo=blake3-256\n",
        )
        .unwrap();

        assert!(Repository::open(temp_dir.path()).is_err());
    }

    #[test]
    fn test_open_missing_algo() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path(), true).unwrap();
        fs::write(temp_dir.path().join("config"), "version=1\n").unwrap();

        assert!(Repository::open(temp_dir.path()).is_err());
    }

    #[test]
    fn test_config_roundtrip_through_repository() {
        let _guard = crate::locate::ENV_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let mut repo = Repository::init(temp_dir.path(), false).unwrap();

        repo.config_mut().set("user.name", "tester");
        repo.config_mut().save().unwrap();

        let reopened = Repository::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.config().get("user.name"), Some("tester"));
        assert_eq!(
            reopened.layered_config().unwrap().get("user.name"),
            Some("tester")
        );
    }
}
