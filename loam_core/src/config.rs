//! `key=value` config files and their system/global/repository layering.
//!
//! Format: one `key=value` per line, `#` starts a comment line, blank lines
//! are ignored and whitespace around keys and values is trimmed.

use crate::dir::DEFAULT_DIR_MODE;
use crate::error::{Error, ErrorKind, IoResultExt, Result, ResultExt};
use crate::fbuffer::{self, FileBuffer};
use crate::file::{DEFAULT_FILE_MODE, create_locked_with_parents, move_with_parents};
use crate::locate::{find_global, find_system};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// System-wide config file name, looked up under the system config root.
pub const SYSTEM_CONFIG_NAME: &str = "loamconfig";

/// Per-user config file name, looked up in the home directory.
pub const GLOBAL_CONFIG_NAME: &str = ".loamconfig";

/// One config file and its parsed entries.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    mtime: SystemTime,
}

impl ConfigFile {
    /// An empty config that will be written to `path` on [`save`](Self::save).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
            mtime: SystemTime::UNIX_EPOCH,
        }
    }

    /// Load and parse the config at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let buffer = fbuffer::read(&path)?;
        let mtime = buffer.modified();
        let entries = parse(&path, buffer)?;

        Ok(Self {
            path,
            entries,
            mtime,
        })
    }

    /// Re-read the file if it changed on disk since the last read.
    ///
    /// Returns whether the entries were reloaded.
    pub fn refresh(&mut self) -> Result<bool> {
        let mut mtime = self.mtime;
        match fbuffer::read_if_updated(&self.path, Some(&mut mtime))? {
            Some(buffer) => {
                self.entries = parse(&self.path, buffer)?;
                self.mtime = mtime;
                debug!(path = %self.path.display(), "reloaded config");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set a value in memory. Call [`save`](Self::save) to persist it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write the entries back through `<path>.lock`.
    ///
    /// The lock file is created exclusively, so a concurrent saver fails with
    /// `AlreadyExists` instead of interleaving writes.
    pub fn save(&mut self) -> Result<()> {
        let lock = LockFile::acquire(&self.path)?;

        let mut contents = String::new();
        for (key, value) in &self.entries {
            contents.push_str(key);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }

        lock.commit(contents.as_bytes())?;

        self.mtime = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .with_path("stat", &self.path)?;
        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }
}

fn parse(path: &Path, mut buffer: FileBuffer) -> Result<BTreeMap<String, String>> {
    buffer.trim_end_whitespace();
    let content = std::str::from_utf8(buffer.as_bytes())
        .map_err(|e| Error::invalid_config(path, format!("not UTF-8: {}", e)))?;

    let mut entries = BTreeMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::invalid_config(path, format!("line {}: expected key=value", number + 1))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(Error::invalid_config(
                path,
                format!("line {}: empty key", number + 1),
            ));
        }
        entries.insert(key.to_string(), value.trim().to_string());
    }

    Ok(entries)
}

/// An exclusively created `<target>.lock`, removed on drop unless committed.
struct LockFile {
    target: PathBuf,
    path: PathBuf,
    file: Option<fs::File>,
}

impl LockFile {
    fn acquire(target: &Path) -> Result<Self> {
        let mut name = OsString::from(target.as_os_str());
        name.push(".lock");
        let path = PathBuf::from(name);

        let file = create_locked_with_parents(&path, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE)
            .annotate(|| format!("Failed to lock '{}'", target.display()))?;

        Ok(Self {
            target: target.to_path_buf(),
            path,
            file: Some(file),
        })
    }

    fn commit(mut self, contents: &[u8]) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.write_all(contents).with_path("write", &self.path)?;
            file.flush().with_path("flush", &self.path)?;
        }
        move_with_parents(&self.path, &self.target, DEFAULT_DIR_MODE)?;
        self.file = None;
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.path.as_os_str().is_empty()
            && let Err(e) = fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

/// System, global and repository config files, later layers winning.
#[derive(Debug, Clone, Default)]
pub struct Config {
    layers: Vec<ConfigFile>,
}

impl Config {
    /// Load the system and global configs (when present) and then the
    /// repository config at `repo_config`.
    ///
    /// Missing system or global files, or an unknown home directory, are
    /// skipped.
    pub fn load(repo_config: &Path) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(path) = find_system(SYSTEM_CONFIG_NAME) {
            layers.push(ConfigFile::open(path)?);
        }

        match find_global(GLOBAL_CONFIG_NAME) {
            Ok(Some(path)) => layers.push(ConfigFile::open(path)?),
            Ok(None) => {}
            Err(e) if e.kind() == ErrorKind::HomeNotFound => {
                debug!(error = %e, "skipping global config");
            }
            Err(e) => return Err(e),
        }

        layers.push(ConfigFile::open(repo_config)?);
        Ok(Self { layers })
    }

    /// Build a config from explicit layers, lowest priority first.
    pub fn from_layers(layers: Vec<ConfigFile>) -> Self {
        Self { layers }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers.iter().rev().find_map(|layer| layer.get(key))
    }

    /// Paths of the files that were loaded, lowest priority first.
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.layers.iter().map(ConfigFile::path)
    }

    /// Refresh every layer; returns whether any reloaded.
    pub fn refresh(&mut self) -> Result<bool> {
        let mut changed = false;
        for layer in &mut self.layers {
            changed |= layer.refresh()?;
        }
        Ok(changed)
    }
}
