//! Locating global (per-user) and system-wide config files.

use crate::dir::join_under;
use crate::error::{Error, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// System configuration root on POSIX systems.
pub const SYSTEM_CONFIG_ROOT: &str = "/etc";

/// Installation-relative system root used where `/etc` does not exist.
pub const WINDOWS_SYSTEM_ROOT_TEMPLATE: &str = r"%PROGRAMFILES%\Loam\etc\";

static WINDOWS_SYSTEM_ROOT: InitOnce<String> = InitOnce::new();

/// Find `filename` in the user's home directory.
///
/// Returns `Ok(None)` when the home directory is known but the file does not
/// exist there, and [`Error::HomeNotFound`] when no home directory variable
/// is set.
pub fn find_global(filename: &str) -> Result<Option<PathBuf>> {
    find_global_in(filename, |key| env::var_os(key))
}

fn find_global_in(
    filename: &str,
    lookup: impl Fn(&str) -> Option<OsString>,
) -> Result<Option<PathBuf>> {
    let home = lookup("HOME")
        .filter(|h| !h.is_empty())
        .or_else(|| {
            if cfg!(windows) {
                lookup("USERPROFILE").filter(|h| !h.is_empty())
            } else {
                None
            }
        })
        .ok_or_else(|| Error::HomeNotFound {
            filename: filename.to_string(),
        })?;

    let path = join_under(Path::new(&home), Path::new(filename));
    if path.exists() {
        Ok(Some(path))
    } else {
        debug!(path = %path.display(), "global config file not present");
        Ok(None)
    }
}

/// Find `filename` under the system configuration root.
///
/// Tries [`SYSTEM_CONFIG_ROOT`] first. On Windows, falls back to the
/// directory named by [`WINDOWS_SYSTEM_ROOT_TEMPLATE`]. The returned path
/// always uses `/` separators.
pub fn find_system(filename: &str) -> Option<PathBuf> {
    let relative = filename.trim_start_matches(['/', '\\']);
    if relative.is_empty() {
        return None;
    }

    let path = Path::new(SYSTEM_CONFIG_ROOT).join(relative);
    if path.exists() {
        return Some(path);
    }

    if cfg!(windows) {
        windows_find_system_file(relative)
    } else {
        None
    }
}

fn windows_find_system_file(relative: &str) -> Option<PathBuf> {
    let root = match WINDOWS_SYSTEM_ROOT.get_or_try_init(|| {
        expand_env_template(WINDOWS_SYSTEM_ROOT_TEMPLATE, |key| env::var(key).ok())
    }) {
        Ok(root) => root,
        Err(e) => {
            debug!(error = %e, "could not resolve system config root");
            return None;
        }
    };

    let native = to_native_separators(&format!("{}{}", root, relative));
    if !Path::new(&native).exists() {
        return None;
    }

    Some(PathBuf::from(to_posix_separators(&native)))
}

/// Expand `%NAME%` references in `template`.
///
/// An unset variable is an error rather than being left unexpanded, so a
/// failed expansion is never cached as a usable root. `%%` and an unmatched
/// `%` are copied through.
pub fn expand_env_template(
    template: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = &after[..end];
        if name.is_empty() {
            out.push_str("%%");
        } else {
            let value = lookup(name).ok_or_else(|| {
                Error::not_found(format!("environment variable '{}'", name))
            })?;
            out.push_str(&value);
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn to_native_separators(path: &str) -> String {
    path.replace('/', "\\")
}

fn to_posix_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// A lazily initialized value whose initializer may fail.
///
/// The first successful initialization wins and is kept for the process
/// lifetime. A failed attempt stores nothing, so the next call retries.
pub(crate) struct InitOnce<T> {
    cell: OnceLock<T>,
}

impl<T> InitOnce<T> {
    pub(crate) const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub(crate) fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<&T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let value = init()?;
        Ok(self.cell.get_or_init(|| value))
    }
}

/// Held by tests that read or modify process environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
