//! Path resolution.
//! - Makes paths absolute and lexically normal (no symlink resolution).
//! - Adds the `\\?\` escape on Windows once a path outgrows the legacy limits.
//! - Decides whether two paths name the same filesystem entity.

use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use std::ffi::OsString;
use std::path::{Display, Path, PathBuf};

use super::naming::EntryKind;

/// Longest directory path usable without the escape prefix.
pub const MAX_DIR_PATH: usize = 247;
/// Longest file path usable without the escape prefix.
pub const MAX_FILE_PATH: usize = 259;

const LONG_PATH_PREFIX: &str = r"\\?\";

fn limit_for(kind: EntryKind) -> usize {
    match kind {
        EntryKind::Dir => MAX_DIR_PATH,
        EntryKind::File => MAX_FILE_PATH,
    }
}

/// Prefix `\\?\` when `path` is longer than the limit for `kind` and not already
/// a UNC or extended path. Pure string rule, available on every platform.
pub fn extend_long_path(path: &Path, kind: EntryKind) -> PathBuf {
    let text = path.as_os_str().to_string_lossy();
    if text.chars().count() <= limit_for(kind) || text.starts_with(r"\\") {
        return path.to_path_buf();
    }
    let mut out = OsString::from(LONG_PATH_PREFIX);
    out.push(path.as_os_str());
    PathBuf::from(out)
}

fn resolve(path: &Path, kind: EntryKind) -> Result<PathBuf> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Ok(path.to_path_buf());
    }
    if path.as_os_str().to_string_lossy().starts_with(LONG_PATH_PREFIX) {
        return Ok(path.to_path_buf());
    }
    let absolute = path
        .absolutize()
        .with_context(|| format!("resolve path '{}'", path.display()))?
        .into_owned();
    if cfg!(windows) {
        Ok(extend_long_path(&absolute, kind))
    } else {
        Ok(absolute)
    }
}

/// Resolve a directory path.
pub fn resolve_dir(path: &Path) -> Result<PathBuf> {
    resolve(path, EntryKind::Dir)
}

/// Resolve a file path.
pub fn resolve_file(path: &Path) -> Result<PathBuf> {
    resolve(path, EntryKind::File)
}

/// Human-friendly rendering of a resolved path (escape prefix stripped).
pub fn shown(path: &Path) -> Display<'_> {
    dunce::simplified(path).display()
}

fn lexical_key(path: &Path) -> String {
    let plain = dunce::simplified(path).to_string_lossy().into_owned();
    let trimmed = plain.trim_end_matches(['/', '\\']);
    let trimmed = if trimmed.is_empty() { plain.as_str() } else { trimmed };
    if cfg!(any(windows, target_os = "macos")) {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Whether `a` and `b` name the same entity.
///
/// Unix compares device/inode when both exist; otherwise the resolved paths
/// are compared lexically (case-insensitive on Windows and macOS).
pub fn same_entity(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let (Ok(ma), Ok(mb)) = (std::fs::metadata(a), std::fs::metadata(b)) {
            return ma.dev() == mb.dev() && ma.ino() == mb.ino();
        }
    }
    lexical_key(a) == lexical_key(b)
}
