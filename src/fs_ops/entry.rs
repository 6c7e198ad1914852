//! Single-entry operations: one file or one directory at a time.
//! Same rules as the tree operations: resolve first, confirm completion after.

use anyhow::{Result, anyhow, bail};
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::TreeSyncError;

use super::helpers::{io_error_with_help, io_error_with_help2};
use super::inspect::move_to_trash;
use super::naming::{EntryKind, unique_copy_name};
use super::perms;
use super::resolve::{resolve_dir, resolve_file, same_entity, shown};
use super::transfer::{copy_contents, relocate_file};
use super::wait::Waiter;

/// Options for [`copy_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    pub overwrite: bool,
    pub permissions: bool,
    pub attributes: bool,
    /// Copying a file onto itself auto-names the copy (`a - Copy.txt`) instead of skipping.
    pub rename_on_same_path: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            permissions: true,
            attributes: true,
            rename_on_same_path: true,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error_with_help("create parent directory", parent))?;
        }
    }
    Ok(())
}

/// Copy one file. Returns where the copy ended up.
pub fn copy_file(config: &Config, src: &Path, dst: &Path, options: CopyOptions) -> Result<PathBuf> {
    let src = resolve_file(src)?;
    let mut dst = resolve_file(dst)?;
    if !src.is_file() {
        return Err(TreeSyncError::SourceNotFound(src).into());
    }

    if same_entity(&src, &dst) {
        if !options.rename_on_same_path {
            debug!(path = %shown(&src), "copy onto itself; skipped");
            return Ok(dst);
        }
        let (Some(dir), Some(name)) = (dst.parent(), dst.file_name()) else {
            bail!("cannot auto-name a copy of '{}'", shown(&src));
        };
        dst = unique_copy_name(dir, name, EntryKind::File);
    }

    ensure_parent(&dst)?;
    let bytes = copy_contents(&src, &dst, options.overwrite)?;
    Waiter::from_config(config).await_unlocked(&dst)?;
    perms::propagate(&dst, &src, options.permissions, options.attributes)?;
    info!(src = %shown(&src), dst = %shown(&dst), bytes, "copied file");
    Ok(dst)
}

/// Copy `src` into `dir` under its own name (creating `dir` if needed).
/// Returns where the copy ended up.
pub fn copy_file_into_dir(config: &Config, src: &Path, dir: &Path, options: CopyOptions) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| anyhow!("source has no file name: {}", src.display()))?;
    copy_file(config, src, &dir.join(name), options)
}

/// Move one file. Returns the destination.
pub fn move_file(config: &Config, src: &Path, dst: &Path, overwrite: bool) -> Result<PathBuf> {
    let src = resolve_file(src)?;
    let dst = resolve_file(dst)?;
    if !src.is_file() {
        return Err(TreeSyncError::SourceNotFound(src).into());
    }
    if same_entity(&src, &dst) {
        return Err(TreeSyncError::SameEntity(dst).into());
    }

    let waiter = Waiter::from_config(config);
    if fs::symlink_metadata(&dst).is_ok() {
        if !overwrite {
            return Err(TreeSyncError::DestinationConflict(dst).into());
        }
        fs::remove_file(&dst).map_err(io_error_with_help("remove existing destination", &dst))?;
        waiter.await_absent(&dst)?;
    }

    ensure_parent(&dst)?;
    relocate_file(&src, &dst)?;
    waiter.await_exists(&dst)?;
    info!(src = %shown(&src), dst = %shown(&dst), "moved file");
    Ok(dst)
}

fn plain_name(new_name: &OsStr) -> Result<()> {
    let mut parts = Path::new(new_name).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(anyhow!("'{}' is not a plain file name", new_name.to_string_lossy())),
    }
}

/// Rename a file or directory in place. Returns the new path.
pub fn rename_entry(config: &Config, path: &Path, new_name: &OsStr) -> Result<PathBuf> {
    plain_name(new_name)?;
    let path = if path.is_dir() { resolve_dir(path)? } else { resolve_file(path)? };
    if fs::symlink_metadata(&path).is_err() {
        return Err(TreeSyncError::SourceNotFound(path).into());
    }
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("cannot rename a root: {}", shown(&path)))?;
    let target = parent.join(new_name);
    if target == path {
        return Ok(target);
    }
    // A case-only rename on a case-insensitive volume is the same entity; let it through.
    if fs::symlink_metadata(&target).is_ok() && !same_entity(&path, &target) {
        return Err(TreeSyncError::DestinationConflict(target).into());
    }

    fs::rename(&path, &target).map_err(io_error_with_help2("rename", &path, &target))?;
    Waiter::from_config(config).await_exists(&target)?;
    info!(from = %shown(&path), to = %shown(&target), "renamed");
    Ok(target)
}

/// Create an empty file (and its parents). An existing file is a conflict.
pub fn create_file(config: &Config, path: &Path) -> Result<PathBuf> {
    let path = resolve_file(path)?;
    ensure_parent(&path)?;
    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(TreeSyncError::DestinationConflict(path).into());
        }
        Err(e) => return Err(io_error_with_help("create file", &path)(e)),
    }
    Waiter::from_config(config).await_exists(&path)?;
    debug!(path = %shown(&path), "created file");
    Ok(path)
}

/// Create a directory and any missing parents.
pub fn create_dir(config: &Config, path: &Path) -> Result<PathBuf> {
    let path = resolve_dir(path)?;
    fs::create_dir_all(&path).map_err(io_error_with_help("create directory", &path))?;
    Waiter::from_config(config).await_exists(&path)?;
    debug!(path = %shown(&path), "created directory");
    Ok(path)
}

/// Delete a file or a whole directory, or relocate it to the trash.
pub fn delete_entry(config: &Config, path: &Path, to_trash: bool) -> Result<()> {
    let path = if path.is_dir() { resolve_dir(path)? } else { resolve_file(path)? };
    let meta = match fs::symlink_metadata(&path) {
        Ok(m) => m,
        Err(_) => return Err(TreeSyncError::SourceNotFound(path).into()),
    };

    if to_trash {
        if !move_to_trash(&path) {
            bail!("could not move '{}' to the trash", shown(&path));
        }
    } else if meta.is_dir() {
        fs::remove_dir_all(&path).map_err(io_error_with_help("remove directory", &path))?;
    } else {
        fs::remove_file(&path).map_err(io_error_with_help("remove file", &path))?;
    }

    Waiter::from_config(config).await_absent(&path)?;
    info!(path = %shown(&path), to_trash, "deleted");
    Ok(())
}
