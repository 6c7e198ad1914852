//! Single-file transfer primitives shared by tree and entry operations.

use anyhow::{Result, bail};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{debug, trace};

use crate::errors::TreeSyncError;

use super::helpers::{io_error_with_help, io_error_with_help2, is_cross_device};
use super::perms;

/// Copy the bytes (and mode) of `src` to `dst`.
///
/// Without `overwrite` the destination is created exclusively and an existing
/// file is a `DestinationConflict`. With it, an existing read-only destination
/// is made writable first and then replaced.
pub(crate) fn copy_contents(src: &Path, dst: &Path, overwrite: bool) -> Result<u64> {
    if overwrite {
        if let Ok(meta) = fs::symlink_metadata(dst) {
            if meta.is_file() && meta.permissions().readonly() {
                // fs::copy re-applies the source mode afterwards.
                let mut p = meta.permissions();
                p.set_readonly(false);
                fs::set_permissions(dst, p)
                    .map_err(io_error_with_help("make writable", dst))?;
            }
        }
        let n = fs::copy(src, dst).map_err(io_error_with_help2("copy file", src, dst))?;
        trace!(src = %src.display(), dst = %dst.display(), bytes = n, "copied (overwrite)");
        return Ok(n);
    }

    let mut reader = File::open(src).map_err(io_error_with_help("open source", src))?;
    let mut writer = match OpenOptions::new().write(true).create_new(true).open(dst) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(TreeSyncError::DestinationConflict(dst.to_path_buf()).into());
        }
        Err(e) => return Err(io_error_with_help("create destination", dst)(e)),
    };
    let n = io::copy(&mut reader, &mut writer).map_err(io_error_with_help2("copy file", src, dst))?;
    drop(writer);
    // Match fs::copy, which carries the permission bits along.
    let mode = reader
        .metadata()
        .map_err(io_error_with_help("stat source", src))?
        .permissions();
    fs::set_permissions(dst, mode).map_err(io_error_with_help("set permissions", dst))?;
    trace!(src = %src.display(), dst = %dst.display(), bytes = n, "copied");
    Ok(n)
}

/// Rename `src` to `dst`; across devices fall back to copy, mirror metadata, delete.
pub(crate) fn relocate_file(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => {
            trace!(src = %src.display(), dst = %dst.display(), "renamed");
            Ok(())
        }
        Err(e) if is_cross_device(&e) => {
            debug!(src = %src.display(), dst = %dst.display(), "cross-device; copying instead");
            let ft = fs::symlink_metadata(src)
                .map_err(io_error_with_help("stat source", src))?
                .file_type();
            if ft.is_symlink() {
                relink(src, dst)?;
            } else if ft.is_file() {
                copy_contents(src, dst, false)?;
                perms::propagate(dst, src, true, true)?;
            } else {
                bail!("cannot move special file '{}' across devices", src.display());
            }
            remove_link_or_file(src)
        }
        Err(e) => Err(io_error_with_help2("rename", src, dst)(e)),
    }
}

/// Recreate the symlink `src` at `dst` with the same (possibly dangling) target.
fn relink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(io_error_with_help("read link", src))?;
    #[cfg(unix)]
    let made = std::os::unix::fs::symlink(&target, dst);
    #[cfg(windows)]
    let made = {
        let resolved = src.parent().map(|p| p.join(&target)).unwrap_or_else(|| target.clone());
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(&target, dst)
        } else {
            std::os::windows::fs::symlink_file(&target, dst)
        }
    };
    made.map_err(io_error_with_help2("recreate link", src, dst))?;
    trace!(src = %src.display(), dst = %dst.display(), "relinked");
    Ok(())
}

fn remove_link_or_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Directory symlinks on Windows are removed as directories.
        Err(e) if cfg!(windows) && path.is_dir() => {
            fs::remove_dir(path).map_err(|_| io_error_with_help("remove moved source", path)(e))
        }
        Err(e) => Err(io_error_with_help("remove moved source", path)(e)),
    }
}
