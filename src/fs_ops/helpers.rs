//! I/O helper utilities.
//!
//! Adapters that attach operation/path context and platform-aware hints to an
//! `io::Error` while keeping the original error reachable through
//! `downcast_ref::<io::Error>()`.
//!
//! Usage:
//!   fs::create_dir_all(dir).map_err(io_error_with_help("create directory", dir))?;

use std::io;
use std::path::Path;

/// Short hint for a raw OS error code, if we have one.
fn hint_for(e: &io::Error) -> Option<&'static str> {
    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            let hint = match code {
                libc::EACCES | libc::EPERM => Some("permission denied; check ownership and modes"),
                libc::EXDEV => Some("cross-filesystem; rename not possible"),
                libc::EBUSY => Some("resource busy; another process is using it"),
                libc::ENOENT => Some("path not found; verify it exists"),
                libc::EEXIST => Some("already exists"),
                libc::ENOTEMPTY => Some("directory not empty"),
                libc::ENOSPC => Some("insufficient space on device"),
                libc::EROFS => Some("read-only filesystem"),
                libc::ENAMETOOLONG => Some("filename or path too long"),
                libc::EMFILE | libc::ENFILE => Some("too many open files"),
                _ => None,
            };
            if hint.is_some() {
                return hint;
            }
        }
        #[cfg(windows)]
        {
            let hint = match code {
                5 => Some("access denied; check permissions"),
                2 | 3 => Some("path not found; verify it exists"),
                17 => Some("not same device; cross-filesystem move"),
                32 => Some("sharing violation; file is in use"),
                33 => Some("lock violation; part of the file is locked"),
                80 | 183 => Some("already exists"),
                112 => Some("insufficient disk space"),
                145 => Some("directory not empty"),
                206 => Some("filename or path too long"),
                _ => None,
            };
            if hint.is_some() {
                return hint;
            }
        }
    }
    match e.kind() {
        io::ErrorKind::PermissionDenied => Some("permission denied"),
        io::ErrorKind::NotFound => Some("path not found"),
        io::ErrorKind::AlreadyExists => Some("already exists"),
        _ => None,
    }
}

fn build_message(op: &str, path: &Path) -> String {
    format!("{} '{}'", op, path.display())
}

/// Adapter for anyhow::Result code.
/// Returns a closure suitable for `.map_err(...)`; the io::Error stays the root cause.
pub fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| {
        let msg = match hint_for(&e) {
            Some(hint) => format!("{} ({hint})", build_message(op, path)),
            None => build_message(op, path),
        };
        anyhow::Error::new(e).context(msg)
    }
}

/// Same as [`io_error_with_help`] for two-path operations (rename, copy).
pub fn io_error_with_help2<'a>(
    op: &'a str,
    from: &'a Path,
    to: &'a Path,
) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| {
        let base = format!("{} '{}' -> '{}'", op, from.display(), to.display());
        let msg = match hint_for(&e) {
            Some(hint) => format!("{base} ({hint})"),
            None => base,
        };
        anyhow::Error::new(e).context(msg)
    }
}

/// True when the failure was a cross-device rename (EXDEV / ERROR_NOT_SAME_DEVICE).
pub(crate) fn is_cross_device(e: &io::Error) -> bool {
    // io::ErrorKind::CrossesDevices is not stable everywhere; match raw codes.
    match e.raw_os_error() {
        #[cfg(unix)]
        Some(code) => code == libc::EXDEV,
        #[cfg(windows)]
        Some(code) => code == 17,
        #[cfg(not(any(unix, windows)))]
        Some(_) => false,
        None => false,
    }
}
