//! Unix implementations of platform helpers.
//!
//! Exclusive probes and registry reservations use advisory `flock(2)` through
//! `fs2`. Holder discovery scans `/proc` on Linux and shells out to `lsof`
//! elsewhere.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use tracing::{trace, warn};

/// Open log file for appending; set 0600 only when creating a new file.
/// Existing files keep whatever mode an administrator gave them.
pub fn open_log_file_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let existed = path.exists();
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;
    if !existed {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(f)
}

/// Try to take an exclusive hold on `path` without blocking.
/// The file is opened read-only so read-only copies can be probed too.
pub fn probe_exclusive(path: &Path) -> io::Result<File> {
    let f = File::open(path)?;
    FileExt::try_lock_exclusive(&f)?;
    Ok(f)
}

/// Open `path` read-write (creating it) and hold an exclusive lock on it.
pub fn open_reserved(path: &Path) -> io::Result<File> {
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .custom_flags(libc::O_CLOEXEC)
        .open(path)?;
    FileExt::try_lock_exclusive(&f)?;
    Ok(f)
}

/// True when an open/lock attempt failed because someone else holds the file.
pub fn is_lock_violation(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    match e.raw_os_error() {
        Some(code) => {
            code == libc::EWOULDBLOCK
                || code == libc::EAGAIN
                || Some(code) == fs2::lock_contended_error().raw_os_error()
        }
        None => false,
    }
}

/// Mirror ownership (best-effort), the POSIX access ACL (feature `xattrs`) and
/// the full mode, setuid/setgid/sticky included, from `src` onto `dst`.
pub fn copy_security(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;

    // Changing owner clears setuid/setgid, so it goes first.
    if let Ok(dmeta) = fs::metadata(dst) {
        if dmeta.uid() != meta.uid() || dmeta.gid() != meta.gid() {
            if let Err(e) = std::os::unix::fs::chown(dst, Some(meta.uid()), Some(meta.gid())) {
                // Unprivileged callers can't give files away; expected.
                trace!(path = %dst.display(), error = %e, "ownership not copied");
            }
        }
    }

    #[cfg(feature = "xattrs")]
    copy_access_acl(src, dst);

    let mode = meta.permissions().mode() & 0o7777;
    if let Err(e) = fs::set_permissions(dst, fs::Permissions::from_mode(mode)) {
        warn!(path = %dst.display(), mode = format!("{:o}", mode), error = %e, "failed to set mode on destination");
    } else {
        trace!(path = %dst.display(), mode = format!("{:o}", mode), "set mode on destination");
    }
    Ok(())
}

#[cfg(feature = "xattrs")]
const ACCESS_ACL: &str = "system.posix_acl_access";

// The source's access ACL replaces whatever default ACL the new parent handed down.
#[cfg(feature = "xattrs")]
fn copy_access_acl(src: &Path, dst: &Path) {
    match xattr::get(src, ACCESS_ACL) {
        Ok(Some(value)) => {
            if let Err(e) = xattr::set(dst, ACCESS_ACL, &value) {
                warn!(path = %dst.display(), error = %e, "failed to set access ACL on destination");
            }
        }
        Ok(None) => {
            // No explicit ACL on the source: drop any inherited one.
            let _ = xattr::remove(dst, ACCESS_ACL);
        }
        Err(e) => {
            trace!(path = %src.display(), error = %e, "access ACL unsupported");
        }
    }
}

/// Mirror user extended attributes (feature `xattrs`), timestamps and the
/// read-only state from `src` onto `dst`.
pub fn copy_attributes(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;
    let dmeta = fs::metadata(dst)?;
    let src_ro = meta.permissions().mode() & 0o222 == 0;
    let dst_mode = dmeta.permissions().mode() & 0o7777;

    #[cfg(feature = "xattrs")]
    {
        // Writing user xattrs needs write access to the inode.
        let lifted = dst_mode & 0o200 == 0
            && fs::set_permissions(dst, fs::Permissions::from_mode(dst_mode | 0o200)).is_ok();
        copy_user_xattrs(src, dst);
        if lifted {
            let _ = fs::set_permissions(dst, fs::Permissions::from_mode(dst_mode));
        }
    }

    let at = filetime::FileTime::from_last_access_time(&meta);
    let mt = filetime::FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_times(dst, at, mt) {
        warn!(path = %dst.display(), error = %e, "failed to set atime/mtime on destination");
    } else {
        trace!(path = %dst.display(), "set atime/mtime on destination");
    }

    let dst_ro = dst_mode & 0o222 == 0;
    let new_mode = match (src_ro, dst_ro) {
        (true, false) => Some(dst_mode & !0o222),
        (false, true) => Some(dst_mode | 0o200),
        _ => None,
    };
    if let Some(mode) = new_mode {
        if let Err(e) = fs::set_permissions(dst, fs::Permissions::from_mode(mode)) {
            warn!(path = %dst.display(), readonly = src_ro, error = %e, "failed to set readonly state on destination");
        }
    }
    Ok(())
}

#[cfg(feature = "xattrs")]
fn copy_user_xattrs(src: &Path, dst: &Path) {
    let names = match xattr::list(src) {
        Ok(names) => names,
        Err(e) => {
            warn!(src = %src.display(), error = %e, "failed to list xattrs; continuing");
            return;
        }
    };
    for name in names {
        let shown = name.to_string_lossy();
        // system/security/trusted namespaces belong to the permission step or need privileges.
        if shown.starts_with("system.") || shown.starts_with("security.") || shown.starts_with("trusted.") {
            continue;
        }
        match xattr::get(src, &name) {
            Ok(value) => {
                let value = value.unwrap_or_default();
                if let Err(e) = xattr::set(dst, &name, &value) {
                    warn!(dst = %dst.display(), xattr = %shown, error = %e, "failed to set xattr on destination");
                } else {
                    trace!(dst = %dst.display(), xattr = %shown, size = value.len(), "copied xattr");
                }
            }
            Err(e) => {
                warn!(src = %src.display(), xattr = %shown, error = %e, "failed to read xattr from source");
            }
        }
    }
}

/// Effective-id access check; `false` when the kernel denies, `Err` for anything else.
pub fn check_access(path: &Path, read: bool, write: bool, execute: bool) -> io::Result<bool> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut mode = 0;
    if read {
        mode |= libc::R_OK;
    }
    if write {
        mode |= libc::W_OK;
    }
    if execute {
        mode |= libc::X_OK;
    }
    if mode == 0 {
        mode = libc::F_OK;
    }
    let rc = unsafe { libc::faccessat(libc::AT_FDCWD, c_path.as_ptr(), mode, libc::AT_EACCESS) };
    if rc == 0 {
        return Ok(true);
    }
    let e = io::Error::last_os_error();
    match e.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) | Some(libc::EROFS) | Some(libc::ETXTBSY) => Ok(false),
        _ => Err(e),
    }
}

/// Process ids holding `path` open, found by scanning `/proc/<pid>/fd`.
#[cfg(target_os = "linux")]
pub fn holder_pids(path: &Path) -> io::Result<Vec<u32>> {
    let target = fs::metadata(path)?;
    let (dev, ino) = (target.dev(), target.ino());

    let mut pids = Vec::new();
    for entry in fs::read_dir("/proc")?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Other users' processes are unreadable without privileges.
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let holds = fds
            .flatten()
            .filter_map(|fd| fs::metadata(fd.path()).ok())
            .any(|m| m.dev() == dev && m.ino() == ino);
        if holds {
            pids.push(pid);
        }
    }
    pids.sort_unstable();
    pids.dedup();
    Ok(pids)
}

/// Process ids holding `path` open, as reported by `lsof -t`.
#[cfg(not(target_os = "linux"))]
pub fn holder_pids(path: &Path) -> io::Result<Vec<u32>> {
    use std::process::Command;

    // Fail early with NotFound instead of asking lsof about nothing.
    fs::metadata(path)?;
    let out = Command::new("lsof").arg("-t").arg("--").arg(path).output()?;
    // lsof exits 1 when nothing matches; stdout is still authoritative.
    let mut pids: Vec<u32> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    Ok(pids)
}

/// Delete `path` recursively; with `recoverable` it goes to the desktop trash instead.
pub fn shell_delete(path: &Path, recoverable: bool) -> io::Result<()> {
    if recoverable {
        return trash::delete(path).map_err(io::Error::other);
    }
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_log_file_gets_0600() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("new_log.txt");
        let _f = open_log_file_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn existing_log_file_mode_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let _f = open_log_file_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn reserved_file_blocks_probe() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("held.bin");
        let held = open_reserved(&path).unwrap();
        let err = probe_exclusive(&path).unwrap_err();
        assert!(is_lock_violation(&err), "unexpected error: {err}");
        drop(held);
        assert!(probe_exclusive(&path).is_ok());
    }

    #[test]
    fn probe_works_on_readonly_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.txt");
        fs::write(&path, b"x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();
        assert!(probe_exclusive(&path).is_ok());
    }

    #[test]
    fn security_copies_special_bits() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o1750)).unwrap();
        copy_security(&src, &dst).unwrap();
        let mode = fs::metadata(&dst).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o1750);
    }

    #[test]
    fn attributes_copy_times_and_readonly() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"a").unwrap();
        fs::write(&dst, b"a").unwrap();
        let stamp = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_times(&src, stamp, stamp).unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o444)).unwrap();

        copy_attributes(&src, &dst).unwrap();
        let m = fs::metadata(&dst).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&m), stamp);
        assert!(m.permissions().readonly());
    }

    #[test]
    fn holders_of_missing_path_is_error() {
        let dir = tempdir().unwrap();
        assert!(holder_pids(&dir.path().join("nope")).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn holders_include_self_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("open.txt");
        fs::write(&path, b"x").unwrap();
        let f = File::open(&path).unwrap();
        let pids = holder_pids(&path).unwrap();
        assert!(pids.contains(&std::process::id()));
        drop(f);
        let pids = holder_pids(&path).unwrap();
        assert!(!pids.contains(&std::process::id()));
    }

    #[test]
    fn silent_delete_removes_tree() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/c.txt"), b"c").unwrap();
        shell_delete(&root, false).unwrap();
        assert!(!root.exists());
    }
}
