//! Windows implementations of platform helpers.
//!
//! - Exclusive probes are `share_mode(0)` opens; sharing/lock violations (32/33)
//!   mean another handle is open.
//! - Security copies the DACL with inheritance protection; access checks walk it.
//! - Holder discovery goes through a Restart Manager session.
//! - Deletion and trash relocation go through `SHFileOperationW`.

use std::ffi::{OsStr, c_void};
use std::fs::{File, OpenOptions};
use std::io;
use std::iter::once;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr;
use tracing::{trace, warn};

use windows_sys::Win32::Foundation::{ERROR_MORE_DATA, ERROR_SUCCESS, LocalFree};
use windows_sys::Win32::Security::Authorization::{
    GetNamedSecurityInfoW, SE_FILE_OBJECT, SetNamedSecurityInfoW,
};
use windows_sys::Win32::Security::{
    ACCESS_ALLOWED_ACE, ACE_HEADER, ACL, CheckTokenMembership, DACL_SECURITY_INFORMATION, GetAce,
    INHERITED_ACE, PROTECTED_DACL_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR, PSID,
};
use windows_sys::Win32::Storage::FileSystem::{
    FILE_GENERIC_EXECUTE, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_SHARE_READ,
    GetFileAttributesW, INVALID_FILE_ATTRIBUTES, SetFileAttributesW,
};
use windows_sys::Win32::System::RestartManager::{
    CCH_RM_SESSION_KEY, RM_PROCESS_INFO, RmEndSession, RmGetList, RmRegisterResources,
    RmStartSession,
};
use windows_sys::Win32::UI::Shell::{
    FO_DELETE, FOF_ALLOWUNDO, FOF_NOCONFIRMATION, FOF_NOERRORUI, FOF_SILENT, SHFILEOPSTRUCTW,
    SHFileOperationW,
};

const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;
const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;
const ACCESS_DENIED_ACE_TYPE: u8 = 1;
// RmGetList can race with processes opening the file between calls.
const RM_GET_LIST_ATTEMPTS: usize = 3;

fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(once(0)).collect()
}

/// Open log file for appending.
pub fn open_log_file_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Open `path` with no sharing at all; fails while any other handle is open.
pub fn probe_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).share_mode(0).open(path)
}

/// Open `path` read-write (creating it), letting others read but not write.
pub fn open_reserved(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .share_mode(FILE_SHARE_READ)
        .open(path)
}

/// True for ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION.
pub fn is_lock_violation(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

/// Copy the DACL of `src` onto `dst`, protected from inheritance.
pub fn copy_security(src: &Path, dst: &Path) -> io::Result<()> {
    let src_w = wide(src.as_os_str());
    let dst_w = wide(dst.as_os_str());

    let mut dacl: *mut ACL = ptr::null_mut();
    let mut descriptor: PSECURITY_DESCRIPTOR = ptr::null_mut();
    let rc = unsafe {
        GetNamedSecurityInfoW(
            src_w.as_ptr(),
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut dacl,
            ptr::null_mut(),
            &mut descriptor,
        )
    };
    if rc != ERROR_SUCCESS {
        return Err(io::Error::from_raw_os_error(rc as i32));
    }

    let rc = unsafe {
        SetNamedSecurityInfoW(
            dst_w.as_ptr(),
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION | PROTECTED_DACL_SECURITY_INFORMATION,
            ptr::null_mut(),
            ptr::null_mut(),
            dacl,
            ptr::null(),
        )
    };
    // dacl points into the descriptor; free once, after use.
    unsafe {
        LocalFree(descriptor as _);
    }
    if rc != ERROR_SUCCESS {
        let e = io::Error::from_raw_os_error(rc as i32);
        warn!(path = %dst.display(), error = %e, "failed to apply DACL on destination");
    } else {
        trace!(path = %dst.display(), "applied protected DACL on destination");
    }
    Ok(())
}

/// DACL-based check of `path` for the current user's token.
pub fn check_access(path: &Path, read: bool, write: bool, execute: bool) -> io::Result<bool> {
    let mut wanted = 0u32;
    if read {
        wanted |= FILE_GENERIC_READ;
    }
    if write {
        wanted |= FILE_GENERIC_WRITE;
    }
    if execute {
        wanted |= FILE_GENERIC_EXECUTE;
    }
    if wanted == 0 {
        return std::fs::symlink_metadata(path).map(|_| true);
    }

    let path_w = wide(path.as_os_str());
    let mut dacl: *mut ACL = ptr::null_mut();
    let mut descriptor: PSECURITY_DESCRIPTOR = ptr::null_mut();
    let rc = unsafe {
        GetNamedSecurityInfoW(
            path_w.as_ptr(),
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut dacl,
            ptr::null_mut(),
            &mut descriptor,
        )
    };
    if rc != ERROR_SUCCESS {
        return Err(io::Error::from_raw_os_error(rc as i32));
    }
    let verdict = unsafe { evaluate_dacl(dacl, wanted) };
    unsafe {
        LocalFree(descriptor as _);
    }
    verdict
}

/// Explicit deny wins, then explicit allow, then inherited allow without inherited deny.
///
/// # Safety
/// `dacl` must be null or point to a valid ACL.
unsafe fn evaluate_dacl(dacl: *const ACL, wanted: u32) -> io::Result<bool> {
    // A NULL DACL grants everyone full access.
    if dacl.is_null() {
        return Ok(true);
    }
    let count = unsafe { (*dacl).AceCount };
    let mut allow = false;
    let mut inherited_allow = false;
    let mut inherited_deny = false;

    for index in 0..u32::from(count) {
        let mut ace: *mut c_void = ptr::null_mut();
        if unsafe { GetAce(dacl, index, &mut ace) } == 0 {
            return Err(io::Error::last_os_error());
        }
        let header = unsafe { &*(ace as *const ACE_HEADER) };
        let denied = match header.AceType {
            ACCESS_ALLOWED_ACE_TYPE => false,
            ACCESS_DENIED_ACE_TYPE => true,
            _ => continue,
        };
        // Allowed and denied ACEs share one layout.
        let body = unsafe { &*(ace as *const ACCESS_ALLOWED_ACE) };
        if body.Mask & wanted != wanted {
            continue;
        }
        let sid = &body.SidStart as *const u32 as PSID;
        let mut member = 0;
        if unsafe { CheckTokenMembership(ptr::null_mut(), sid, &mut member) } == 0 {
            return Err(io::Error::last_os_error());
        }
        if member == 0 {
            continue;
        }
        let inherited = u32::from(header.AceFlags) & INHERITED_ACE != 0;
        match (denied, inherited) {
            (true, false) => return Ok(false),
            (true, true) => inherited_deny = true,
            (false, false) => allow = true,
            (false, true) => inherited_allow = true,
        }
    }
    Ok(allow || (inherited_allow && !inherited_deny))
}

/// Copy timestamps and the attribute bits (readonly, hidden, system, archive, ...).
pub fn copy_attributes(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(src)?;
    let src_w = wide(src.as_os_str());
    let dst_w = wide(dst.as_os_str());

    let at = filetime::FileTime::from_last_access_time(&meta);
    let mt = filetime::FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_times(dst, at, mt) {
        warn!(path = %dst.display(), error = %e, "failed to set timestamps on destination");
    }

    let attrs = unsafe { GetFileAttributesW(src_w.as_ptr()) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        return Err(io::Error::last_os_error());
    }
    if unsafe { SetFileAttributesW(dst_w.as_ptr(), attrs) } == 0 {
        let e = io::Error::last_os_error();
        warn!(path = %dst.display(), attrs, error = %e, "failed to set attributes on destination");
    } else {
        trace!(path = %dst.display(), attrs, "set attributes on destination");
    }
    Ok(())
}

/// A Restart Manager session, ended on drop.
struct RmSession {
    handle: u32,
}

impl RmSession {
    fn start() -> io::Result<Self> {
        let mut handle = 0u32;
        let mut key = [0u16; CCH_RM_SESSION_KEY as usize + 1];
        let rc = unsafe { RmStartSession(&mut handle, 0, key.as_mut_ptr()) };
        if rc != ERROR_SUCCESS {
            return Err(io::Error::from_raw_os_error(rc as i32));
        }
        Ok(Self { handle })
    }

    fn register(&self, path: &Path) -> io::Result<()> {
        let path_w = wide(path.as_os_str());
        let files = [path_w.as_ptr()];
        let rc = unsafe {
            RmRegisterResources(
                self.handle,
                1,
                files.as_ptr(),
                0,
                ptr::null(),
                0,
                ptr::null(),
            )
        };
        if rc != ERROR_SUCCESS {
            return Err(io::Error::from_raw_os_error(rc as i32));
        }
        Ok(())
    }

    fn holders(&self) -> io::Result<Vec<u32>> {
        let mut infos: Vec<RM_PROCESS_INFO> = Vec::new();
        for _ in 0..RM_GET_LIST_ATTEMPTS {
            let mut needed = 0u32;
            let mut count = infos.len() as u32;
            let mut reasons = 0u32;
            let buf = if infos.is_empty() {
                ptr::null_mut()
            } else {
                infos.as_mut_ptr()
            };
            let rc = unsafe { RmGetList(self.handle, &mut needed, &mut count, buf, &mut reasons) };
            match rc {
                ERROR_SUCCESS => {
                    infos.truncate(count as usize);
                    return Ok(infos.iter().map(|i| i.Process.dwProcessId).collect());
                }
                ERROR_MORE_DATA => {
                    let zeroed: RM_PROCESS_INFO = unsafe { mem::zeroed() };
                    infos = vec![zeroed; needed as usize];
                }
                other => return Err(io::Error::from_raw_os_error(other as i32)),
            }
        }
        Err(io::Error::other("holder list kept growing between queries"))
    }
}

impl Drop for RmSession {
    fn drop(&mut self) {
        unsafe {
            RmEndSession(self.handle);
        }
    }
}

/// Process ids holding `path`, as reported by the Restart Manager.
pub fn holder_pids(path: &Path) -> io::Result<Vec<u32>> {
    let session = RmSession::start()?;
    session.register(path)?;
    let mut pids = session.holders()?;
    pids.sort_unstable();
    pids.dedup();
    Ok(pids)
}

/// Delete `path` through the shell; with `recoverable` it lands in the Recycle Bin.
pub fn shell_delete(path: &Path, recoverable: bool) -> io::Result<()> {
    // The shell rejects \\?\ paths; the list is double-NUL terminated.
    let plain = dunce::simplified(path);
    let mut from: Vec<u16> = plain.as_os_str().encode_wide().collect();
    from.push(0);
    from.push(0);

    let mut flags = FOF_NOCONFIRMATION | FOF_NOERRORUI | FOF_SILENT;
    if recoverable {
        flags |= FOF_ALLOWUNDO;
    }

    let mut op: SHFILEOPSTRUCTW = unsafe { mem::zeroed() };
    op.wFunc = FO_DELETE as _;
    op.pFrom = from.as_ptr();
    op.fFlags = flags as _;

    let rc = unsafe { SHFileOperationW(&mut op) };
    if rc != 0 {
        return Err(io::Error::other(format!("SHFileOperationW failed with code {rc:#x}")));
    }
    if op.fAnyOperationsAborted != 0 {
        return Err(io::Error::other("shell delete was aborted"));
    }
    Ok(())
}
