//! Platform-specific helpers.
//! This module hides OS differences (Unix/Windows) behind a uniform API so
//! the rest of the codebase can remain platform-agnostic.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::{
    check_access, copy_attributes, copy_security, holder_pids, is_lock_violation,
    open_log_file_append, open_reserved, probe_exclusive, shell_delete,
};

#[cfg(windows)]
pub use windows::{
    check_access, copy_attributes, copy_security, holder_pids, is_lock_violation,
    open_log_file_append, open_reserved, probe_exclusive, shell_delete,
};
