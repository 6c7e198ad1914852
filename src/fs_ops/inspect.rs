//! Lock-holder discovery and recoverable deletion.
//!
//! These are diagnostics: they never fail. Problems are traced at `warn` and
//! reported as an empty list or `false`.

use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::platform;

use super::resolve::{resolve_file, shown};

/// Identifier of an external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processes currently holding `path` open.
pub fn find_locking_processes(path: &Path) -> Vec<ProcessId> {
    let resolved = match resolve_file(path) {
        Ok(p) => p,
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "holder query: unresolvable path");
            return Vec::new();
        }
    };
    match platform::holder_pids(&resolved) {
        Ok(pids) => {
            debug!(path = %shown(&resolved), holders = pids.len(), "holder query");
            pids.into_iter().map(ProcessId).collect()
        }
        Err(e) => {
            warn!(path = %shown(&resolved), error = %e, "holder query failed");
            Vec::new()
        }
    }
}

fn shell_delete(path: &Path, recoverable: bool) -> bool {
    let op = if recoverable { "trash" } else { "delete" };
    let resolved = match resolve_file(path) {
        Ok(p) => p,
        Err(e) => {
            warn!(path = %path.display(), op, error = %format!("{e:#}"), "unresolvable path");
            return false;
        }
    };
    match platform::shell_delete(&resolved, recoverable) {
        Ok(()) => {
            info!(path = %shown(&resolved), op, "removed");
            true
        }
        Err(e) => {
            warn!(path = %shown(&resolved), op, error = %e, "removal failed");
            false
        }
    }
}

/// Move a file or directory to the OS trash / Recycle Bin.
pub fn move_to_trash(path: &Path) -> bool {
    shell_delete(path, true)
}

/// Delete a file or directory permanently without any UI.
pub fn delete_silently(path: &Path) -> bool {
    shell_delete(path, false)
}
