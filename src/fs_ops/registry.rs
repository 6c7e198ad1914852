//! In-process file lock registry.
//!
//! Holds files open exclusively on behalf of callers (others may still read)
//! and can let go of all of them temporarily, e.g. while an external tool
//! needs the files, then take back exactly the same set.
//!
//! All state sits behind one mutex so check-then-open is atomic per path.

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::platform;

use super::helpers::io_error_with_help;
use super::resolve::resolve_file;

#[derive(Default)]
struct State {
    held: BTreeMap<PathBuf, File>,
    // Paths released by disable_all, in release order.
    pending: VecDeque<PathBuf>,
}

/// Registry of exclusively held files. Share it across threads in an `Arc`.
#[derive(Default)]
pub struct FileLockRegistry {
    state: Mutex<State>,
}

impl FileLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(state: &mut State, path: PathBuf) {
        if state.held.contains_key(&path) {
            trace!(path = %path.display(), "already held");
            return;
        }
        match platform::probe_exclusive(&path) {
            Err(e) if platform::is_lock_violation(&e) => {
                debug!(path = %path.display(), "held by someone else; not locking");
                return;
            }
            // Free, or not there yet (it gets created below).
            _ => {}
        }
        match platform::open_reserved(&path) {
            Ok(file) => {
                trace!(path = %path.display(), "locked");
                state.held.insert(path, file);
            }
            Err(e) => debug!(path = %path.display(), error = %e, "lock failed"),
        }
    }

    /// Hold `path` open exclusively, creating it if needed.
    /// No-op when it is already locked; failures are logged, not returned.
    pub fn lock(&self, path: &Path) {
        let path = match resolve_file(path) {
            Ok(p) => p,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "lock: unresolvable path");
                return;
            }
        };
        let mut state = self.state.lock();
        Self::acquire(&mut state, path);
    }

    /// Close the handle held for `path`, if any.
    pub fn release(&self, path: &Path) {
        let Ok(path) = resolve_file(path) else {
            return;
        };
        if self.state.lock().held.remove(&path).is_some() {
            trace!(path = %path.display(), "released");
        }
    }

    /// Whether `path` is held by this registry or exclusively by anyone else.
    pub fn is_locked(&self, path: &Path) -> Result<bool> {
        let path = resolve_file(path)?;
        if self.state.lock().held.contains_key(&path) {
            return Ok(true);
        }
        match platform::probe_exclusive(&path) {
            Ok(_probe) => Ok(false),
            Err(e) if platform::is_lock_violation(&e) => Ok(true),
            Err(e) => Err(io_error_with_help("probe lock on", &path)(e)),
        }
    }

    /// Release every held file and remember the paths for [`enable_all`](Self::enable_all).
    pub fn disable_all(&self) {
        let mut state = self.state.lock();
        let held = std::mem::take(&mut state.held);
        let count = held.len();
        for (path, file) in held {
            drop(file);
            state.pending.push_back(path);
        }
        debug!(released = count, "all locks released");
    }

    /// Re-lock every path released by [`disable_all`](Self::disable_all), in release order.
    pub fn enable_all(&self) {
        let mut state = self.state.lock();
        let mut count = 0usize;
        while let Some(path) = state.pending.pop_front() {
            Self::acquire(&mut state, path);
            count += 1;
        }
        debug!(attempted = count, held = state.held.len(), "locks restored");
    }

    /// Currently held paths, sorted.
    pub fn held_paths(&self) -> Vec<PathBuf> {
        self.state.lock().held.keys().cloned().collect()
    }

    /// Paths waiting for `enable_all`, in the order they will be re-locked.
    pub fn pending_resume(&self) -> Vec<PathBuf> {
        self.state.lock().pending.iter().cloned().collect()
    }
}
