//! Completion confirmation.
//!
//! Filesystems (network shares, scanners holding fresh files) don't always make
//! a mutation visible the moment the call returns. A [`Waiter`] polls until the
//! expected state shows up.
//!
//! Waits are unbounded unless `wait_timeout` is configured; a shutdown request
//! ends any wait with `TreeSyncError::Interrupted`.

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::Config;
use crate::errors::TreeSyncError;
use crate::platform;
use crate::shutdown;

use super::helpers::io_error_with_help;

// Log a progress line every this many unsuccessful polls.
const PROGRESS_EVERY: u32 = 50;

/// Polls the filesystem until an expected state is observed.
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    interval: Duration,
    timeout: Option<Duration>,
}

impl Waiter {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.poll_interval, config.wait_timeout)
    }

    fn poll<F>(&self, path: &Path, what: &'static str, mut done: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            if done()? {
                if attempts > 0 {
                    trace!(path = %path.display(), what, attempts, waited_ms = start.elapsed().as_millis() as u64, "state reached");
                }
                return Ok(());
            }
            if shutdown::is_requested() {
                return Err(TreeSyncError::Interrupted.into());
            }
            let waited = start.elapsed();
            if let Some(limit) = self.timeout {
                if waited >= limit {
                    return Err(TreeSyncError::WaitTimeout {
                        path: path.to_path_buf(),
                        waited,
                    }
                    .into());
                }
            }
            attempts += 1;
            if attempts % PROGRESS_EVERY == 0 {
                debug!(path = %path.display(), what, attempts, waited_ms = waited.as_millis() as u64, "still waiting");
            }
            sleep(self.interval);
        }
    }

    /// Block until `path` exists (`expect_exists`) or is gone (`!expect_exists`).
    pub fn await_state(&self, path: &Path, expect_exists: bool) -> Result<()> {
        let what = if expect_exists { "exists" } else { "absent" };
        // symlink_metadata: a dangling link is still an entry.
        self.poll(path, what, || Ok(fs::symlink_metadata(path).is_ok() == expect_exists))
    }

    pub fn await_exists(&self, path: &Path) -> Result<()> {
        self.await_state(path, true)
    }

    pub fn await_absent(&self, path: &Path) -> Result<()> {
        self.await_state(path, false)
    }

    /// Block until an exclusive open of `path` succeeds.
    /// Sharing/lock violations are retried; any other failure is returned.
    pub fn await_unlocked(&self, path: &Path) -> Result<()> {
        self.poll(path, "unlocked", || match platform::probe_exclusive(path) {
            Ok(_probe) => Ok(true),
            Err(e) if platform::is_lock_violation(&e) => Ok(false),
            Err(e) => Err(io_error_with_help("wait for exclusive access to", path)(e)),
        })
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::tempdir;

    fn quick(timeout: Option<Duration>) -> Waiter {
        Waiter::new(Duration::from_millis(5), timeout)
    }

    #[test]
    fn satisfied_state_returns_immediately() {
        let dir = tempdir().unwrap();
        quick(Some(Duration::ZERO)).await_exists(dir.path()).unwrap();
        quick(Some(Duration::ZERO)).await_absent(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn bounded_wait_times_out() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("never");
        let err = quick(Some(Duration::from_millis(30))).await_exists(&missing).unwrap_err();
        match err.downcast_ref::<TreeSyncError>() {
            Some(TreeSyncError::WaitTimeout { path, waited }) => {
                assert_eq!(path, &missing);
                assert!(*waited >= Duration::from_millis(30));
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
    }

    #[test]
    fn observes_late_creation() {
        let dir = tempdir().unwrap();
        let late = dir.path().join("late.txt");
        let (tx, rx) = mpsc::channel();
        let writer = {
            let late = late.clone();
            thread::spawn(move || {
                rx.recv().unwrap();
                thread::sleep(Duration::from_millis(20));
                fs::write(&late, b"x").unwrap();
            })
        };
        tx.send(()).unwrap();
        quick(Some(Duration::from_secs(10))).await_exists(&late).unwrap();
        writer.join().unwrap();
    }

    #[test]
    fn unlocked_waits_for_holder_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("held.bin");
        let held = platform::open_reserved(&path).unwrap();
        let err = quick(Some(Duration::from_millis(20))).await_unlocked(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeSyncError>(),
            Some(TreeSyncError::WaitTimeout { .. })
        ));
        drop(held);
        quick(Some(Duration::from_secs(5))).await_unlocked(&path).unwrap();
    }

    #[test]
    fn unlocked_propagates_other_errors() {
        let dir = tempdir().unwrap();
        let err = quick(None).await_unlocked(&dir.path().join("missing")).unwrap_err();
        let io = err.downcast_ref::<std::io::Error>().expect("io error kept");
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }
}
