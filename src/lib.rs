//! Core library for `treesync`.
//!
//! Copies, moves and deletes directory trees while mirroring permissions and
//! attributes, waits for the filesystem to actually show each change, keeps an
//! in-process registry of exclusively held files and asks the OS which
//! processes hold a path.
//!
//! The library only emits `tracing` events; the `treesync` binary owns logging
//! setup and configuration loading.
//!
//! ```no_run
//! use treesync::{Config, TreeRequest, copy_tree};
//!
//! let cfg = Config::default();
//! let dst = copy_tree(&cfg, &TreeRequest::new("/data/photos", "/backup").nest(true))?;
//! println!("copied to {}", dst.display());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs_ops;
pub mod output;
pub mod platform;
pub mod shutdown;

pub use config::{Config, LogLevel, default_config_path, load_config};
pub use errors::TreeSyncError;
pub use fs_ops::{
    AccessRights, CopyOptions, FileLockRegistry, ProcessId, TreeRequest, Waiter, copy_file,
    copy_file_into_dir, copy_tree, create_dir, create_file, delete_entry, delete_silently,
    find_locking_processes, has_access, move_file, move_to_trash, move_tree, rename_entry,
    resolve_dir, resolve_file, unique_copy_name,
};
