//! Filesystem operations: modularized.

mod access;
mod batch;
mod entry;
mod helpers;
mod inspect;
mod naming;
mod perms;
mod registry;
mod resolve;
mod transfer;
mod tree;
mod wait;

pub use access::{AccessRights, has_access};
pub use batch::{BatchError, WorkerPool};
pub use entry::{
    CopyOptions, copy_file, copy_file_into_dir, create_dir, create_file, delete_entry, move_file,
    rename_entry,
};
pub use helpers::io_error_with_help;
pub use inspect::{ProcessId, delete_silently, find_locking_processes, move_to_trash};
pub use naming::{EntryKind, unique_copy_name};
pub use perms::{propagate_attributes, propagate_permissions};
pub use registry::FileLockRegistry;
pub use resolve::{MAX_DIR_PATH, MAX_FILE_PATH, extend_long_path, resolve_dir, resolve_file, same_entity, shown};
pub use tree::{TreeRequest, copy_tree, move_tree};
pub use wait::Waiter;
