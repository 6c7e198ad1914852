//! Effective access checks for the current user.
//!
//! Unix asks the kernel with `faccessat(AT_EACCESS)`. Windows walks the DACL:
//! an explicit deny wins, then an explicit allow, then an inherited allow
//! that no inherited deny cancels.

use anyhow::Result;
use std::fmt;
use std::ops::BitOr;
use std::path::Path;
use tracing::trace;

use crate::errors::TreeSyncError;
use crate::platform;

use super::helpers::io_error_with_help;
use super::resolve::{resolve_dir, resolve_file, shown};

/// Set of rights to test with [`has_access`].
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessRights(u8);

impl AccessRights {
    pub const READ: Self = Self(0b001);
    pub const WRITE: Self = Self(0b010);
    pub const EXECUTE: Self = Self(0b100);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AccessRights {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::READ) { 'r' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'w' } else { '-' };
        let x = if self.contains(Self::EXECUTE) { 'x' } else { '-' };
        write!(f, "AccessRights({r}{w}{x})")
    }
}

/// Whether the current user holds every right in `rights` on `path`.
///
/// A missing path is `SourceNotFound`. Empty `rights` only checks existence.
pub fn has_access(path: &Path, rights: AccessRights) -> Result<bool> {
    let resolved = if path.is_dir() { resolve_dir(path)? } else { resolve_file(path)? };
    if std::fs::symlink_metadata(&resolved).is_err() {
        return Err(TreeSyncError::SourceNotFound(resolved).into());
    }
    let granted = platform::check_access(
        &resolved,
        rights.contains(AccessRights::READ),
        rights.contains(AccessRights::WRITE),
        rights.contains(AccessRights::EXECUTE),
    )
    .map_err(io_error_with_help("check access to", &resolved))?;
    trace!(path = %shown(&resolved), ?rights, granted, "access check");
    Ok(granted)
}
