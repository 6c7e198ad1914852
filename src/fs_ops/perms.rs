//! Permission and attribute propagation.
//!
//! Sub-step failures (one xattr, the owner, a timestamp) are logged and
//! skipped; only an unreadable source fails the call.

use anyhow::Result;
use std::path::Path;
use tracing::trace;

use crate::platform;

use super::helpers::io_error_with_help;

/// Copy the security descriptor of `source` onto `destination`, protected from
/// inheritance (DACL on Windows; owner, ACL and mode bits on Unix).
pub fn propagate_permissions(destination: &Path, source: &Path) -> Result<()> {
    trace!(src = %source.display(), dst = %destination.display(), "propagate permissions");
    platform::copy_security(source, destination)
        .map_err(io_error_with_help("read security of", source))
}

/// Copy attribute bits and timestamps of `source` onto `destination`.
pub fn propagate_attributes(destination: &Path, source: &Path) -> Result<()> {
    trace!(src = %source.display(), dst = %destination.display(), "propagate attributes");
    platform::copy_attributes(source, destination)
        .map_err(io_error_with_help("read attributes of", source))
}

/// Apply whichever propagation steps are enabled.
pub(crate) fn propagate(
    destination: &Path,
    source: &Path,
    permissions: bool,
    attributes: bool,
) -> Result<()> {
    if permissions {
        propagate_permissions(destination, source)?;
    }
    if attributes {
        propagate_attributes(destination, source)?;
    }
    Ok(())
}
