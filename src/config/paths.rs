//! Default path helpers.
//! Determines the OS-appropriate config location, honoring TREESYNC_CONFIG.

use dirs::{config_dir, data_dir};
use std::env;
use std::path::PathBuf;

use super::CONFIG_ENV;

/// Config file path: `$TREESYNC_CONFIG` if set, else `<config_dir>/treesync/config.xml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(explicit));
    }
    if let Some(mut base) = config_dir() {
        base.push("treesync");
        base.push("config.xml");
        Some(base)
    } else {
        env::var("HOME").ok().map(|h| {
            PathBuf::from(h)
                .join(".config")
                .join("treesync")
                .join("config.xml")
        })
    }
}

/// Suggested log file location under the user's data dir (not created here).
pub fn default_log_path() -> Option<PathBuf> {
    data_dir().map(|base| base.join("treesync").join("treesync.log"))
}
