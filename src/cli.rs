//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Global flags may appear before or after the subcommand.
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::types::{Config, LogLevel};
use crate::fs_ops::TreeRequest;

/// Copy, move and delete directory trees; find out who holds a file.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Copy, move and delete directory trees with permission propagation")]
pub struct Args {
    /// Config file to load instead of the default location.
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true, help = "Enable debug logging (shorthand for --log-level debug)")]
    pub debug: bool,

    /// Also write logs to this file.
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, global = true, help = "Emit logs in structured JSON")]
    pub json: bool,

    /// Worker threads for parallel phases (default: twice the CPU count).
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,

    /// Give up on a single completion wait after this many milliseconds (default: wait forever).
    #[arg(long, global = true, value_name = "MS")]
    pub wait_timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copy a directory tree.
    Copy {
        #[arg(value_hint = ValueHint::DirPath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        dst: PathBuf,
        /// Replace files that already exist in the destination.
        #[arg(long)]
        overwrite: bool,
        /// Copy into DST/<name of SRC> instead of DST itself.
        #[arg(long)]
        nest: bool,
        /// Don't mirror permissions / security descriptors.
        #[arg(long)]
        no_permissions: bool,
        /// Don't mirror attribute bits and timestamps.
        #[arg(long)]
        no_attributes: bool,
    },
    /// Move a directory tree.
    Move {
        #[arg(value_hint = ValueHint::DirPath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        dst: PathBuf,
        /// Replace files that already exist in the destination.
        #[arg(long)]
        overwrite: bool,
        /// Move into DST/<name of SRC> instead of DST itself.
        #[arg(long)]
        nest: bool,
    },
    /// List process ids holding PATH open.
    Holders {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// Move PATH to the trash / Recycle Bin.
    Trash {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// Delete PATH permanently.
    Delete {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
}

impl Command {
    /// Tree request for copy/move commands.
    pub fn tree_request(&self) -> Option<TreeRequest> {
        match self {
            Command::Copy { src, dst, overwrite, nest, no_permissions, no_attributes } => Some(
                TreeRequest::new(src, dst)
                    .overwrite(*overwrite)
                    .nest(*nest)
                    .permissions(!no_permissions)
                    .attributes(!no_attributes),
            ),
            Command::Move { src, dst, overwrite, nest } => {
                Some(TreeRequest::new(src, dst).overwrite(*overwrite).nest(*nest))
            }
            _ => None,
        }
    }
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(path) = &self.log_file {
            cfg.log_file = Some(path.clone());
        }
        if let Some(n) = self.workers {
            cfg.workers = (n > 0).then_some(n);
        }
        if let Some(ms) = self.wait_timeout_ms {
            cfg.wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_flags_map_to_request() {
        let args = Args::try_parse_from([
            "treesync", "copy", "/a", "/b", "--nest", "--no-attributes", "--json",
        ])
        .unwrap();
        assert!(args.json);
        let req = args.command.tree_request().unwrap();
        assert_eq!(req.source, PathBuf::from("/a"));
        assert!(req.nest && req.permissions && !req.attributes && !req.overwrite);
    }

    #[test]
    fn move_request_keeps_metadata_on() {
        let args = Args::try_parse_from(["treesync", "move", "--overwrite", "/a", "/b"]).unwrap();
        let req = args.command.tree_request().unwrap();
        assert!(req.overwrite && req.permissions && req.attributes);
    }

    #[test]
    fn overrides_apply() {
        let args = Args::try_parse_from([
            "treesync", "--log-level", "info", "--workers", "3", "--wait-timeout-ms", "250",
            "holders", "/x",
        ])
        .unwrap();
        let mut cfg = Config::default();
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert_eq!(cfg.workers, Some(3));
        assert_eq!(cfg.wait_timeout, Some(Duration::from_millis(250)));
        assert!(args.command.tree_request().is_none());
    }

    #[test]
    fn debug_wins_over_log_level() {
        let args = Args::try_parse_from(["treesync", "-d", "--log-level", "quiet", "delete", "/x"]).unwrap();
        assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
    }

    #[test]
    fn subcommand_required() {
        assert!(Args::try_parse_from(["treesync"]).is_err());
    }
}
