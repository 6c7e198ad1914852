//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the Ctrl-C handler and
//! dispatches the requested command.

use anyhow::Result;
use tracing::{debug, error, warn};

use treesync::cli::{Args, Command};
use treesync::config::{load_config, load_config_from_xml_path};
use treesync::errors::classify;
use treesync::fs_ops::shown;
use treesync::output as out;
use treesync::{Config, TreeSyncError, copy_tree, delete_entry, find_locking_processes, move_tree, shutdown};

use crate::logging::init_tracing;

fn load(args: &Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => load_config_from_xml_path(path)?,
        None => load_config()?,
    };
    args.apply_overrides(&mut cfg);
    Ok(cfg)
}

fn log_failure(command: &str, e: &anyhow::Error) {
    let Some(ts) = classify(e) else {
        error!(error = %format!("{e:#}"), command, "failed");
        return;
    };
    let code = ts.code();
    let conflict = ts.is_conflict();
    match ts {
        TreeSyncError::SourceNotFound(path) => {
            error!(code, kind = "source_not_found", path = %shown(path), command, "failed")
        }
        TreeSyncError::DestinationConflict(path) => {
            error!(code, kind = "destination_conflict", conflict, path = %shown(path), command, "failed")
        }
        TreeSyncError::SameEntity(path) => {
            error!(code, kind = "same_entity", conflict, path = %shown(path), command, "failed")
        }
        TreeSyncError::WaitTimeout { path, waited } => {
            error!(code, kind = "wait_timeout", path = %shown(path), waited_ms = waited.as_millis() as u64, command, "failed")
        }
        TreeSyncError::Interrupted => {
            error!(code, kind = "interrupted", command, "aborted by user")
        }
    }
}

fn dispatch(cfg: &Config, command: &Command) -> Result<()> {
    match command {
        Command::Copy { .. } | Command::Move { .. } => {
            let is_copy = matches!(command, Command::Copy { .. });
            let Some(request) = command.tree_request() else {
                return Ok(());
            };
            let target = if is_copy {
                copy_tree(cfg, &request)?
            } else {
                move_tree(cfg, &request)?
            };
            let verb = if is_copy { "Copied" } else { "Moved" };
            out::print_success(&format!(
                "{verb} '{}' -> '{}'",
                shown(&request.source),
                shown(&target)
            ));
        }
        Command::Holders { path } => {
            let pids = find_locking_processes(path);
            if pids.is_empty() {
                out::print_info(&format!("No process holds '{}'", shown(path)));
            }
            for pid in pids {
                out::print_user(&pid.to_string());
            }
        }
        Command::Trash { path } => {
            delete_entry(cfg, path, true)?;
            out::print_success(&format!("Moved '{}' to the trash", shown(path)));
        }
        Command::Delete { path } => {
            delete_entry(cfg, path, false)?;
            out::print_success(&format!("Deleted '{}'", shown(path)));
        }
    }
    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Copy { .. } => "copy",
        Command::Move { .. } => "move",
        Command::Holders { .. } => "holders",
        Command::Trash { .. } => "trash",
        Command::Delete { .. } => "delete",
    }
}

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    let cfg = load(&args).map_err(|e| {
        out::print_error(&format!("Failed to load configuration: {e:#}"));
        e
    })?;

    let guard_opt = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {}", e));
        e
    })?;

    // Only raise the flag here; the appender guard must outlive dispatch.
    if let Err(e) = ctrlc::set_handler(|| {
        shutdown::request();
        out::print_warn("Received interrupt; finishing in-flight work...");
    }) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    debug!(?args, workers = cfg.effective_workers(), "starting treesync");

    let name = command_name(&args.command);
    let result = dispatch(&cfg, &args.command);
    if let Err(e) = &result {
        log_failure(name, e);
    }

    // Flushes the file appender.
    drop(guard_opt);
    result
}
