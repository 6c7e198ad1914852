use serial_test::serial;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use treesync::{LogLevel, default_config_path, load_config};

const VAR: &str = "TREESYNC_CONFIG";

fn set(value: &std::path::Path) {
    unsafe {
        std::env::set_var(VAR, value);
    }
}

fn clear() {
    unsafe {
        std::env::remove_var(VAR);
    }
}

#[test]
#[serial]
fn env_var_selects_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.xml");
    fs::write(
        &path,
        "<config>\n  <poll_interval_ms> 25 </poll_interval_ms>\n  <workers>3</workers>\n  <log_level>debug</log_level>\n</config>\n",
    )
    .unwrap();
    set(&path);

    assert_eq!(default_config_path(), Some(path.clone()));
    let cfg = load_config().unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_millis(25));
    assert_eq!(cfg.workers, Some(3));
    assert_eq!(cfg.log_level, LogLevel::Debug);
    assert_eq!(cfg.wait_timeout, None);

    clear();
}

#[test]
#[serial]
fn env_var_to_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    set(&dir.path().join("absent.xml"));
    let err = load_config().unwrap_err();
    assert!(format!("{err:#}").contains(VAR), "{err:#}");
    clear();
}

#[test]
#[serial]
fn unknown_element_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("typo.xml");
    fs::write(&path, "<config><wrokers>4</wrokers></config>").unwrap();
    set(&path);
    assert!(load_config().is_err());
    clear();
}

#[test]
#[serial]
fn default_path_without_env_is_under_treesync() {
    clear();
    if let Some(p) = default_config_path() {
        assert!(p.ends_with("treesync/config.xml"), "{}", p.display());
    }
}
