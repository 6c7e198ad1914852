use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_fs::prelude::*;
use tempfile::tempdir;
use treesync::{Config, TreeRequest, TreeSyncError, copy_tree};
use walkdir::WalkDir;

fn cfg() -> Config {
    Config {
        poll_interval: Duration::from_millis(5),
        wait_timeout: Some(Duration::from_secs(30)),
        workers: Some(4),
        ..Config::default()
    }
}

/// Relative path -> file contents (None for directories).
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            let body = e.file_type().is_file().then(|| fs::read(e.path()).unwrap());
            (rel, body)
        })
        .collect()
}

fn sample_tree(root: &assert_fs::TempDir) -> PathBuf {
    let src = root.child("src");
    src.child("a.txt").write_str("alpha").unwrap();
    src.child("sub/b.txt").write_str("beta").unwrap();
    src.child("sub/deeper/c.bin").write_binary(&[0u8, 1, 2, 3]).unwrap();
    src.child("empty").create_dir_all().unwrap();
    src.path().to_path_buf()
}

#[test]
fn copy_into_missing_destination_is_isomorphic() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let dst = td.path().join("out/dst");

    let got = copy_tree(&cfg(), &TreeRequest::new(&src, &dst))?;
    assert_eq!(got, dst);
    assert_eq!(snapshot(&src), snapshot(&dst));
    // Source untouched.
    assert_eq!(fs::read_to_string(src.join("a.txt"))?, "alpha");
    Ok(())
}

#[test]
fn nest_places_tree_under_its_name() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let parent = td.path().join("backups");
    fs::create_dir(&parent)?;

    let got = copy_tree(&cfg(), &TreeRequest::new(&src, &parent).nest(true))?;
    assert_eq!(got, parent.join("src"));
    assert_eq!(snapshot(&src), snapshot(&got));
    Ok(())
}

#[test]
fn nested_self_copy_is_auto_named() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let req = TreeRequest::new(&src, td.path()).nest(true);

    let first = copy_tree(&cfg(), &req)?;
    assert_eq!(first, td.path().join("src - Copy"));
    let second = copy_tree(&cfg(), &req)?;
    assert_eq!(second, td.path().join("src - Copy (2)"));
    assert_eq!(snapshot(&src), snapshot(&second));
    Ok(())
}

#[test]
fn copy_onto_itself_is_auto_named() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let req = TreeRequest::new(&src, &src);

    let first = copy_tree(&cfg(), &req)?;
    assert_eq!(first, td.path().join("src - Copy"));
    assert_eq!(snapshot(&src), snapshot(&first));
    let second = copy_tree(&cfg(), &req)?;
    assert_eq!(second, td.path().join("src - Copy (2)"));
    // The source itself gained nothing.
    assert!(!src.join("src").exists());
    Ok(())
}

#[test]
fn destination_inside_source_is_not_copied_into_itself() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let before = snapshot(&src);
    let inner = src.join("backup");

    copy_tree(&cfg(), &TreeRequest::new(&src, &inner))?;
    assert_eq!(snapshot(&inner), before);
    Ok(())
}

#[test]
fn non_empty_destination_conflicts_without_overwrite() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let dst = td.child("dst");
    dst.child("keep.txt").write_str("mine")?;
    dst.child("a.txt").write_str("old")?;

    let err = copy_tree(&cfg(), &TreeRequest::new(&src, dst.path())).unwrap_err();
    match err.downcast_ref::<TreeSyncError>() {
        Some(TreeSyncError::DestinationConflict(p)) => assert_eq!(p, dst.path()),
        other => panic!("expected DestinationConflict, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(dst.path().join("a.txt"))?, "old");

    // Overwrite merges: source entries replace, extra entries stay.
    copy_tree(&cfg(), &TreeRequest::new(&src, dst.path()).overwrite(true))?;
    assert_eq!(fs::read_to_string(dst.path().join("a.txt"))?, "alpha");
    assert_eq!(fs::read_to_string(dst.path().join("keep.txt"))?, "mine");
    assert_eq!(fs::read_to_string(dst.path().join("sub/b.txt"))?, "beta");
    Ok(())
}

#[test]
fn empty_existing_destination_is_fine() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let src = sample_tree(&td);
    let dst = td.path().join("dst");
    fs::create_dir(&dst)?;

    copy_tree(&cfg(), &TreeRequest::new(&src, &dst))?;
    assert_eq!(snapshot(&src), snapshot(&dst));
    Ok(())
}

#[test]
fn missing_source_is_reported() {
    let td = tempdir().unwrap();
    let missing = td.path().join("nope");
    let err = copy_tree(&cfg(), &TreeRequest::new(&missing, td.path().join("dst"))).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TreeSyncError>(),
        Some(TreeSyncError::SourceNotFound(p)) if p == &missing
    ));
    assert!(!td.path().join("dst").exists());
}

#[cfg(unix)]
mod unix {
    use super::*;
    use filetime::FileTime;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn attributes_and_timestamps_follow_the_source() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempdir()?;
        let src = td.path().join("src");
        fs::create_dir_all(src.join("sub"))?;
        fs::write(src.join("a.txt"), b"a")?;
        fs::write(src.join("sub/b.txt"), b"b")?;

        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        let dir_stamp = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_times(src.join("a.txt"), stamp, stamp)?;
        filetime::set_file_times(src.join("sub/b.txt"), stamp, stamp)?;
        filetime::set_file_times(src.join("sub"), dir_stamp, dir_stamp)?;
        fs::set_permissions(src.join("a.txt"), fs::Permissions::from_mode(0o440))?;

        let dst = td.path().join("dst");
        copy_tree(&cfg(), &TreeRequest::new(&src, &dst))?;

        let a = fs::metadata(dst.join("a.txt"))?;
        assert_eq!(FileTime::from_last_modification_time(&a), stamp);
        assert_eq!(a.permissions().mode() & 0o777, 0o440);
        let b = fs::metadata(dst.join("sub/b.txt"))?;
        assert_eq!(FileTime::from_last_modification_time(&b), stamp);
        // Directory times survive because they are applied after the files land.
        let sub = fs::metadata(dst.join("sub"))?;
        assert_eq!(FileTime::from_last_modification_time(&sub), dir_stamp);
        Ok(())
    }

    #[test]
    fn disabled_attributes_leave_fresh_timestamps() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempdir()?;
        let src = td.path().join("src");
        fs::create_dir_all(&src)?;
        fs::write(src.join("a.txt"), b"a")?;
        let stamp = FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_times(src.join("a.txt"), stamp, stamp)?;

        let dst = td.path().join("dst");
        copy_tree(&cfg(), &TreeRequest::new(&src, &dst).attributes(false))?;
        let a = fs::metadata(dst.join("a.txt"))?;
        assert_ne!(FileTime::from_last_modification_time(&a), stamp);
        Ok(())
    }

    #[test]
    fn read_only_directories_are_populated_then_sealed() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempdir()?;
        let src = td.path().join("src");
        let locked = src.join("locked");
        fs::create_dir_all(&locked)?;
        fs::write(locked.join("f.txt"), b"f")?;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555))?;

        let dst = td.path().join("dst");
        let result = copy_tree(&cfg(), &TreeRequest::new(&src, &dst));

        let copied_mode = fs::metadata(dst.join("locked")).map(|m| m.permissions().mode() & 0o777);
        let copied_file = fs::read(dst.join("locked/f.txt"));
        // Restore so the temp dir can be cleaned up.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;
        if dst.join("locked").exists() {
            fs::set_permissions(dst.join("locked"), fs::Permissions::from_mode(0o755))?;
        }

        result?;
        assert_eq!(copied_mode?, 0o555);
        assert_eq!(copied_file?, b"f");
        Ok(())
    }
}
