use std::sync::Arc;
use std::thread;

use tempfile::tempdir;
use treesync::FileLockRegistry;

#[test]
fn registry_is_shared_across_threads() {
    let dir = tempdir().unwrap();
    let reg = Arc::new(FileLockRegistry::new());
    let paths: Vec<_> = (0..8).map(|i| dir.path().join(format!("f{i}.lock"))).collect();

    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|p| {
            let reg = Arc::clone(&reg);
            thread::spawn(move || reg.lock(&p))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut expected = paths.clone();
    expected.sort();
    assert_eq!(reg.held_paths(), expected);

    reg.disable_all();
    assert!(reg.held_paths().is_empty());
    for p in &paths {
        assert!(!reg.is_locked(p).unwrap(), "{} should be free", p.display());
    }

    reg.enable_all();
    assert_eq!(reg.held_paths(), expected);
    for p in &paths {
        assert!(reg.is_locked(p).unwrap());
    }
}

#[test]
fn released_path_can_be_relocked() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cycle.lock");
    let reg = FileLockRegistry::new();

    for _ in 0..3 {
        reg.lock(&path);
        assert!(reg.is_locked(&path).unwrap());
        reg.release(&path);
        assert!(!reg.is_locked(&path).unwrap());
    }
}

#[test]
fn concurrent_locks_on_one_path_keep_one_handle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shared.lock");
    let reg = Arc::new(FileLockRegistry::new());

    let mut handles = Vec::new();
    for i in 0..16 {
        let reg = Arc::clone(&reg);
        let path = path.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                reg.lock(&path);
                if i % 4 == 0 {
                    reg.disable_all();
                    reg.enable_all();
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    // Drain anything a late disable_all queued.
    reg.enable_all();

    assert_eq!(reg.held_paths(), vec![path.clone()]);
    assert!(reg.pending_resume().is_empty());
    assert!(reg.is_locked(&path).unwrap());

    // With the single handle closed nothing else keeps the file locked.
    reg.release(&path);
    assert!(reg.held_paths().is_empty());
    assert!(!reg.is_locked(&path).unwrap());
}
