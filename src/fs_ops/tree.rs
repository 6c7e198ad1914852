//! Tree replication: parallel copy and move of directory trees.
//!
//! Phases, in order:
//! 1. mirror the directory skeleton, one parallel batch per depth level;
//! 2. transfer every file in one parallel batch;
//! 3. seal: apply directory permissions/attributes once the files are in,
//!    so read-only directories and directory timestamps survive population;
//! 4. (move only) delete the emptied source tree.

use anyhow::{Context, Result, anyhow};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::errors::TreeSyncError;

use super::batch::WorkerPool;
use super::helpers::{io_error_with_help, io_error_with_help2, is_cross_device};
use super::naming::{EntryKind, unique_copy_name};
use super::perms;
use super::resolve::{resolve_dir, same_entity, shown};
use super::transfer::{copy_contents, relocate_file};
use super::wait::Waiter;

/// One copy or move of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Replace existing destination files instead of failing.
    pub overwrite: bool,
    /// Place the tree at `destination/<source name>` instead of at `destination`.
    pub nest: bool,
    /// Mirror security descriptors / mode bits (copy only; move always does).
    pub permissions: bool,
    /// Mirror attribute bits and timestamps (copy only; move always does).
    pub attributes: bool,
}

impl TreeRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            overwrite: false,
            nest: false,
            permissions: true,
            attributes: true,
        }
    }

    pub fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }

    pub fn nest(mut self, yes: bool) -> Self {
        self.nest = yes;
        self
    }

    pub fn permissions(mut self, yes: bool) -> Self {
        self.permissions = yes;
        self
    }

    pub fn attributes(mut self, yes: bool) -> Self {
        self.attributes = yes;
        self
    }
}

type Pair = (PathBuf, PathBuf);

struct Replicator {
    pool: WorkerPool,
    waiter: Waiter,
}

impl Replicator {
    fn new(config: &Config) -> Self {
        Self {
            pool: WorkerPool::from_config(config),
            waiter: Waiter::from_config(config),
        }
    }

    /// Create every descendant directory of `source` under `target`.
    /// Returns the mirrored pairs for the seal phase.
    fn mirror_skeleton(&self, source: &Path, target: &Path, exclude: Option<&Path>) -> Result<Vec<Pair>> {
        let mut mirrored = Vec::new();
        let mut level: Vec<Pair> = vec![(source.to_path_buf(), target.to_path_buf())];
        let mut depth = 0usize;

        while !level.is_empty() {
            let mut next = Vec::new();
            for (src_dir, dst_dir) in &level {
                for child in child_dirs(src_dir, exclude)? {
                    let name = child
                        .file_name()
                        .ok_or_else(|| anyhow!("directory without a name: {}", child.display()))?;
                    let dst_child = dst_dir.join(name);
                    next.push((child, dst_child));
                }
            }
            depth += 1;
            trace!(depth, dirs = next.len(), "mirror level");

            self.pool.run("mirror directories", next.clone(), |(src, dst)| {
                if same_entity(&src, &dst) {
                    trace!(dir = %src.display(), "self-copy; skipped");
                    return Ok(());
                }
                if !dst.is_dir() {
                    fs::create_dir_all(&dst).map_err(io_error_with_help("create directory", &dst))?;
                    self.waiter.await_exists(&dst)?;
                }
                Ok(())
            })?;

            mirrored.extend(next.iter().cloned());
            level = next;
        }
        debug!(src = %shown(source), dirs = mirrored.len(), "skeleton mirrored");
        Ok(mirrored)
    }

    /// Apply directory metadata after the files are in place.
    fn seal(&self, pairs: Vec<Pair>, permissions: bool, attributes: bool) -> Result<()> {
        if !permissions && !attributes {
            return Ok(());
        }
        self.pool.run("seal directories", pairs, |(src, dst)| {
            if same_entity(&src, &dst) {
                return Ok(());
            }
            perms::propagate(&dst, &src, permissions, attributes)
        })
    }
}

/// Immediate subdirectories of `dir`, excluding `exclude` itself.
fn child_dirs(dir: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("enumerate '{}'", dir.display()))?;
        if entry.file_type().is_dir() {
            if exclude.is_some_and(|x| entry.path() == x) {
                continue;
            }
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Every file under `source` paired with its place under `target`.
/// Symlinks to files are followed; the `exclude` subtree is not entered.
fn list_files(source: &Path, target: &Path, exclude: Option<&Path>) -> Result<Vec<Pair>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| exclude.is_none_or(|x| e.path() != x));
    for entry in walker {
        let entry = entry.with_context(|| format!("enumerate '{}'", source.display()))?;
        let ft = entry.file_type();
        if ft.is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(m) if m.is_file() => {}
                Ok(_) => {
                    warn!(path = %entry.path().display(), "directory symlink not copied");
                    continue;
                }
                Err(_) => {
                    warn!(path = %entry.path().display(), "dangling symlink not copied");
                    continue;
                }
            }
        } else if !ft.is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(source)?;
        let dst = target.join(rel);
        out.push((entry.into_path(), dst));
    }
    Ok(out)
}

/// Every non-directory entry under `source` (files, symlinks of any kind,
/// special files) paired with its place under `target`. Links are not followed.
fn list_movable(source: &Path, target: &Path) -> Result<Vec<Pair>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.with_context(|| format!("enumerate '{}'", source.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(source)?;
        let dst = target.join(rel);
        out.push((entry.into_path(), dst));
    }
    Ok(out)
}

/// Remove a source tree whose entries have all been moved out.
/// Directories go bottom-up with `remove_dir`, so anything left behind fails the call.
fn remove_emptied_tree(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.with_context(|| format!("enumerate '{}'", root.display()))?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path()).map_err(io_error_with_help("remove emptied directory", entry.path()))?;
        }
    }
    Ok(())
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut it = fs::read_dir(path).map_err(io_error_with_help("read directory", path))?;
    Ok(it.next().is_none())
}

fn source_name(source: &Path) -> Result<&OsStr> {
    source
        .file_name()
        .ok_or_else(|| anyhow!("source has no name to nest under: {}", source.display()))
}

/// Destination subtree to leave out of enumeration when it sits inside the source.
fn nested_exclusion<'a>(source: &Path, target: &'a Path) -> Option<&'a Path> {
    (target != source && target.starts_with(source)).then_some(target)
}

/// Copy a directory tree. Returns the effective destination.
pub fn copy_tree(config: &Config, request: &TreeRequest) -> Result<PathBuf> {
    let source = resolve_dir(&request.source)?;
    let destination = resolve_dir(&request.destination)?;

    if !source.is_dir() {
        return Err(TreeSyncError::SourceNotFound(source).into());
    }

    let (target, seal_root) = if request.nest {
        let name = source_name(&source)?;
        let candidate = destination.join(name);
        if same_entity(&candidate, &source) {
            let renamed = unique_copy_name(&destination, name, EntryKind::Dir);
            debug!(src = %shown(&source), dst = %shown(&renamed), "nesting onto itself; auto-named");
            (renamed, true)
        } else {
            (candidate, true)
        }
    } else if same_entity(&destination, &source) {
        let parent = source
            .parent()
            .ok_or_else(|| anyhow!("cannot copy '{}' onto itself: it has no parent", shown(&source)))?;
        let renamed = unique_copy_name(parent, source_name(&source)?, EntryKind::Dir);
        debug!(src = %shown(&source), dst = %shown(&renamed), "copy onto itself; auto-named");
        (renamed, true)
    } else {
        (destination, false)
    };

    if let Ok(meta) = fs::symlink_metadata(&target) {
        if !meta.is_dir() {
            return Err(TreeSyncError::DestinationConflict(target).into());
        }
        if !request.overwrite && !is_empty_dir(&target)? {
            return Err(TreeSyncError::DestinationConflict(target).into());
        }
    }

    let rep = Replicator::new(config);
    debug!(src = %shown(&source), dst = %shown(&target), workers = rep.pool.workers(), "copy tree start");

    if !target.is_dir() {
        fs::create_dir_all(&target).map_err(io_error_with_help("create destination", &target))?;
        rep.waiter.await_exists(&target)?;
    }

    let exclude = nested_exclusion(&source, &target);
    let mut dirs = rep.mirror_skeleton(&source, &target, exclude)?;

    let files = list_files(&source, &target, exclude)?;
    let file_count = files.len();
    let bytes = AtomicU64::new(0);
    rep.pool.run("copy files", files, |(src, dst)| {
        if same_entity(&src, &dst) {
            trace!(file = %src.display(), "self-copy; skipped");
            return Ok(());
        }
        let n = copy_contents(&src, &dst, request.overwrite)?;
        rep.waiter.await_unlocked(&dst)?;
        perms::propagate(&dst, &src, request.permissions, request.attributes)?;
        bytes.fetch_add(n, Ordering::Relaxed);
        Ok(())
    })?;

    if seal_root {
        dirs.push((source.clone(), target.clone()));
    }
    let dir_count = dirs.len();
    rep.seal(dirs, request.permissions, request.attributes)?;

    info!(
        src = %shown(&source),
        dst = %shown(&target),
        files = file_count,
        dirs = dir_count,
        bytes = bytes.into_inner(),
        "copied tree"
    );
    Ok(target)
}

/// Move a directory tree. Returns the effective destination.
pub fn move_tree(config: &Config, request: &TreeRequest) -> Result<PathBuf> {
    let source = resolve_dir(&request.source)?;
    let destination = resolve_dir(&request.destination)?;

    if !source.is_dir() {
        return Err(TreeSyncError::SourceNotFound(source).into());
    }

    let target = if request.nest {
        destination.join(source_name(&source)?)
    } else {
        destination
    };

    if same_entity(&source, &target) {
        return Err(TreeSyncError::SameEntity(target).into());
    }
    if target.starts_with(&source) {
        return Err(anyhow!(
            "cannot move '{}' into its own subtree '{}'",
            shown(&source),
            shown(&target)
        ));
    }

    let rep = Replicator::new(config);

    match fs::symlink_metadata(&target) {
        Ok(meta) if !meta.is_dir() => Err(TreeSyncError::DestinationConflict(target).into()),
        Ok(_) => merge_into(&rep, &source, &target, request.overwrite, false).map(|()| target),
        Err(_) => rename_tree(&rep, &source, &target).map(|()| target),
    }
}

/// Destination exists: mirror, move every non-directory entry, seal, drop the
/// emptied source. `seal_root` also mirrors the root's own metadata.
fn merge_into(rep: &Replicator, source: &Path, target: &Path, overwrite: bool, seal_root: bool) -> Result<()> {
    debug!(src = %shown(source), dst = %shown(target), "move tree: merging into existing destination");
    let mut dirs = rep.mirror_skeleton(source, target, None)?;

    let files = list_movable(source, target)?;
    let file_count = files.len();
    let moved = AtomicUsize::new(0);
    rep.pool.run("move files", files, |(src, dst)| {
        if fs::symlink_metadata(&dst).is_ok() {
            if !overwrite {
                return Err(TreeSyncError::DestinationConflict(dst).into());
            }
            fs::remove_file(&dst).map_err(io_error_with_help("remove existing destination", &dst))?;
            rep.waiter.await_absent(&dst)?;
        }
        relocate_file(&src, &dst)?;
        rep.waiter.await_exists(&dst)?;
        moved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })?;

    if seal_root {
        dirs.push((source.to_path_buf(), target.to_path_buf()));
    }
    rep.seal(dirs, true, true)?;

    remove_emptied_tree(source)?;
    rep.waiter.await_absent(source)?;

    info!(src = %shown(source), dst = %shown(target), files = file_count, moved = moved.into_inner(), "moved tree (merge)");
    Ok(())
}

/// Destination absent: one rename, or copy + delete across devices.
fn rename_tree(rep: &Replicator, source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_error_with_help("create destination parent", parent))?;
    }
    match fs::rename(source, target) {
        Ok(()) => {
            rep.waiter.await_exists(target)?;
            info!(src = %shown(source), dst = %shown(target), "moved tree (rename)");
            Ok(())
        }
        Err(e) if is_cross_device(&e) => {
            debug!(src = %shown(source), dst = %shown(target), "cross-device; moving entries one by one");
            fs::create_dir(target).map_err(io_error_with_help("create destination", target))?;
            rep.waiter.await_exists(target)?;
            merge_into(rep, source, target, false, true)
        }
        Err(e) => Err(io_error_with_help2("rename directory", source, target)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn request_defaults_and_builders() {
        let r = TreeRequest::new("/a", "/b");
        assert!(!r.overwrite && !r.nest && r.permissions && r.attributes);
        let r = r.overwrite(true).nest(true).permissions(false).attributes(false);
        assert!(r.overwrite && r.nest && !r.permissions && !r.attributes);
    }

    #[test]
    fn exclusion_only_for_inner_destinations() {
        let src = Path::new("/data/src");
        assert_eq!(nested_exclusion(src, Path::new("/data/src/out")), Some(Path::new("/data/src/out")));
        assert_eq!(nested_exclusion(src, Path::new("/data/src")), None);
        assert_eq!(nested_exclusion(src, Path::new("/data/srcx")), None);
    }

    #[test]
    fn listing_skips_excluded_subtree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("keep")).unwrap();
        fs::create_dir_all(src.join("out")).unwrap();
        fs::write(src.join("keep/a.txt"), b"a").unwrap();
        fs::write(src.join("out/b.txt"), b"b").unwrap();
        let out = src.join("out");

        let files = list_files(&src, &out, Some(out.as_path())).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, out.join("keep/a.txt"));

        let dirs = child_dirs(&src, Some(out.as_path())).unwrap();
        assert_eq!(dirs, vec![src.join("keep")]);
    }

    #[test]
    fn leftovers_stop_source_removal() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/stray.txt"), b"x").unwrap();

        assert!(remove_emptied_tree(&root).is_err());
        assert!(root.join("a/stray.txt").exists());

        fs::remove_file(root.join("a/stray.txt")).unwrap();
        remove_emptied_tree(&root).unwrap();
        assert!(!root.exists());
    }

    #[cfg(unix)]
    #[test]
    fn movable_listing_includes_links() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("d")).unwrap();
        fs::write(src.join("f"), b"f").unwrap();
        std::os::unix::fs::symlink("d", src.join("to_dir")).unwrap();
        std::os::unix::fs::symlink("gone", src.join("dangling")).unwrap();

        let mut names: Vec<_> = list_movable(&src, Path::new("/t"))
            .unwrap()
            .into_iter()
            .map(|(s, _)| s.file_name().unwrap().to_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["dangling", "f", "to_dir"]);
        // Copy listing skips what it cannot follow to a file.
        assert_eq!(list_files(&src, Path::new("/t"), None).unwrap().len(), 1);
    }
}
