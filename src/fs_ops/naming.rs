//! Auto-naming for copies that would otherwise land on their own source.
//!
//! Candidates are probed in order: `name`, `name - Copy`, `name - Copy (2)`,
//! `name - Copy (3)`, ... Files keep their extension; directories treat the
//! whole name as the stem.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// What kind of entity a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

fn split_name(name: &OsStr, kind: EntryKind) -> (OsString, Option<OsString>) {
    match kind {
        EntryKind::Dir => (name.to_owned(), None),
        EntryKind::File => {
            let p = Path::new(name);
            match (p.file_stem(), p.extension()) {
                (Some(stem), Some(ext)) => (stem.to_owned(), Some(ext.to_owned())),
                _ => (name.to_owned(), None),
            }
        }
    }
}

fn candidate(stem: &OsStr, ext: Option<&OsStr>, n: u32) -> OsString {
    let mut out = stem.to_owned();
    match n {
        0 => {}
        1 => out.push(" - Copy"),
        n => out.push(format!(" - Copy ({n})")),
    }
    if let Some(ext) = ext {
        out.push(".");
        out.push(ext);
    }
    out
}

/// First path under `dir` built from `name` that does not exist yet.
pub fn unique_copy_name(dir: &Path, name: &OsStr, kind: EntryKind) -> PathBuf {
    let (stem, ext) = split_name(name, kind);
    let mut n = 0u32;
    loop {
        let path = dir.join(candidate(&stem, ext.as_deref(), n));
        // symlink_metadata so a dangling link still counts as taken.
        if std::fs::symlink_metadata(&path).is_err() {
            return path;
        }
        n += 1;
    }
}
