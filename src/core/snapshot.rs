//! Workspace snapshot & diff (C1).
//!
//! A snapshot is a content-hashed map of every tracked and untracked
//! (non-ignored) file in the workspace, plus the VCS state needed by the
//! gating engine's invariant checks. Diffing two snapshots is pure.

use crate::core::error::StepgateError;
use crate::core::vcs::GitAdapter;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Content hash and size of one file at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub content_hash: String,
    pub size: u64,
}

/// A full workspace snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub files: BTreeMap<String, FileStat>,
    pub head: String,
    pub staged_paths: Vec<String>,
}

/// The set of path-level changes between two snapshots.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Diff {
    /// The union of created, modified, and deleted paths, sorted.
    pub fn changed(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .created
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Hashes a single file's content with SHA-256, returning a hex digest.
pub fn hash_file(path: &Path) -> Result<String, StepgateError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Takes a snapshot of `root` using `adapter` to enumerate tracked and
/// untracked-non-ignored files. Symlinks are recorded with a zero hash and
/// size 0 rather than read, since the path policy treats them specially.
pub fn snapshot(root: &Path, adapter: &GitAdapter) -> Result<Snapshot, StepgateError> {
    let mut files = BTreeMap::new();
    let mut relpaths = adapter.tracked_files()?;
    relpaths.extend(adapter.untracked_files()?);
    relpaths.sort();
    relpaths.dedup();

    for rel in relpaths {
        let abs = root.join(&rel);
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(_) => continue, // file disappeared between listing and stat
        };
        if meta.file_type().is_symlink() {
            files.insert(
                rel,
                FileStat {
                    content_hash: String::new(),
                    size: 0,
                },
            );
            continue;
        }
        if !meta.is_file() {
            continue;
        }
        let content_hash = hash_file(&abs)?;
        files.insert(
            rel,
            FileStat {
                content_hash,
                size: meta.len(),
            },
        );
    }

    Ok(Snapshot {
        files,
        head: adapter.head()?,
        staged_paths: adapter.staged_paths()?,
    })
}

/// Computes the diff between two snapshots: paths present only in `post` are
/// created, present only in `pre` are deleted, present in both with a
/// different hash are modified.
pub fn diff(pre: &Snapshot, post: &Snapshot) -> Diff {
    let mut out = Diff::default();
    for (path, post_stat) in &post.files {
        match pre.files.get(path) {
            None => out.created.push(path.clone()),
            Some(pre_stat) if pre_stat != post_stat => out.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in pre.files.keys() {
        if !post.files.contains_key(path) {
            out.deleted.push(path.clone());
        }
    }
    out.created.sort();
    out.modified.sort();
    out.deleted.sort();
    out
}

/// Sum of post-size for every changed path still present, else its pre-size.
/// Used by the gating engine's byte-cap check.
pub fn total_bytes_changed(pre: &Snapshot, post: &Snapshot, diff: &Diff) -> u64 {
    diff.changed()
        .iter()
        .map(|p| {
            post.files
                .get(p)
                .or_else(|| pre.files.get(p))
                .map(|s| s.size)
                .unwrap_or(0)
        })
        .sum()
}

/// Absolute path for a workspace-relative path, without resolving symlinks.
pub fn abs_path(root: &Path, rel: &str) -> PathBuf {
    root.join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(hash: &str, size: u64) -> FileStat {
        FileStat {
            content_hash: hash.to_string(),
            size,
        }
    }

    fn snap(pairs: &[(&str, &str, u64)]) -> Snapshot {
        let mut files = BTreeMap::new();
        for (path, hash, size) in pairs {
            files.insert(path.to_string(), stat(hash, *size));
        }
        Snapshot {
            files,
            head: "abc".to_string(),
            staged_paths: vec![],
        }
    }

    #[test]
    fn test_diff_detects_created_modified_deleted() {
        let pre = snap(&[("a.txt", "h1", 10), ("b.txt", "h2", 20)]);
        let post = snap(&[("a.txt", "h1", 10), ("b.txt", "h3", 25), ("c.txt", "h4", 5)]);
        let d = diff(&pre, &post);
        assert_eq!(d.created, vec!["c.txt"]);
        assert_eq!(d.modified, vec!["b.txt"]);
        assert!(d.deleted.is_empty());
    }

    #[test]
    fn test_diff_is_symmetric_swap() {
        let pre = snap(&[("a.txt", "h1", 10)]);
        let post = snap(&[("b.txt", "h2", 20)]);
        let forward = diff(&pre, &post);
        let backward = diff(&post, &pre);
        assert_eq!(forward.created, backward.deleted);
        assert_eq!(forward.deleted, backward.created);
    }

    #[test]
    fn test_changed_union_sorted_and_deduped() {
        let d = Diff {
            created: vec!["c.txt".into()],
            modified: vec!["a.txt".into()],
            deleted: vec!["b.txt".into()],
        };
        assert_eq!(d.changed(), vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_total_bytes_changed_uses_post_then_pre_size() {
        let pre = snap(&[("a.txt", "h1", 10), ("b.txt", "h2", 20)]);
        let post = snap(&[("a.txt", "h1x", 15)]); // a modified, b deleted
        let d = diff(&pre, &post);
        assert_eq!(total_bytes_changed(&pre, &post, &d), 15 + 20);
    }
}
