//! Narrow VCS adapter.
//!
//! This is the only module permitted to shell out to `git`. It exposes
//! exactly the five invocations the gating engine relies on: reading HEAD,
//! listing tracked and untracked files, listing the staged set, and
//! restoring working-tree content from the index/HEAD.

use crate::core::error::StepgateError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Thin wrapper around a `git` binary rooted at a repository.
pub struct GitAdapter {
    root: PathBuf,
}

impl GitAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GitAdapter { root: root.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String, StepgateError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| StepgateError::Vcs(format!("failed to spawn git {:?}: {}", args, e)))?;
        if !output.status.success() {
            return Err(StepgateError::Vcs(format!(
                "git {:?} exited with {}: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether `root` is inside a git working tree at all.
    pub fn is_working_tree(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(&self.root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Current `HEAD` commit id.
    pub fn head(&self) -> Result<String, StepgateError> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// All paths tracked by the index, relative to `root`.
    pub fn tracked_files(&self) -> Result<Vec<String>, StepgateError> {
        Ok(lines(self.run(&["ls-files"])?))
    }

    /// All untracked, non-ignored paths, relative to `root`.
    pub fn untracked_files(&self) -> Result<Vec<String>, StepgateError> {
        Ok(lines(self.run(&["ls-files", "--others", "--exclude-standard"])?))
    }

    /// Paths currently staged (in the index but not in `HEAD`, or vice versa).
    pub fn staged_paths(&self) -> Result<Vec<String>, StepgateError> {
        Ok(lines(self.run(&["diff", "--cached", "--name-only"])?))
    }

    /// Restores the working-tree content of `paths` from the index/HEAD,
    /// discarding any local modification. Does not remove untracked files;
    /// callers remove created paths themselves (see `gatekeeper::revert`).
    pub fn restore(&self, paths: &[impl AsRef<Path>]) -> Result<(), StepgateError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["restore", "--worktree", "--"];
        let owned: Vec<String> = paths
            .iter()
            .map(|p| p.as_ref().to_string_lossy().into_owned())
            .collect();
        args.extend(owned.iter().map(|s| s.as_str()));
        self.run(&args)?;
        Ok(())
    }
}

fn lines(raw: String) -> Vec<String> {
    raw.lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        StdCommand::new("git")
            .args(["init", "-q", "-b", "master"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        StdCommand::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        StdCommand::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        StdCommand::new("git")
            .args(["add", "."])
            .current_dir(dir.path())
            .status()
            .unwrap();
        StdCommand::new("git")
            .args(["commit", "-q", "-m", "initial"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        dir
    }

    #[test]
    fn test_head_and_tracked_files() {
        let dir = init_repo();
        let adapter = GitAdapter::new(dir.path());
        assert!(adapter.is_working_tree());
        let head = adapter.head().unwrap();
        assert_eq!(head.len(), 40);
        assert_eq!(adapter.tracked_files().unwrap(), vec!["README.md"]);
    }

    #[test]
    fn test_restore_discards_modification() {
        let dir = init_repo();
        let adapter = GitAdapter::new(dir.path());
        fs::write(dir.path().join("README.md"), "mutated\n").unwrap();
        adapter.restore(&["README.md"]).unwrap();
        let content = fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_untracked_files() {
        let dir = init_repo();
        fs::write(dir.path().join("scratch.txt"), "x").unwrap();
        let adapter = GitAdapter::new(dir.path());
        assert_eq!(adapter.untracked_files().unwrap(), vec!["scratch.txt"]);
    }
}
