//! Gating engine (C3).
//!
//! Classifies a step's filesystem changes against its allowlist, invariants,
//! and caps, and performs deterministic revert when a change set is
//! rejected.

use crate::core::error::StepgateError;
use crate::core::path_policy;
use crate::core::snapshot::{self, Diff, Snapshot};
use crate::core::vcs::GitAdapter;
use std::fs;
use std::path::Path;

/// The immutable shape of one pipeline step, as consumed by the gating
/// engine and the scheduler.
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub name: String,
    pub role: String,
    pub prompt_agent_key: String,
    pub allowlist: Vec<String>,
    pub max_changed_files: usize,
    pub max_total_bytes_changed: u64,
    pub max_deleted_files: usize,
    pub can_modify_brief: bool,
    pub can_modify_brief_yaml: bool,
    pub can_modify_agents_doc: bool,
    pub can_modify_prompts: bool,
}

/// Structured result of gating one step's change set.
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub invariant_errors: Vec<String>,
    pub allowlist_errors: Vec<String>,
    pub cap_errors: Vec<String>,
    pub lock_errors: Vec<String>,
}

impl GateOutcome {
    pub fn ok(&self) -> bool {
        self.invariant_errors.is_empty()
            && self.allowlist_errors.is_empty()
            && self.cap_errors.is_empty()
            && self.lock_errors.is_empty()
    }
}

const PROTECTED_BRIEF: &str = "PROJECT_BRIEF.md";
const PROTECTED_BRIEF_YAML: &str = "PROJECT_BRIEF.yaml";
const PROTECTED_AGENTS_DOC: &str = "AGENTS.md";

/// Evaluates a completed step's change set. Pure given the two snapshots.
pub fn evaluate(
    orchestrator_dir_name: &str,
    step: &StepSpec,
    pre: &Snapshot,
    post: &Snapshot,
) -> (GateOutcome, Diff) {
    let diff = snapshot::diff(pre, post);
    let mut outcome = GateOutcome::default();

    if post.head != pre.head {
        outcome
            .invariant_errors
            .push(format!("HEAD changed: {} -> {}", pre.head, post.head));
    }
    if !pre.staged_paths.is_empty() {
        outcome
            .invariant_errors
            .push("staged set was non-empty at step start".to_string());
    }
    if !post.staged_paths.is_empty() {
        outcome
            .invariant_errors
            .push("staged set is non-empty at step end".to_string());
    }

    let changed = diff.changed();
    for path in &changed {
        if path_policy::is_forbidden(path, orchestrator_dir_name) {
            outcome
                .invariant_errors
                .push(format!("forbidden path modified: {}", path));
        }
    }

    if outcome.invariant_errors.is_empty() {
        match path_policy::check_allowlist(Path::new(""), orchestrator_dir_name, &step.allowlist, &changed)
        {
            Ok(violations) => {
                for v in violations {
                    outcome
                        .allowlist_errors
                        .push(format!("path outside allowlist: {}", v));
                }
            }
            Err(e) => outcome.invariant_errors.push(e.to_string()),
        }
    }

    if changed.len() > step.max_changed_files {
        outcome.cap_errors.push(format!(
            "CHANGED_FILES_CAP_EXCEEDED: {} > {}",
            changed.len(),
            step.max_changed_files
        ));
    }
    if diff.deleted.len() > step.max_deleted_files {
        outcome.cap_errors.push(format!(
            "DELETED_FILES_CAP_EXCEEDED: {} > {}",
            diff.deleted.len(),
            step.max_deleted_files
        ));
    }
    let total_bytes = snapshot::total_bytes_changed(pre, post, &diff);
    if total_bytes > step.max_total_bytes_changed {
        outcome.cap_errors.push(format!(
            "BYTES_CHANGED_CAP_EXCEEDED: {} > {}",
            total_bytes, step.max_total_bytes_changed
        ));
    }

    for path in &changed {
        let (protected, allowed) = if path == PROTECTED_BRIEF {
            (true, step.can_modify_brief)
        } else if path == PROTECTED_BRIEF_YAML {
            (true, step.can_modify_brief_yaml)
        } else if path == PROTECTED_AGENTS_DOC {
            (true, step.can_modify_agents_doc)
        } else if path.starts_with("prompts/") || path.starts_with(".codex/skills/") {
            (true, step.can_modify_prompts)
        } else {
            (false, true)
        };
        if protected && !allowed {
            outcome
                .lock_errors
                .push(format!("locked path modified without authorization: {}", path));
        }
    }

    (outcome, diff)
}

/// Deterministically reverts `diff` relative to `pre`: restores every
/// modified/deleted path via the VCS adapter and removes every created
/// path, then prunes parent directories that became empty, stopping at
/// `root` (never above it).
pub fn revert(root: &Path, adapter: &GitAdapter, diff: &Diff) -> Result<(), StepgateError> {
    let mut to_restore: Vec<&String> = diff.modified.iter().chain(diff.deleted.iter()).collect();
    to_restore.sort();
    if !to_restore.is_empty() {
        adapter.restore(&to_restore)?;
    }

    for created in &diff.created {
        let abs = root.join(created);
        match fs::symlink_metadata(&abs) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&abs)?,
            Ok(_) => fs::remove_file(&abs)?,
            Err(_) => {}
        }
        prune_empty_parents(root, &abs)?;
    }
    Ok(())
}

fn prune_empty_parents(root: &Path, leaf: &Path) -> Result<(), StepgateError> {
    let mut dir = leaf.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        let is_empty = match fs::read_dir(&d) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => break,
        };
        if !is_empty {
            break;
        }
        fs::remove_dir(&d)?;
        dir = d.parent().map(Path::to_path_buf);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> StepSpec {
        StepSpec {
            name: "designer".into(),
            role: "designer".into(),
            prompt_agent_key: "designer".into(),
            allowlist: vec!["design/**".into(), "REQUIREMENTS.md".into()],
            max_changed_files: 10,
            max_total_bytes_changed: 100_000,
            max_deleted_files: 0,
            can_modify_brief: false,
            can_modify_brief_yaml: false,
            can_modify_agents_doc: false,
            can_modify_prompts: false,
        }
    }

    fn snap(head: &str, files: &[(&str, &str, u64)]) -> Snapshot {
        let mut map = BTreeMap::new();
        for (p, h, s) in files {
            map.insert(
                p.to_string(),
                snapshot::FileStat {
                    content_hash: h.to_string(),
                    size: *s,
                },
            );
        }
        Snapshot {
            files: map,
            head: head.to_string(),
            staged_paths: vec![],
        }
    }

    #[test]
    fn test_evaluate_clean_change_within_allowlist() {
        let pre = snap("abc", &[]);
        let post = snap("abc", &[("design/overview.md", "h1", 10)]);
        let (outcome, _) = evaluate(".orchestrator", &spec(), &pre, &post);
        assert!(outcome.ok());
    }

    #[test]
    fn test_evaluate_flags_allowlist_violation() {
        let pre = snap("abc", &[]);
        let post = snap("abc", &[("backend/server.js", "h1", 10)]);
        let (outcome, _) = evaluate(".orchestrator", &spec(), &pre, &post);
        assert!(!outcome.ok());
        assert_eq!(outcome.allowlist_errors.len(), 1);
    }

    #[test]
    fn test_evaluate_flags_head_move_as_invariant() {
        let pre = snap("abc", &[]);
        let post = snap("def", &[]);
        let (outcome, _) = evaluate(".orchestrator", &spec(), &pre, &post);
        assert_eq!(outcome.invariant_errors.len(), 1);
    }

    #[test]
    fn test_evaluate_flags_cap_exceeded() {
        let mut s = spec();
        s.max_changed_files = 1;
        let pre = snap("abc", &[]);
        let post = snap(
            "abc",
            &[("design/a.md", "h1", 1), ("design/b.md", "h2", 1)],
        );
        let (outcome, _) = evaluate(".orchestrator", &s, &pre, &post);
        assert_eq!(outcome.cap_errors.len(), 1);
    }

    #[test]
    fn test_evaluate_flags_locked_brief_modification() {
        let pre = snap("abc", &[]);
        let post = snap("abc", &[(PROTECTED_BRIEF, "h1", 10)]);
        let (outcome, _) = evaluate(".orchestrator", &spec(), &pre, &post);
        assert_eq!(outcome.lock_errors.len(), 1);
    }
}
