//! Step scheduler (C9).
//!
//! Walks the fixed specialist catalog in order, retrying each step up to a
//! bounded attempt limit with tightening caps, and falls back to a single
//! narrow fixer invocation when all attempts exhaust on a fixer-supported
//! validator code.

use crate::core::agent::{self, AgentCapabilities};
use crate::core::driver::RunContext;
use crate::core::gatekeeper::{self, GateOutcome, StepSpec};
use crate::core::policy::Policy;
use crate::core::selector;
use crate::core::snapshot;
use crate::core::time;
use crate::core::vcs::GitAdapter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub const MAX_ATTEMPTS: u32 = 3;

/// Error codes the narrow fixer is permitted to respond to.
pub const FIXER_SUPPORTED_CODES: [&str; 7] = [
    "REQUIRED_FILE_MISSING",
    "REQUIRED_DIR_MISSING",
    "REQ_HEADING_MISSING",
    "TEST_HEADING_MISSING",
    "TEST_CODEBLOCK_MISSING",
    "AGENT_TASKS_HEADING_MISSING",
    "AGENT_TASKS_SECTION_MISSING",
];

/// Builds the fixed specialist catalog, including `backend` only when
/// required by the brief. `design_b` grants `release_engineer` authority
/// to write `AGENTS.md`, mirroring the bootstrap/tuner pseudo-steps that
/// only run in that mode.
pub fn default_steps(backend_required: bool, design_b: bool) -> Vec<StepSpec> {
    let mut steps = vec![
        StepSpec {
            name: "release_engineer".to_string(),
            role: "release_engineer".to_string(),
            prompt_agent_key: "release_engineer".to_string(),
            allowlist: vec![
                "docker-compose.yml".to_string(),
                ".env.example".to_string(),
                ".gitignore".to_string(),
                "README.md".to_string(),
                "AGENTS.md".to_string(),
            ],
            max_changed_files: 10,
            max_total_bytes_changed: 200_000,
            max_deleted_files: 0,
            can_modify_brief: false,
            can_modify_brief_yaml: false,
            can_modify_agents_doc: design_b,
            can_modify_prompts: false,
        },
        StepSpec {
            name: "requirements".to_string(),
            role: "requirements".to_string(),
            prompt_agent_key: "requirements".to_string(),
            allowlist: vec!["REQUIREMENTS.md".to_string()],
            max_changed_files: 5,
            max_total_bytes_changed: 200_000,
            max_deleted_files: 0,
            can_modify_brief: false,
            can_modify_brief_yaml: false,
            can_modify_agents_doc: false,
            can_modify_prompts: false,
        },
        StepSpec {
            name: "designer".to_string(),
            role: "designer".to_string(),
            prompt_agent_key: "designer".to_string(),
            allowlist: vec!["design/**".to_string(), "REQUIREMENTS.md".to_string()],
            max_changed_files: 20,
            max_total_bytes_changed: 500_000,
            max_deleted_files: 0,
            can_modify_brief: false,
            can_modify_brief_yaml: false,
            can_modify_agents_doc: false,
            can_modify_prompts: false,
        },
        StepSpec {
            name: "frontend".to_string(),
            role: "frontend".to_string(),
            prompt_agent_key: "frontend".to_string(),
            allowlist: vec!["frontend/**".to_string()],
            max_changed_files: 60,
            max_total_bytes_changed: 2_000_000,
            max_deleted_files: 5,
            can_modify_brief: false,
            can_modify_brief_yaml: false,
            can_modify_agents_doc: false,
            can_modify_prompts: false,
        },
    ];

    if backend_required {
        steps.push(StepSpec {
            name: "backend".to_string(),
            role: "backend".to_string(),
            prompt_agent_key: "backend".to_string(),
            allowlist: vec!["backend/**".to_string()],
            max_changed_files: 60,
            max_total_bytes_changed: 2_000_000,
            max_deleted_files: 5,
            can_modify_brief: false,
            can_modify_brief_yaml: false,
            can_modify_agents_doc: false,
            can_modify_prompts: false,
        });
    }

    steps.push(StepSpec {
        name: "qa".to_string(),
        role: "qa".to_string(),
        prompt_agent_key: "qa".to_string(),
        allowlist: vec!["tests/**".to_string(), "TEST.md".to_string()],
        max_changed_files: 40,
        max_total_bytes_changed: 1_000_000,
        max_deleted_files: 5,
        can_modify_brief: false,
        can_modify_brief_yaml: false,
        can_modify_agents_doc: false,
        can_modify_prompts: false,
    });

    steps.push(StepSpec {
        name: "docs".to_string(),
        role: "docs".to_string(),
        prompt_agent_key: "docs".to_string(),
        allowlist: vec!["AGENT_TASKS.md".to_string()],
        max_changed_files: 5,
        max_total_bytes_changed: 200_000,
        max_deleted_files: 0,
        can_modify_brief: false,
        can_modify_brief_yaml: false,
        can_modify_agents_doc: false,
        can_modify_prompts: false,
    });

    steps
}

/// The narrow fixer pseudo-step: allowlist reduced to artifact files only,
/// no prompt/skill paths, run at most once after a step exhausts its
/// retries on a fixer-supported code.
pub fn fixer_step_for(failed_step: &StepSpec) -> StepSpec {
    StepSpec {
        name: format!("{}_fixer", failed_step.name),
        role: failed_step.role.clone(),
        prompt_agent_key: failed_step.prompt_agent_key.clone(),
        allowlist: vec![
            "REQUIREMENTS.md".to_string(),
            "TEST.md".to_string(),
            "AGENT_TASKS.md".to_string(),
        ],
        max_changed_files: 3,
        max_total_bytes_changed: 100_000,
        max_deleted_files: 0,
        can_modify_brief: false,
        can_modify_brief_yaml: false,
        can_modify_agents_doc: false,
        can_modify_prompts: false,
    }
}

/// Whether any failure code in `codes` is within the fixer-supported set.
pub fn fixer_applies(codes: &[String]) -> bool {
    codes.iter().any(|c| FIXER_SUPPORTED_CODES.contains(&c.as_str()))
}

/// Applies any policy-recorded cap overrides for `step.name` on top of the
/// step's compiled-in defaults (§4.9 step d: caps only ever tighten, never
/// loosen, across attempts within a run and across runs via the policy).
pub fn effective_step(step: &StepSpec, policy: &Policy) -> StepSpec {
    let mut effective = step.clone();
    if let Some(ov) = policy.step_limits_overrides.get(&step.name) {
        if let Some(v) = ov.max_changed_files {
            effective.max_changed_files = effective.max_changed_files.min(v as usize);
        }
        if let Some(v) = ov.max_total_bytes_changed {
            effective.max_total_bytes_changed = effective.max_total_bytes_changed.min(v);
        }
        if let Some(v) = ov.max_deleted_files {
            effective.max_deleted_files = effective.max_deleted_files.min(v as usize);
        }
    }
    effective
}

/// Reads `prompts/<agent_key>/*.txt`, returning `(variant_id, text)` pairs
/// sorted by file stem. `variant_id` is the file stem.
pub fn prompt_variants_for_agent(root: &Path, agent_key: &str) -> Vec<(String, String)> {
    let dir = root.join("prompts").join(agent_key);
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(&dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(text) = fs::read_to_string(&path) {
            out.push((stem.to_string(), text));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Walks `.codex/skills/**/SKILL.md` under `root`, returning sorted
/// `(relative_path, content_hash)` pairs. Used to bind the prompt-epoch id
/// to the skill library's content, not just the prompt variants.
pub fn skill_entries_for_epoch(root: &Path) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_skill_files(root, &root.join(".codex").join("skills"), &mut out);
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn collect_skill_files(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_skill_files(root, &path, out);
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) != Some("SKILL.md") {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let Some(rel_str) = rel.to_str() else {
            continue;
        };
        if let Ok(hash) = snapshot::hash_file(&path) {
            out.push((rel_str.replace('\\', "/"), hash));
        }
    }
}

/// Hashes the sorted `(variant_id, variant_text)` pairs, plus (when
/// provided) sorted `(skill_path, skill_hash)` pairs, into the epoch id
/// binding variant stats to exact prompt/skill content.
pub fn hash_prompt_epoch(variants: &[(String, String)], skills: &[(String, String)]) -> String {
    let mut v = variants.to_vec();
    v.sort_by(|a, b| a.0.cmp(&b.0));
    let mut s = skills.to_vec();
    s.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (id, text) in &v {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([1u8]);
    for (path, hash) in &s {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Composes the agent prompt for one step attempt: variant body, a step
/// header naming role/attempt/allowlist, the step's constraint patch (if
/// any), and the full brief text.
pub fn build_step_prompt(
    step: &StepSpec,
    variant_text: &str,
    attempt: u32,
    constraint_patch: &str,
    brief_text: &str,
) -> String {
    let mut out = String::new();
    out.push_str(variant_text);
    out.push_str("\n\n---\n");
    out.push_str(&format!("Step: {}\nRole: {}\nAttempt: {}\n", step.name, step.role, attempt));
    out.push_str("Allowed paths:\n");
    for pat in &step.allowlist {
        out.push_str(&format!("- {}\n", pat));
    }
    out.push_str("Hard rules: do not modify files outside the allowed paths. Do not modify .orchestrator/** or .git/**.\n");
    if !constraint_patch.is_empty() {
        out.push_str("\nPrevious failures to avoid:\n");
        out.push_str(constraint_patch);
        out.push('\n');
    }
    out.push_str("\n---\nProject brief:\n");
    out.push_str(brief_text);
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionLogEntry {
    pub ts: String,
    pub step: String,
    pub attempt: u32,
    pub agent: String,
    pub prompt_epoch_id: String,
    pub variant_id: String,
    pub strategy: String,
    pub bootstrap_min_trials_per_variant: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepAttemptRecord {
    pub ts: String,
    pub step: String,
    pub attempt: u32,
    pub exit_code: i32,
    pub changed_paths: Vec<String>,
    pub deleted_paths: Vec<String>,
    pub new_paths: Vec<String>,
    pub invariant_errors: Vec<String>,
    pub allowlist_errors: Vec<String>,
    pub cap_errors: Vec<String>,
}

/// Outcome of executing one specialist step to completion (success, or
/// exhausted attempts plus an optional fixer pass).
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,
    pub clean_pass: bool,
    pub attempts_used: u32,
    pub fixer_used: bool,
    pub changed_files: Vec<String>,
}

/// Aggregate result of running every specialist step in the catalog.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    pub step_results: Vec<StepResult>,
    pub retries_beyond_first_total: u64,
    pub fixer_runs_total: u64,
    pub changed_files_total: u64,
    pub hard_invalid: bool,
}

fn append_jsonl<T: Serialize>(path: &Path, entry: &T) -> Result<(), crate::core::error::StepgateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut existing = fs::read_to_string(path).unwrap_or_default();
    existing.push_str(&serde_json::to_string(entry)?);
    existing.push('\n');
    fs::write(path, existing)?;
    Ok(())
}

/// Writes `<step>.attempt<N>.stdout.log` / `.stderr.log` under the run
/// directory, captured in full (§6 filesystem layout).
fn write_attempt_logs(
    run_dir: &Path,
    step_name: &str,
    attempt: u32,
    outcome: &agent::AgentOutcome,
) -> Result<(), crate::core::error::StepgateError> {
    fs::create_dir_all(run_dir)?;
    fs::write(
        run_dir.join(format!("{}.attempt{}.stdout.log", step_name, attempt)),
        &outcome.stdout,
    )?;
    fs::write(
        run_dir.join(format!("{}.attempt{}.stderr.log", step_name, attempt)),
        &outcome.stderr,
    )?;
    Ok(())
}

/// Runs one agent invocation for `step` at `attempt`, gates the resulting
/// change set, and reverts on any gating failure. Returns the gate outcome
/// and the post-invocation snapshot's diff summary.
fn run_step_once(
    ctx: &RunContext,
    adapter: &GitAdapter,
    step: &StepSpec,
    attempt: u32,
    prompt: &str,
) -> Result<(GateOutcome, StepAttemptRecord), crate::core::error::StepgateError> {
    let pre = snapshot::snapshot(&ctx.root, adapter)?;

    let outcome = agent::invoke(&ctx.agent_command, ctx.agent_caps, prompt, &ctx.root, ctx.agent_timeout)?;
    write_attempt_logs(&ctx.run_dir, &step.name, attempt, &outcome)?;

    let post = snapshot::snapshot(&ctx.root, adapter)?;
    let (mut gate, diff) = gatekeeper::evaluate(".orchestrator", step, &pre, &post);

    if !outcome.succeeded() {
        gate.cap_errors.push("AGENT_NONZERO_EXIT_OR_TIMEOUT".to_string());
    }

    if !gate.ok() {
        gatekeeper::revert(&ctx.root, adapter, &diff)?;
    }

    let record = StepAttemptRecord {
        ts: time::now_epoch_z(),
        step: step.name.clone(),
        attempt,
        exit_code: outcome.exit_code,
        changed_paths: diff.changed(),
        deleted_paths: diff.deleted.clone(),
        new_paths: diff.created.clone(),
        invariant_errors: gate.invariant_errors.clone(),
        allowlist_errors: gate.allowlist_errors.clone(),
        cap_errors: gate.cap_errors.clone(),
    };

    Ok((gate, record))
}

fn failure_codes(gate: &GateOutcome) -> Vec<String> {
    let mut codes = Vec::new();
    for e in &gate.invariant_errors {
        if e.starts_with("forbidden path") {
            codes.push("FORBIDDEN_PATH_MODIFIED".to_string());
        } else if e.starts_with("HEAD changed") {
            codes.push("HEAD_MOVED".to_string());
        } else {
            codes.push("STAGED_SET_NON_EMPTY".to_string());
        }
    }
    if !gate.allowlist_errors.is_empty() {
        codes.push("ALLOWLIST_VIOLATION".to_string());
    }
    for e in &gate.cap_errors {
        if let Some((code, _)) = e.split_once(':') {
            codes.push(code.to_string());
        }
    }
    if !gate.lock_errors.is_empty() {
        codes.push("LOCK_VIOLATION".to_string());
    }
    codes
}

/// Executes `steps` in order, driving variant selection, retries, cap
/// tightening, constraint-patch recording, and the narrow fixer. Returns
/// the aggregate schedule outcome.
#[allow(clippy::too_many_arguments)]
pub fn execute_specialist_steps(
    ctx: &RunContext,
    adapter: &GitAdapter,
    policy: &mut Policy,
    steps: &[StepSpec],
    brief_text: &str,
) -> Result<ScheduleOutcome, crate::core::error::StepgateError> {
    let mut outcome = ScheduleOutcome::default();
    let selection_log = ctx.run_dir.join("selection_log.jsonl");
    let attempts_log = ctx.run_dir.join("step_attempts.jsonl");
    let fixers_log = ctx.run_dir.join("fixers.jsonl");
    let skills = skill_entries_for_epoch(&ctx.root);

    for step in steps {
        let variants = prompt_variants_for_agent(&ctx.root, &step.prompt_agent_key);
        let (variant_id, variant_text) = if variants.is_empty() {
            (String::new(), String::new())
        } else {
            let ids: Vec<String> = variants.iter().map(|(id, _)| id.clone()).collect();
            let epoch_id = hash_prompt_epoch(&variants, &skills);
            let chosen = selector::select_variant(policy, &step.prompt_agent_key, &epoch_id, &ids);
            let text = variants.iter().find(|(id, _)| id == &chosen).map(|(_, t)| t.clone()).unwrap_or_default();
            (chosen, text)
        };

        let mut success = false;
        let mut clean_pass = false;
        let mut attempts_used = 0u32;
        let mut last_codes: Vec<String> = Vec::new();
        let mut last_changed: Vec<String> = Vec::new();

        for attempt in 0..MAX_ATTEMPTS {
            attempts_used = attempt + 1;
            let patch = policy.constraint_patch(&step.name);
            let step_for_attempt = effective_step(step, policy);
            let prompt = build_step_prompt(&step_for_attempt, &variant_text, attempt, &patch, brief_text);

            if !variant_id.is_empty() {
                let epoch_id = hash_prompt_epoch(&variants, &skills);
                append_jsonl(
                    &selection_log,
                    &SelectionLogEntry {
                        ts: time::now_epoch_z(),
                        step: step.name.clone(),
                        attempt,
                        agent: step.prompt_agent_key.clone(),
                        prompt_epoch_id: epoch_id,
                        variant_id: variant_id.clone(),
                        strategy: policy.selection_strategy.clone(),
                        bootstrap_min_trials_per_variant: policy.bootstrap_min_trials_per_variant,
                    },
                )?;
            }

            let (gate, record) = run_step_once(ctx, adapter, &step_for_attempt, attempt, &prompt)?;
            append_jsonl(&attempts_log, &record)?;

            if gate.ok() {
                success = true;
                clean_pass = attempt == 0;
                last_changed = record.changed_paths;
                break;
            }

            last_codes = failure_codes(&gate);
            policy.record_constraint_patch(&step.name, &last_codes);
            policy.tighten_limits_on_failure(
                &step.name,
                step.max_changed_files as u64,
                step.max_total_bytes_changed,
                step.max_deleted_files as u64,
            );
        }

        if !variant_id.is_empty() {
            let epoch_id = hash_prompt_epoch(&variants, &skills);
            selector::update_variant_stats(policy, &step.prompt_agent_key, &epoch_id, &variant_id, success, clean_pass);
        }

        let mut fixer_used = false;
        if !success && fixer_applies(&last_codes) {
            fixer_used = true;
            outcome.fixer_runs_total += 1;
            let fixer_step = fixer_step_for(step);
            let patch = policy.constraint_patch(&step.name);
            let prompt = build_step_prompt(&fixer_step, "Fix only the missing artifact content.", 0, &patch, brief_text);
            let (gate, record) = run_step_once(ctx, adapter, &fixer_step, 0, &prompt)?;
            append_jsonl(&fixers_log, &record)?;
            if gate.ok() {
                success = true;
                last_changed = record.changed_paths;
            }
        }

        if attempts_used > 1 {
            outcome.retries_beyond_first_total += attempts_used as u64 - 1;
        }
        outcome.changed_files_total += last_changed.len() as u64;
        if !success {
            outcome.hard_invalid = true;
        }

        outcome.step_results.push(StepResult {
            step_name: step.name.clone(),
            success,
            clean_pass,
            attempts_used,
            fixer_used,
            changed_files: last_changed,
        });
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_steps_order_without_backend() {
        let steps = default_steps(false, false);
        let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["release_engineer", "requirements", "designer", "frontend", "qa", "docs"]);
    }

    #[test]
    fn test_default_steps_inserts_backend_when_required() {
        let steps = default_steps(true, false);
        let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["release_engineer", "requirements", "designer", "frontend", "backend", "qa", "docs"]);
    }

    #[test]
    fn test_fixer_applies_detects_supported_code() {
        assert!(fixer_applies(&["REQUIRED_FILE_MISSING".to_string()]));
        assert!(!fixer_applies(&["ALLOWLIST_VIOLATION".to_string()]));
    }

    #[test]
    fn test_hash_prompt_epoch_changes_with_content() {
        let v1 = vec![("a".to_string(), "hello".to_string())];
        let v2 = vec![("a".to_string(), "goodbye".to_string())];
        assert_ne!(hash_prompt_epoch(&v1, &[]), hash_prompt_epoch(&v2, &[]));
    }

    #[test]
    fn test_hash_prompt_epoch_order_independent() {
        let v1 = vec![("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())];
        let v2 = vec![("b".to_string(), "y".to_string()), ("a".to_string(), "x".to_string())];
        assert_eq!(hash_prompt_epoch(&v1, &[]), hash_prompt_epoch(&v2, &[]));
    }

    #[test]
    fn test_prompt_variants_for_agent_sorted_by_stem() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("prompts").join("qa");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.txt"), "second").unwrap();
        fs::write(dir.join("a.txt"), "first").unwrap();
        let variants = prompt_variants_for_agent(tmp.path(), "qa");
        assert_eq!(variants, vec![("a".to_string(), "first".to_string()), ("b".to_string(), "second".to_string())]);
    }

    #[test]
    fn test_build_step_prompt_includes_allowlist_and_brief() {
        let step = &default_steps(false, false)[2];
        let prompt = build_step_prompt(step, "do the design", 1, "avoid X", "brief body");
        assert!(prompt.contains("do the design"));
        assert!(prompt.contains("design/**"));
        assert!(prompt.contains("avoid X"));
        assert!(prompt.contains("brief body"));
        assert!(prompt.contains("Attempt: 1"));
    }

    #[test]
    fn test_effective_step_applies_tightened_override() {
        let step = &default_steps(false, false)[2];
        let mut policy = crate::core::policy::Policy::default();
        policy.tighten_limits_on_failure(&step.name, step.max_changed_files as u64, step.max_total_bytes_changed, step.max_deleted_files as u64);
        let effective = effective_step(step, &policy);
        assert!(effective.max_changed_files < step.max_changed_files);
        assert!(effective.max_total_bytes_changed < step.max_total_bytes_changed);
    }

    #[test]
    fn test_effective_step_unchanged_without_override() {
        let step = &default_steps(false, false)[2];
        let policy = crate::core::policy::Policy::default();
        let effective = effective_step(step, &policy);
        assert_eq!(effective.max_changed_files, step.max_changed_files);
    }

    #[test]
    fn test_fixer_step_allowlist_restricted_to_artifacts() {
        let step = &default_steps(false, false)[2];
        let fixer = fixer_step_for(step);
        assert!(!fixer.allowlist.iter().any(|p| p.starts_with("prompts") || p.starts_with(".codex")));
        assert_eq!(fixer.allowlist.len(), 3);
    }

    #[test]
    fn test_default_steps_design_b_unlocks_agents_doc_for_release_engineer() {
        let without = &default_steps(false, false)[0];
        assert!(without.allowlist.iter().any(|p| p == "AGENTS.md"));
        assert!(!without.can_modify_agents_doc);

        let with = &default_steps(false, true)[0];
        assert!(with.allowlist.iter().any(|p| p == "AGENTS.md"));
        assert!(with.can_modify_agents_doc);
    }

    #[test]
    fn test_hash_prompt_epoch_changes_with_skill_content() {
        let variants = vec![("a".to_string(), "hello".to_string())];
        let s1 = vec![("skill.md".to_string(), "hash1".to_string())];
        let s2 = vec![("skill.md".to_string(), "hash2".to_string())];
        assert_ne!(hash_prompt_epoch(&variants, &s1), hash_prompt_epoch(&variants, &s2));
        assert_ne!(hash_prompt_epoch(&variants, &[]), hash_prompt_epoch(&variants, &s1));
    }

    #[test]
    fn test_skill_entries_for_epoch_walks_nested_skill_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join(".codex").join("skills").join("writing").join("v1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), "do the thing").unwrap();
        fs::write(dir.join("notes.md"), "ignored, not named SKILL.md").unwrap();

        let entries = skill_entries_for_epoch(tmp.path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, ".codex/skills/writing/v1/SKILL.md");
    }
}
