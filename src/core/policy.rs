//! Policy store (C7).
//!
//! Persists per-(agent, prompt-epoch) variant statistics and the selection
//! strategy's tunable knobs across runs. Written atomically (temp file then
//! rename) so a crash mid-write never corrupts `policy.json`.

use crate::core::error::StepgateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const POLICY_FILE: &str = "policy.json";

fn default_version() -> u32 {
    1
}
fn default_strategy() -> String {
    "ucb1".to_string()
}
fn default_bootstrap_min() -> u32 {
    3
}
fn default_ucb_c() -> f64 {
    1.0
}
fn default_commit_window() -> u32 {
    10
}
fn default_elim_min_trials() -> u32 {
    6
}
fn default_elim_min_mean_clean() -> f64 {
    0.1
}
fn default_elim_max_failure_rate() -> f64 {
    0.9
}

/// The persistent policy document (§3). Unknown extra keys round-trip
/// through `serde_json::Value` via `#[serde(flatten)]` so a future writer's
/// additions survive a `load` → `save` cycle by this binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_strategy")]
    pub selection_strategy: String,
    #[serde(default = "default_bootstrap_min")]
    pub bootstrap_min_trials_per_variant: u32,
    #[serde(default = "default_ucb_c")]
    pub ucb_c: f64,
    #[serde(default = "default_commit_window")]
    pub commit_window_runs: u32,
    #[serde(default = "default_elim_min_trials")]
    pub elim_min_trials: u32,
    #[serde(default = "default_elim_min_mean_clean")]
    pub elim_min_mean_clean: f64,
    #[serde(default = "default_elim_max_failure_rate")]
    pub elim_max_failure_rate: f64,
    #[serde(default)]
    pub step_limits_overrides: BTreeMap<String, StepLimitOverride>,
    #[serde(default)]
    pub constraint_patches: BTreeMap<String, String>,
    #[serde(default)]
    pub stats: BTreeMap<String, VariantBucket>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            version: default_version(),
            selection_strategy: default_strategy(),
            bootstrap_min_trials_per_variant: default_bootstrap_min(),
            ucb_c: default_ucb_c(),
            commit_window_runs: default_commit_window(),
            elim_min_trials: default_elim_min_trials(),
            elim_min_mean_clean: default_elim_min_mean_clean(),
            elim_max_failure_rate: default_elim_max_failure_rate(),
            step_limits_overrides: BTreeMap::new(),
            constraint_patches: BTreeMap::new(),
            stats: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Per-step tightened caps recorded after a gating violation. `None` fields
/// leave the step spec's compiled-in default untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepLimitOverride {
    #[serde(default)]
    pub max_changed_files: Option<u64>,
    #[serde(default)]
    pub max_total_bytes_changed: Option<u64>,
    #[serde(default)]
    pub max_deleted_files: Option<u64>,
}

/// Explore-then-commit's running state for one variant bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub best_variant_id: Option<String>,
    #[serde(default)]
    pub remaining: i64,
    #[serde(default)]
    pub consecutive_not_clean_best: u32,
}

impl Default for CommitState {
    fn default() -> Self {
        CommitState {
            active: false,
            best_variant_id: None,
            remaining: 0,
            consecutive_not_clean_best: 0,
        }
    }
}

/// Per-`(agent_key, epoch_id)` variant statistics (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VariantBucket {
    #[serde(default)]
    pub attempts: BTreeMap<String, u64>,
    #[serde(default)]
    pub passes: BTreeMap<String, u64>,
    #[serde(default)]
    pub clean_passes: BTreeMap<String, u64>,
    #[serde(default = "default_last_rr_index")]
    pub last_rr_index: i64,
    #[serde(default)]
    pub commit: CommitState,
    #[serde(default)]
    pub eliminated: Vec<String>,
    #[serde(default)]
    pub selection_strategy: Option<String>,
}

fn default_last_rr_index() -> i64 {
    -1
}

/// Joins `(agent_key, epoch_id)` into the policy document's flat map key.
/// `::` cannot occur in either component since agent keys are identifiers
/// and epoch ids are hex digests.
pub fn stats_key(agent_key: &str, epoch_id: &str) -> String {
    format!("{}::{}", agent_key, epoch_id)
}

impl Policy {
    /// Returns (creating on first access) the variant bucket for
    /// `(agent_key, epoch_id)`.
    pub fn stats_bucket(&mut self, agent_key: &str, epoch_id: &str) -> &mut VariantBucket {
        self.stats
            .entry(stats_key(agent_key, epoch_id))
            .or_default()
    }

    /// Returns the ≤8-line constraint patch recorded for `step_name`, or an
    /// empty string if none.
    pub fn constraint_patch(&self, step_name: &str) -> String {
        self.constraint_patches
            .get(step_name)
            .map(|s| s.lines().take(8).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    /// Records a one-line-per-code constraint patch (truncated to 8 lines)
    /// naming the deterministic failure codes observed for `step_name`.
    pub fn record_constraint_patch(&mut self, step_name: &str, error_codes: &[String]) {
        let mut unique: Vec<&String> = error_codes.iter().collect();
        unique.sort();
        unique.dedup();
        if unique.is_empty() {
            return;
        }
        let lines: Vec<String> = unique
            .into_iter()
            .take(8)
            .map(|c| format!("- Previous deterministic failure code: {}. Avoid triggering it.", c))
            .collect();
        self.constraint_patches
            .insert(step_name.to_string(), lines.join("\n"));
    }

    /// Tightens (never loosens) the per-step cap overrides after a gating
    /// violation: ×0.8 of the current changed-file and byte caps, floored at
    /// 5 / 20,000 respectively; deletions are floored at 0.
    pub fn tighten_limits_on_failure(&mut self, step_name: &str, changed_files_cap: u64, bytes_cap: u64, deleted_cap: u64) {
        let entry = self.step_limits_overrides.entry(step_name.to_string()).or_default();
        let tightened_files = ((changed_files_cap as f64 * 0.8) as u64).max(5);
        let tightened_bytes = ((bytes_cap as f64 * 0.8) as u64).max(20_000);
        entry.max_changed_files = Some(entry.max_changed_files.unwrap_or(changed_files_cap).min(tightened_files));
        entry.max_total_bytes_changed =
            Some(entry.max_total_bytes_changed.unwrap_or(bytes_cap).min(tightened_bytes));
        entry.max_deleted_files = Some(entry.max_deleted_files.unwrap_or(deleted_cap).min(0));
    }
}

/// `load() → Policy`, filling defaults for a missing or malformed file.
pub fn load(state_dir: &Path) -> Result<Policy, StepgateError> {
    let path = state_dir.join(POLICY_FILE);
    if !path.exists() {
        return Ok(Policy::default());
    }
    let text = fs::read_to_string(&path)?;
    let policy: Policy = serde_json::from_str(&text)?;
    Ok(policy)
}

/// `save(Policy)`, atomic via write-temp-then-rename.
pub fn save(state_dir: &Path, policy: &Policy) -> Result<(), StepgateError> {
    fs::create_dir_all(state_dir)?;
    let path = state_dir.join(POLICY_FILE);
    let tmp_path = state_dir.join(format!("{}.tmp", POLICY_FILE));
    let text = serde_json::to_string_pretty(policy)?;
    fs::write(&tmp_path, text)?;
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_yields_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = load(tmp.path()).unwrap();
        assert_eq!(policy.selection_strategy, "ucb1");
        assert_eq!(policy.bootstrap_min_trials_per_variant, 3);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut policy = Policy::default();
        policy.stats_bucket("qa", "epoch1").attempts.insert("v1".into(), 3);
        save(tmp.path(), &policy).unwrap();
        let loaded = load(tmp.path()).unwrap();
        assert_eq!(loaded.stats.get("qa::epoch1").unwrap().attempts["v1"], 3);
    }

    #[test]
    fn test_load_fills_defaults_for_missing_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join(POLICY_FILE), r#"{"selection_strategy": "rr_elimination"}"#).unwrap();
        let policy = load(tmp.path()).unwrap();
        assert_eq!(policy.selection_strategy, "rr_elimination");
        assert_eq!(policy.bootstrap_min_trials_per_variant, 3);
        assert_eq!(policy.ucb_c, 1.0);
    }

    #[test]
    fn test_stats_bucket_creates_zero_initialized() {
        let mut policy = Policy::default();
        let bucket = policy.stats_bucket("designer", "e1");
        assert!(bucket.attempts.is_empty());
        assert_eq!(bucket.last_rr_index, -1);
    }

    #[test]
    fn test_record_and_fetch_constraint_patch_truncated() {
        let mut policy = Policy::default();
        let codes: Vec<String> = (0..12).map(|i| format!("CODE_{}", i)).collect();
        policy.record_constraint_patch("qa", &codes);
        let patch = policy.constraint_patch("qa");
        assert_eq!(patch.lines().count(), 8);
    }

    #[test]
    fn test_tighten_limits_only_decreases() {
        let mut policy = Policy::default();
        policy.tighten_limits_on_failure("qa", 60, 500_000, 0);
        let ov = &policy.step_limits_overrides["qa"];
        assert_eq!(ov.max_changed_files, Some(48));
        assert_eq!(ov.max_total_bytes_changed, Some(400_000));
        assert_eq!(ov.max_deleted_files, Some(0));
    }
}
