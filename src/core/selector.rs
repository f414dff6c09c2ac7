//! Variant selector (C8).
//!
//! Picks a prompt variant id per step given the policy document's stats and
//! the configured selection strategy. Deterministic given its inputs: the
//! sorted variant id list is the primary tie-break throughout.

use crate::core::policy::{CommitState, Policy};

pub const STRATEGY_UCB1: &str = "ucb1";
pub const STRATEGY_EXPLORE_THEN_COMMIT: &str = "explore_then_commit";
pub const STRATEGY_RR_ELIMINATION: &str = "rr_elimination";

fn mean_clean(bucket_attempts: u64, bucket_clean_passes: u64) -> f64 {
    bucket_clean_passes as f64 / bucket_attempts.max(1) as f64
}

/// Selects a variant id from `variant_ids_sorted` for `(agent_key, epoch_id)`,
/// mutating the policy's bucket (round-robin pointers, commit state,
/// elimination set) as a side effect of selection itself.
pub fn select_variant(policy: &mut Policy, agent_key: &str, epoch_id: &str, variant_ids_sorted: &[String]) -> String {
    assert!(!variant_ids_sorted.is_empty(), "selector requires at least one variant");

    let bootstrap_min = policy.bootstrap_min_trials_per_variant as u64;
    let strategy = normalize_strategy(&policy.selection_strategy);

    let bucket = policy.stats_bucket(agent_key, epoch_id);
    for vid in variant_ids_sorted {
        bucket.attempts.entry(vid.clone()).or_insert(0);
        bucket.passes.entry(vid.clone()).or_insert(0);
        bucket.clean_passes.entry(vid.clone()).or_insert(0);
    }

    let needs_bootstrap = variant_ids_sorted
        .iter()
        .any(|v| *bucket.attempts.get(v).unwrap_or(&0) < bootstrap_min);

    if needs_bootstrap {
        let rr_index = ((bucket.last_rr_index + 1) as usize) % variant_ids_sorted.len();
        bucket.last_rr_index = rr_index as i64;
        return variant_ids_sorted[rr_index].clone();
    }

    bucket.selection_strategy = Some(strategy.to_string());

    match strategy {
        STRATEGY_UCB1 => select_ucb1(policy, agent_key, epoch_id, variant_ids_sorted),
        STRATEGY_EXPLORE_THEN_COMMIT => select_explore_then_commit(policy, agent_key, epoch_id, variant_ids_sorted),
        _ => select_rr_elimination(policy, agent_key, epoch_id, variant_ids_sorted),
    }
}

fn normalize_strategy(raw: &str) -> &'static str {
    match raw {
        STRATEGY_UCB1 => STRATEGY_UCB1,
        STRATEGY_EXPLORE_THEN_COMMIT => STRATEGY_EXPLORE_THEN_COMMIT,
        STRATEGY_RR_ELIMINATION => STRATEGY_RR_ELIMINATION,
        _ => STRATEGY_UCB1,
    }
}

fn select_ucb1(policy: &mut Policy, agent_key: &str, epoch_id: &str, variant_ids_sorted: &[String]) -> String {
    let c = policy.ucb_c;
    let bucket = policy.stats_bucket(agent_key, epoch_id);
    let total_attempts: u64 = variant_ids_sorted.iter().map(|v| *bucket.attempts.get(v).unwrap_or(&0)).sum();

    let mut best: Option<(f64, &String)> = None;
    for v in variant_ids_sorted {
        let attempts = *bucket.attempts.get(v).unwrap_or(&0);
        let clean = *bucket.clean_passes.get(v).unwrap_or(&0);
        let score = mean_clean(attempts, clean)
            + c * ((total_attempts.max(1) as f64).ln() / attempts.max(1) as f64).sqrt();
        match &best {
            None => best = Some((score, v)),
            Some((best_score, best_v)) => {
                if score > *best_score || (score == *best_score && v < *best_v) {
                    best = Some((score, v));
                }
            }
        }
    }
    best.expect("non-empty variant list").1.clone()
}

fn select_explore_then_commit(policy: &mut Policy, agent_key: &str, epoch_id: &str, variant_ids_sorted: &[String]) -> String {
    let commit_window = policy.commit_window_runs as i64;
    let bucket = policy.stats_bucket(agent_key, epoch_id);

    if bucket.commit.active {
        if let Some(best) = bucket.commit.best_variant_id.clone() {
            if bucket.commit.remaining > 0 && variant_ids_sorted.contains(&best) {
                bucket.commit.remaining -= 1;
                return best;
            }
        }
    }

    let mut sorted: Vec<&String> = variant_ids_sorted.iter().collect();
    sorted.sort_by(|a, b| {
        let ca = *bucket.clean_passes.get(*a).unwrap_or(&0);
        let aa = *bucket.attempts.get(*a).unwrap_or(&0);
        let cb = *bucket.clean_passes.get(*b).unwrap_or(&0);
        let ab = *bucket.attempts.get(*b).unwrap_or(&0);
        mean_clean(ab, cb)
            .partial_cmp(&mean_clean(aa, ca))
            .unwrap()
            .then_with(|| a.cmp(b))
    });
    let best = sorted[0].clone();
    bucket.commit = CommitState {
        active: true,
        best_variant_id: Some(best.clone()),
        remaining: commit_window - 1,
        consecutive_not_clean_best: 0,
    };
    best
}

fn select_rr_elimination(policy: &mut Policy, agent_key: &str, epoch_id: &str, variant_ids_sorted: &[String]) -> String {
    let elim_min_trials = policy.elim_min_trials as u64;
    let elim_min_mean_clean = policy.elim_min_mean_clean;
    let elim_max_failure_rate = policy.elim_max_failure_rate;
    let bucket = policy.stats_bucket(agent_key, epoch_id);

    let active: Vec<&String> = variant_ids_sorted
        .iter()
        .filter(|v| !bucket.eliminated.contains(v))
        .collect();

    if active.is_empty() {
        bucket.eliminated.clear();
        let rr_index = ((bucket.last_rr_index + 1) as usize) % variant_ids_sorted.len();
        bucket.last_rr_index = rr_index as i64;
        return variant_ids_sorted[rr_index].clone();
    }

    let active_idx = ((bucket.last_rr_index + 1).max(0) as usize) % active.len();
    let chosen = active[active_idx].clone();

    let mut eliminated: Vec<String> = bucket.eliminated.clone();
    for v in &active {
        let attempts = *bucket.attempts.get(*v).unwrap_or(&0);
        let passes = *bucket.passes.get(*v).unwrap_or(&0);
        let clean = *bucket.clean_passes.get(*v).unwrap_or(&0);
        let mc = mean_clean(attempts, clean);
        let failure_rate = 1.0 - (passes as f64 / attempts.max(1) as f64);
        if attempts >= elim_min_trials && (mc < elim_min_mean_clean || failure_rate > elim_max_failure_rate) {
            if !eliminated.contains(*v) {
                eliminated.push((*v).clone());
            }
        }
    }
    eliminated.sort();
    bucket.eliminated = eliminated;
    bucket.last_rr_index = variant_ids_sorted.iter().position(|v| v == &chosen).unwrap_or(0) as i64;
    chosen
}

/// Updates post-attempt stats for the variant chosen this attempt:
/// increments `attempts`; increments `passes` if the step ultimately passed;
/// increments `clean_passes` if it also passed on the step's first attempt.
/// Also drives the explore-then-commit release state machine.
pub fn update_variant_stats(
    policy: &mut Policy,
    agent_key: &str,
    epoch_id: &str,
    variant_id: &str,
    passed: bool,
    clean_pass: bool,
) {
    let strategy = normalize_strategy(&policy.selection_strategy).to_string();
    let bucket = policy.stats_bucket(agent_key, epoch_id);
    *bucket.attempts.entry(variant_id.to_string()).or_insert(0) += 1;
    if passed {
        *bucket.passes.entry(variant_id.to_string()).or_insert(0) += 1;
    }
    if clean_pass {
        *bucket.clean_passes.entry(variant_id.to_string()).or_insert(0) += 1;
    }

    if strategy == STRATEGY_EXPLORE_THEN_COMMIT {
        let is_best = bucket.commit.best_variant_id.as_deref() == Some(variant_id);
        if is_best {
            if clean_pass {
                bucket.commit.consecutive_not_clean_best = 0;
            } else {
                bucket.commit.consecutive_not_clean_best += 1;
                let attempts = *bucket.attempts.get(variant_id).unwrap_or(&0);
                let clean = *bucket.clean_passes.get(variant_id).unwrap_or(&0);
                let mc = mean_clean(attempts, clean);
                if bucket.commit.consecutive_not_clean_best >= 2 || (attempts >= 10 && mc < 0.3) {
                    bucket.commit.active = false;
                    bucket.commit.remaining = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{}", i)).collect()
    }

    #[test]
    fn test_bootstrap_dominates_every_strategy() {
        for strategy in [STRATEGY_UCB1, STRATEGY_EXPLORE_THEN_COMMIT, STRATEGY_RR_ELIMINATION] {
            let mut policy = Policy {
                selection_strategy: strategy.to_string(),
                ..Policy::default()
            };
            let variants = ids(3);
            let first = select_variant(&mut policy, "agent", "epoch", &variants);
            let second = select_variant(&mut policy, "agent", "epoch", &variants);
            let third = select_variant(&mut policy, "agent", "epoch", &variants);
            assert_eq!(vec![first, second, third], variants);
        }
    }

    #[test]
    fn test_single_variant_always_chosen_after_bootstrap() {
        let mut policy = Policy::default();
        let variants = vec!["only".to_string()];
        for _ in 0..10 {
            let chosen = select_variant(&mut policy, "agent", "epoch", &variants);
            assert_eq!(chosen, "only");
            update_variant_stats(&mut policy, "agent", "epoch", &chosen, true, true);
        }
    }

    #[test]
    fn test_equal_stats_choose_lexicographic_least() {
        let mut policy = Policy::default();
        let variants = ids(2);
        // push both past bootstrap with identical outcomes
        for _ in 0..policy.bootstrap_min_trials_per_variant {
            for v in &variants {
                select_variant(&mut policy, "agent", "epoch", &variants);
                update_variant_stats(&mut policy, "agent", "epoch", v, true, true);
            }
        }
        let chosen = select_variant(&mut policy, "agent", "epoch", &variants);
        assert_eq!(chosen, "v0");
    }

    #[test]
    fn test_stats_monotonic_clean_le_pass_le_attempts() {
        let mut policy = Policy::default();
        update_variant_stats(&mut policy, "agent", "epoch", "v0", true, true);
        update_variant_stats(&mut policy, "agent", "epoch", "v0", false, false);
        let bucket = policy.stats_bucket("agent", "epoch");
        let attempts = bucket.attempts["v0"];
        let passes = bucket.passes["v0"];
        let clean = bucket.clean_passes["v0"];
        assert!(clean <= passes);
        assert!(passes <= attempts);
    }

    #[test]
    fn test_explore_then_commit_releases_after_two_non_clean() {
        let mut policy = Policy {
            selection_strategy: STRATEGY_EXPLORE_THEN_COMMIT.to_string(),
            commit_window_runs: 10,
            ..Policy::default()
        };
        let variants = ids(2);
        for v in &variants {
            select_variant(&mut policy, "agent", "epoch", &variants);
            update_variant_stats(&mut policy, "agent", "epoch", v, true, true);
        }
        for v in &variants {
            select_variant(&mut policy, "agent", "epoch", &variants);
            update_variant_stats(&mut policy, "agent", "epoch", v, true, true);
        }
        for v in &variants {
            select_variant(&mut policy, "agent", "epoch", &variants);
            update_variant_stats(&mut policy, "agent", "epoch", v, true, true);
        }
        let chosen = select_variant(&mut policy, "agent", "epoch", &variants);
        let best = chosen.clone();
        update_variant_stats(&mut policy, "agent", "epoch", &best, false, false);
        let bucket = policy.stats_bucket("agent", "epoch");
        assert!(bucket.commit.active);
        update_variant_stats(&mut policy, "agent", "epoch", &best, false, false);
        let bucket = policy.stats_bucket("agent", "epoch");
        assert!(!bucket.commit.active, "commit must release after two consecutive non-clean passes");
    }

    #[test]
    fn test_rr_elimination_resets_when_all_eliminated() {
        let mut policy = Policy {
            selection_strategy: STRATEGY_RR_ELIMINATION.to_string(),
            elim_min_trials: 1,
            elim_min_mean_clean: 0.99,
            ..Policy::default()
        };
        let variants = ids(2);
        for v in &variants {
            select_variant(&mut policy, "agent", "epoch", &variants);
            update_variant_stats(&mut policy, "agent", "epoch", v, false, false);
        }
        // next selection triggers elimination re-evaluation for both variants
        select_variant(&mut policy, "agent", "epoch", &variants);
        let bucket = policy.stats_bucket("agent", "epoch");
        assert!(bucket.eliminated.is_empty(), "eliminating all variants must reset the set");
    }
}
