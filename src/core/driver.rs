//! Pipeline driver (C10).
//!
//! Owns the single in-memory [`RunContext`] for one binary invocation:
//! preflight checks, the optional prompt-library bootstrap, the specialist
//! baseline run, the optional prompt-tuner + regression acceptance loop,
//! run-artifact persistence, and the final policy save.

use crate::core::agent::{self, AgentCapabilities};
use crate::core::brief::{self, BriefConfig};
use crate::core::error::StepgateError;
use crate::core::gatekeeper::{self, StepSpec};
use crate::core::policy::{self, Policy};
use crate::core::scheduler::{self, ScheduleOutcome};
use crate::core::snapshot;
use crate::core::test_harness::{self, TestSuiteResult};
use crate::core::time;
use crate::core::validate::{self, ValidatorResult};
use crate::core::vcs::GitAdapter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ORCHESTRATOR_DIR: &str = ".orchestrator";

fn env_agent_command() -> String {
    std::env::var("STEPGATE_AGENT_CMD").unwrap_or_else(|_| "codex".to_string())
}

fn env_agent_timeout() -> Duration {
    let secs = std::env::var("STEPGATE_AGENT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1800);
    Duration::from_secs(secs)
}

fn env_skip_git_gates() -> bool {
    std::env::var("STEPGATE_VALIDATE_SKIP_GIT_GATES").is_ok()
}

/// The driver's in-memory handle for one invocation of the binary. Never
/// persisted; the only on-disk global state is the policy document.
pub struct RunContext {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub run_dir: PathBuf,
    pub run_id: String,
    pub design_b: bool,
    pub dry_validate: bool,
    pub agent_command: String,
    pub agent_timeout: Duration,
    pub agent_caps: AgentCapabilities,
}

impl RunContext {
    pub fn new(root: PathBuf, design_b: bool, dry_validate: bool) -> Self {
        let run_id = time::new_run_id();
        let state_dir = root.join(ORCHESTRATOR_DIR);
        let run_dir = state_dir.join("runs").join(&run_id);
        let agent_command = env_agent_command();
        let agent_caps = if dry_validate {
            AgentCapabilities::default()
        } else {
            agent::probe_capabilities(&agent_command)
        };
        RunContext {
            root,
            state_dir,
            run_dir,
            run_id,
            design_b,
            dry_validate,
            agent_command,
            agent_timeout: env_agent_timeout(),
            agent_caps,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct StageOutcome {
    pub validators_ok: bool,
    pub validator_error_codes: Vec<String>,
    pub tests_ok: bool,
    pub retries_beyond_first_total: u64,
    pub fixer_runs_total: u64,
    pub changed_files_total: u64,
    pub hard_invalid: bool,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub design_b: bool,
    pub agent_command: String,
    pub agent_caps: AgentCapabilities,
    pub baseline: StageOutcome,
    pub tuner_accepted: Option<bool>,
    pub regression: Option<StageOutcome>,
    pub final_outcome: StageOutcome,
}

fn required_ok(validator: &ValidatorResult) -> bool {
    !validator
        .error_codes
        .iter()
        .any(|c| c.starts_with("REQUIRED_") || c == "BRIEF_MISSING")
}

/// Score (library feature only; else 0). `-1` on hard-invalid.
fn compute_score(
    design_b: bool,
    required_ok: bool,
    validators_ok: bool,
    tests_ok: bool,
    schedule: &ScheduleOutcome,
) -> i64 {
    if schedule.hard_invalid {
        return -1;
    }
    if !design_b {
        return 0;
    }
    let raw = 40 * required_ok as i64
        + 30 * validators_ok as i64
        + 30 * tests_ok as i64
        - 5 * schedule.retries_beyond_first_total as i64
        - 10 * schedule.fixer_runs_total as i64
        - (schedule.changed_files_total as i64 - 20).max(0);
    raw.max(0)
}

fn run_validators_and_tests(
    ctx: &RunContext,
    brief_cfg: &BriefConfig,
) -> Result<(ValidatorResult, Option<TestSuiteResult>), StepgateError> {
    let validator = validate::validate_all(&ctx.root, ctx.design_b, brief_cfg);
    let test_md = ctx.root.join("TEST.md");
    let tests = if test_md.is_file() {
        let text = fs::read_to_string(&test_md)?;
        match test_harness::resolve_test_commands(&text, brief_cfg) {
            Ok(commands) => Some(test_harness::run_test_suite(&ctx.root, &commands)?),
            Err(_) => None,
        }
    } else {
        None
    };
    Ok((validator, tests))
}

fn stage_outcome(
    design_b: bool,
    validator: &ValidatorResult,
    tests: &Option<TestSuiteResult>,
    schedule: &ScheduleOutcome,
) -> StageOutcome {
    let req_ok = required_ok(validator);
    let tests_ok = tests.as_ref().map(|t| t.ok).unwrap_or(true);
    StageOutcome {
        validators_ok: validator.ok,
        validator_error_codes: validator.error_codes.clone(),
        tests_ok,
        retries_beyond_first_total: schedule.retries_beyond_first_total,
        fixer_runs_total: schedule.fixer_runs_total,
        changed_files_total: schedule.changed_files_total,
        hard_invalid: schedule.hard_invalid,
        score: compute_score(design_b, req_ok, validator.ok, tests_ok, schedule),
    }
}

fn prompt_library_empty(root: &Path) -> bool {
    let prompts_empty = fs::read_dir(root.join("prompts")).map(|mut d| d.next().is_none()).unwrap_or(true);
    let skills_empty = fs::read_dir(root.join(".codex").join("skills")).map(|mut d| d.next().is_none()).unwrap_or(true);
    prompts_empty || skills_empty
}

fn library_step(name: &str) -> StepSpec {
    StepSpec {
        name: name.to_string(),
        role: "prompt_library".to_string(),
        prompt_agent_key: "prompt_library".to_string(),
        allowlist: vec!["prompts/**".to_string(), ".codex/skills/**".to_string()],
        max_changed_files: 40,
        max_total_bytes_changed: 1_000_000,
        max_deleted_files: 5,
        can_modify_brief: false,
        can_modify_brief_yaml: false,
        can_modify_agents_doc: false,
        can_modify_prompts: true,
    }
}

fn run_library_pseudo_step(
    ctx: &RunContext,
    adapter: &GitAdapter,
    step: &StepSpec,
    prompt: &str,
) -> Result<(bool, snapshot::Diff), StepgateError> {
    let pre = snapshot::snapshot(&ctx.root, adapter)?;
    let agent_outcome = agent::invoke(&ctx.agent_command, ctx.agent_caps, prompt, &ctx.root, ctx.agent_timeout)?;
    fs::create_dir_all(&ctx.run_dir)?;
    fs::write(ctx.run_dir.join(format!("{}.attempt0.stdout.log", step.name)), &agent_outcome.stdout)?;
    fs::write(ctx.run_dir.join(format!("{}.attempt0.stderr.log", step.name)), &agent_outcome.stderr)?;
    let post = snapshot::snapshot(&ctx.root, adapter)?;
    let (mut gate, diff) = gatekeeper::evaluate(ORCHESTRATOR_DIR, step, &pre, &post);
    if !agent_outcome.succeeded() {
        gate.cap_errors.push("AGENT_NONZERO_EXIT_OR_TIMEOUT".to_string());
    }
    let mut ok = gate.ok();
    if ok {
        let guardrails = validate::validate_design_b_prompt_skill_guardrails(&ctx.root);
        if !guardrails.ok {
            ok = false;
        }
    }
    if !ok {
        gatekeeper::revert(&ctx.root, adapter, &diff)?;
    }
    Ok((ok, diff))
}

fn preflight(ctx: &RunContext, adapter: &GitAdapter) -> Result<(), StepgateError> {
    if !ctx.dry_validate || !env_skip_git_gates() {
        if !adapter.is_working_tree() {
            return Err(StepgateError::Precondition(
                "repository root is not inside a version-control working tree".to_string(),
            ));
        }
    }
    if !ctx.dry_validate {
        let probe = std::process::Command::new(&ctx.agent_command).arg("--version").output();
        if probe.is_err() {
            return Err(StepgateError::Precondition(format!(
                "agent command not found: {}",
                ctx.agent_command
            )));
        }
    }
    Ok(())
}

/// `--dry-validate`: runs the validator suite and (if `TEST.md` resolves)
/// the test harness only, with no agent invocation.
pub fn run_dry_validate(ctx: &RunContext) -> Result<i32, StepgateError> {
    let adapter = GitAdapter::new(&ctx.root);
    preflight(ctx, &adapter)?;

    let brief_cfg = brief::load_brief_config(&ctx.root)?;
    let (validator, tests) = run_validators_and_tests(ctx, &brief_cfg)?;

    fs::create_dir_all(&ctx.run_dir)?;
    let report = serde_json::json!({
        "run_id": ctx.run_id,
        "ok": validator.ok,
        "error_codes": validator.error_codes,
        "messages": validator.messages,
        "tests": tests,
    });
    fs::write(ctx.run_dir.join("dry_validate.json"), serde_json::to_string_pretty(&report)?)?;

    if !validator.ok {
        return Ok(6);
    }
    if let Some(t) = &tests {
        if !t.ok {
            return Ok(7);
        }
    }
    Ok(0)
}

/// Runs the full pipeline: preflight, optional prompt-library bootstrap,
/// baseline specialist run, optional prompt-tuner + regression acceptance,
/// artifact persistence, and policy save.
pub fn run_pipeline(ctx: &RunContext) -> Result<i32, StepgateError> {
    let adapter = GitAdapter::new(&ctx.root);
    preflight(ctx, &adapter)?;

    fs::create_dir_all(&ctx.state_dir)?;
    fs::create_dir_all(&ctx.run_dir)?;

    let mut policy = policy::load(&ctx.state_dir)?;
    let brief_text = brief::load_brief_text(&ctx.root)?;
    let brief_cfg = brief::load_brief_config(&ctx.root)?;
    let backend_required = brief::should_backend_be_required(&brief_text, &brief_cfg);

    if ctx.design_b && prompt_library_empty(&ctx.root) {
        let step = library_step("prompt_library_bootstrap");
        let prompt = format!(
            "Bootstrap a minimal prompt and skill library under prompts/** and .codex/skills/**.\n\n---\nProject brief:\n{}",
            brief_text
        );
        let (ok, _diff) = run_library_pseudo_step(ctx, &adapter, &step, &prompt)?;
        if !ok {
            return Ok(6);
        }
    }

    let steps = scheduler::default_steps(backend_required, ctx.design_b);
    let baseline_schedule = scheduler::execute_specialist_steps(ctx, &adapter, &mut policy, &steps, &brief_text)?;
    let (baseline_validator, baseline_tests) = run_validators_and_tests(ctx, &brief_cfg)?;
    let baseline = stage_outcome(ctx.design_b, &baseline_validator, &baseline_tests, &baseline_schedule);

    let mut summary = RunSummary {
        run_id: ctx.run_id.clone(),
        design_b: ctx.design_b,
        agent_command: ctx.agent_command.clone(),
        agent_caps: ctx.agent_caps,
        baseline: baseline.clone(),
        tuner_accepted: None,
        regression: None,
        final_outcome: baseline.clone(),
    };
    let mut final_tests = baseline_tests.clone();

    if ctx.design_b {
        let step = library_step("prompt_tuner");
        let prompt = format!(
            "Tune the existing prompt and skill library under prompts/** and .codex/skills/** to improve clean-pass rate.\n\n---\nProject brief:\n{}",
            brief_text
        );
        let (tuner_ok, tuner_diff) = run_library_pseudo_step(ctx, &adapter, &step, &prompt)?;

        if tuner_ok {
            let regression_schedule =
                scheduler::execute_specialist_steps(ctx, &adapter, &mut policy, &steps, &brief_text)?;
            let (regression_validator, regression_tests) = run_validators_and_tests(ctx, &brief_cfg)?;
            let regression = stage_outcome(ctx.design_b, &regression_validator, &regression_tests, &regression_schedule);

            let accept = regression.score > baseline.score
                && regression.validators_ok
                && regression.tests_ok
                && !regression.hard_invalid;

            summary.regression = Some(regression.clone());
            summary.tuner_accepted = Some(accept);

            if accept {
                summary.final_outcome = regression;
                final_tests = regression_tests;
            } else {
                gatekeeper::revert(&ctx.root, &adapter, &tuner_diff)?;
                summary.final_outcome = baseline.clone();
            }
        } else {
            summary.tuner_accepted = Some(false);
        }

        let eval_dir = ctx.state_dir.join("evals");
        fs::create_dir_all(&eval_dir)?;
        fs::write(
            eval_dir.join(format!("{}.json", ctx.run_id)),
            serde_json::to_string_pretty(&summary)?,
        )?;
    }

    if let Some(tests) = &final_tests {
        fs::write(ctx.run_dir.join("test_results.json"), serde_json::to_string_pretty(tests)?)?;
    }
    fs::write(ctx.run_dir.join("run_summary.json"), serde_json::to_string_pretty(&summary)?)?;
    policy::save(&ctx.state_dir, &policy)?;

    if !summary.final_outcome.validators_ok {
        return Ok(6);
    }
    if !summary.final_outcome.tests_ok {
        return Ok(7);
    }
    Ok(0)
}
