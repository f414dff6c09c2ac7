//! Test harness (C6).
//!
//! Resolves and executes the test commands documented in `TEST.md`'s
//! `# How to run tests` fenced block, or (when the structured brief marks
//! `tests.command_source: profile`) the commands listed in
//! `PROJECT_BRIEF.yaml`'s `tests.commands` — each of which must also appear
//! verbatim in `TEST.md` so the human-readable doc stays the source of truth.

use crate::core::brief::BriefConfig;
use crate::core::error::StepgateError;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

/// One resolved, ready-to-execute test command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub command: String,
}

/// Outcome of running one [`TestCommand`].
#[derive(Debug, Clone, Serialize)]
pub struct TestRunResult {
    pub command: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub passed: bool,
}

/// Outcome of the full suite: stops at the first nonzero exit.
#[derive(Debug, Clone, Serialize)]
pub struct TestSuiteResult {
    pub ok: bool,
    pub ran: Vec<TestRunResult>,
    pub skipped_count: usize,
}

const TAIL_BYTES: usize = 4096;

fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s[s.len() - max..].to_string()
    }
}

/// Extracts the first fenced code block following the `# How to run tests`
/// heading in `TEST.md`'s text, one command per non-empty, non-comment line.
pub fn parse_infile_commands(test_md_text: &str) -> Result<Vec<TestCommand>, StepgateError> {
    let heading_pos = test_md_text
        .find("# How to run tests")
        .ok_or_else(|| StepgateError::Precondition("TEST.md missing # How to run tests".to_string()))?;
    let after = &test_md_text[heading_pos..];
    let fence_start = after
        .find("```")
        .ok_or_else(|| StepgateError::Precondition("TEST.md missing fenced test command block".to_string()))?;
    let body_start = after[fence_start..]
        .find('\n')
        .map(|i| fence_start + i + 1)
        .ok_or_else(|| StepgateError::Precondition("TEST.md fenced block malformed".to_string()))?;
    let fence_end = after[body_start..]
        .find("```")
        .ok_or_else(|| StepgateError::Precondition("TEST.md fenced block not closed".to_string()))?;
    let body = &after[body_start..body_start + fence_end];

    let commands: Vec<TestCommand> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| TestCommand { command: l.to_string() })
        .collect();

    if commands.is_empty() {
        return Err(StepgateError::Precondition("TEST.md fenced block contains no commands".to_string()));
    }
    Ok(commands)
}

/// Resolves the commands to run for this workspace: the structured brief's
/// `tests.commands` when `command_source == "profile"` (each verified to
/// appear verbatim in `TEST.md`), otherwise the in-file fenced block.
pub fn resolve_test_commands(test_md_text: &str, brief_cfg: &BriefConfig) -> Result<Vec<TestCommand>, StepgateError> {
    let infile = parse_infile_commands(test_md_text)?;

    if brief_cfg.is_profile_sourced() {
        if brief_cfg.tests.commands.is_empty() {
            return Err(StepgateError::Precondition(
                "PROJECT_BRIEF.yaml tests.command_source is 'profile' but tests.commands is empty".to_string(),
            ));
        }
        for cmd in &brief_cfg.tests.commands {
            if !test_md_text.contains(cmd.as_str()) {
                return Err(StepgateError::Precondition(format!(
                    "profile test command not present verbatim in TEST.md: {}",
                    cmd
                )));
            }
        }
        return Ok(brief_cfg
            .tests
            .commands
            .iter()
            .map(|c| TestCommand { command: c.clone() })
            .collect());
    }

    Ok(infile)
}

/// Runs `commands` in order via `sh -c`, stopping at the first nonzero exit.
pub fn run_test_suite(root: &Path, commands: &[TestCommand]) -> Result<TestSuiteResult, StepgateError> {
    let mut ran = Vec::new();
    for (idx, cmd) in commands.iter().enumerate() {
        let start = Instant::now();
        let output = Command::new("sh")
            .arg("-c")
            .arg(&cmd.command)
            .current_dir(root)
            .output()
            .map_err(StepgateError::IoError)?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let passed = output.status.success();
        let result = TestRunResult {
            command: cmd.command.clone(),
            exit_code,
            duration_ms,
            stdout_tail: tail(&String::from_utf8_lossy(&output.stdout), TAIL_BYTES),
            stderr_tail: tail(&String::from_utf8_lossy(&output.stderr), TAIL_BYTES),
            passed,
        };
        let stop = !passed;
        ran.push(result);
        if stop {
            return Ok(TestSuiteResult {
                ok: false,
                skipped_count: commands.len() - idx - 1,
                ran,
            });
        }
    }
    Ok(TestSuiteResult { ok: true, skipped_count: 0, ran })
}

/// Appends one JSON-serialized line to `state_dir/test_runs.jsonl`.
pub fn append_test_run_log(state_dir: &Path, result: &TestSuiteResult) -> Result<(), StepgateError> {
    fs::create_dir_all(state_dir)?;
    let path = state_dir.join("test_runs.jsonl");
    let mut existing = fs::read_to_string(&path).unwrap_or_default();
    existing.push_str(&serde_json::to_string(result)?);
    existing.push('\n');
    fs::write(path, existing)?;
    Ok(())
}
