//! Validator suite (C5).
//!
//! A pure function over the post-snapshot workspace contents. Every check
//! contributes its own distinct error code; all checks always run so a
//! `--dry-validate` invocation reports everything wrong at once rather than
//! stopping at the first failure.

use crate::core::brief::BriefConfig;
use std::fs;
use std::path::Path;

pub const REQUIRED_FILES_A: [&str; 3] = ["REQUIREMENTS.md", "TEST.md", "AGENT_TASKS.md"];
pub const REQUIRED_DIRS_A: [&str; 4] = ["design", "frontend", "backend", "tests"];
pub const REQUIRED_FILES_B: [&str; 1] = ["AGENTS.md"];
pub const REQUIRED_DIRS_B: [&str; 2] = ["prompts", ".codex/skills"];

const FORBIDDEN_SUBSTRINGS: [&str; 7] = [
    "ignore validators",
    "bypass allowlists",
    "write outside allowed paths",
    "mark step as done even if tests fail",
    "modify .orchestrator",
    "disable gating",
    "proceed on failure",
];

/// Structured result of one validator check (or the merge of several).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorResult {
    pub ok: bool,
    pub error_codes: Vec<String>,
    pub messages: Vec<String>,
}

impl ValidatorResult {
    fn pass() -> Self {
        ValidatorResult { ok: true, error_codes: vec![], messages: vec![] }
    }

    fn from_codes(codes: Vec<String>, messages: Vec<String>) -> Self {
        let ok = codes.is_empty();
        ValidatorResult { ok, error_codes: codes, messages }
    }
}

/// Merges several validator results into one, concatenating error codes and
/// messages in encounter order; `ok` iff every input was `ok`.
pub fn merge(results: &[ValidatorResult]) -> ValidatorResult {
    let mut codes = Vec::new();
    let mut msgs = Vec::new();
    for r in results {
        if !r.ok {
            codes.extend(r.error_codes.iter().cloned());
            msgs.extend(r.messages.iter().cloned());
        }
    }
    ValidatorResult::from_codes(codes, msgs)
}

pub fn validate_base_files_and_structure(root: &Path, design_b: bool) -> ValidatorResult {
    let mut codes = Vec::new();
    let mut msgs = Vec::new();

    for f in REQUIRED_FILES_A {
        if !root.join(f).is_file() {
            codes.push("REQUIRED_FILE_MISSING".to_string());
            msgs.push(format!("Missing required file: {}", f));
        }
    }
    for d in REQUIRED_DIRS_A {
        if !root.join(d).is_dir() {
            codes.push("REQUIRED_DIR_MISSING".to_string());
            msgs.push(format!("Missing required dir: {}", d));
        }
    }

    if design_b {
        for f in REQUIRED_FILES_B {
            if !root.join(f).is_file() {
                codes.push("REQUIRED_FILE_MISSING_B".to_string());
                msgs.push(format!("Missing Design B required file: {}", f));
            }
        }
        for d in REQUIRED_DIRS_B {
            if !root.join(d).is_dir() {
                codes.push("REQUIRED_DIR_MISSING_B".to_string());
                msgs.push(format!("Missing Design B required dir: {}", d));
            }
        }
    }

    ValidatorResult::from_codes(codes, msgs)
}

pub fn validate_requirements_md(root: &Path) -> ValidatorResult {
    let path = root.join("REQUIREMENTS.md");
    let Ok(txt) = fs::read_to_string(&path) else {
        return ValidatorResult::from_codes(
            vec!["REQ_MD_MISSING".to_string()],
            vec!["REQUIREMENTS.md missing".to_string()],
        );
    };
    let required = ["# Overview", "# Scope", "# Non-Goals", "# Acceptance Criteria", "# Risks"];
    let mut codes = Vec::new();
    let mut msgs = Vec::new();
    for h in required {
        if !txt.contains(h) {
            codes.push("REQ_HEADING_MISSING".to_string());
            msgs.push(format!("REQUIREMENTS.md missing heading: {}", h));
        }
    }
    ValidatorResult::from_codes(codes, msgs)
}

fn has_fenced_code_block(txt: &str) -> bool {
    let mut lines = txt.lines();
    while let Some(_) = lines.by_ref().find(|l| l.trim_start().starts_with("```")) {
        if lines.by_ref().any(|l| l.trim_start().starts_with("```")) {
            return true;
        }
    }
    false
}

pub fn validate_test_md(root: &Path) -> ValidatorResult {
    let path = root.join("TEST.md");
    let Ok(txt) = fs::read_to_string(&path) else {
        return ValidatorResult::from_codes(
            vec!["TEST_MD_MISSING".to_string()],
            vec!["TEST.md missing".to_string()],
        );
    };
    let mut codes = Vec::new();
    let mut msgs = Vec::new();
    if !txt.contains("# How to run tests") {
        codes.push("TEST_HEADING_MISSING".to_string());
        msgs.push("Missing # How to run tests".to_string());
    }
    if !txt.contains("# Environments") {
        codes.push("TEST_HEADING_MISSING".to_string());
        msgs.push("Missing # Environments".to_string());
    }
    if !has_fenced_code_block(&txt) {
        codes.push("TEST_CODEBLOCK_MISSING".to_string());
        msgs.push("Missing fenced code block with test command".to_string());
    }
    ValidatorResult::from_codes(codes, msgs)
}

fn count_bullets(section_text: &str) -> usize {
    section_text.lines().filter(|l| l.trim_start().starts_with("- ")).count()
}

fn section_slice<'a>(text: &'a str, heading: &str, next_headings: &[String]) -> &'a str {
    let Some(start) = text.find(heading) else {
        return "";
    };
    let search_from = start + heading.len();
    let mut end = text.len();
    for h in next_headings {
        if let Some(idx) = text[search_from..].find(h.as_str()) {
            end = end.min(search_from + idx);
        }
    }
    &text[start..end]
}

pub fn validate_agent_tasks_md(root: &Path) -> ValidatorResult {
    let path = root.join("AGENT_TASKS.md");
    let Ok(txt) = fs::read_to_string(&path) else {
        return ValidatorResult::from_codes(
            vec!["AGENT_TASKS_MISSING".to_string()],
            vec!["AGENT_TASKS.md missing".to_string()],
        );
    };
    let mut codes = Vec::new();
    let mut msgs = Vec::new();

    if !txt.contains("# Agent Tasks") {
        codes.push("AGENT_TASKS_HEADING_MISSING".to_string());
        msgs.push("Missing # Agent Tasks".to_string());
    }

    let sections = ["Requirements", "Designer", "Frontend", "Backend", "QA"];
    for section in sections {
        let heading = format!("## {}", section);
        if !txt.contains(&heading) {
            codes.push("AGENT_TASKS_SECTION_MISSING".to_string());
            msgs.push(format!("Missing section: {}", heading));
            continue;
        }
        let mut next_heads: Vec<String> = sections
            .iter()
            .filter(|s| **s != section)
            .map(|s| format!("## {}", s))
            .collect();
        next_heads.push("## Docs".to_string());
        let slice = section_slice(&txt, &heading, &next_heads);
        if count_bullets(slice) < 2 {
            codes.push("AGENT_TASKS_TOO_FEW_TASKS".to_string());
            msgs.push(format!("Section {} must contain at least 2 bullet tasks", heading));
        }
    }

    if !txt.contains("Project Brief") {
        codes.push("AGENT_TASKS_BRIEF_REF_MISSING".to_string());
        msgs.push("AGENT_TASKS.md must reference Project Brief".to_string());
    }

    ValidatorResult::from_codes(codes, msgs)
}

pub fn validate_infra_files_if_required(root: &Path, brief_text: &str, cfg: &BriefConfig) -> ValidatorResult {
    let mut codes = Vec::new();
    let mut msgs = Vec::new();

    let needs_compose = brief_text.contains("Docker Compose")
        || brief_text.contains("docker-compose.yml")
        || cfg.require_docker_compose;

    if needs_compose {
        if !root.join("docker-compose.yml").is_file() {
            codes.push("COMPOSE_MISSING".to_string());
            msgs.push("docker-compose.yml required".to_string());
        }
        if !root.join(".env.example").is_file() {
            codes.push("ENV_EXAMPLE_MISSING".to_string());
            msgs.push(".env.example required".to_string());
        }
        let gitignore = root.join(".gitignore");
        let ok = fs::read_to_string(&gitignore).map(|t| t.contains(".env")).unwrap_or(false);
        if !ok {
            codes.push("GITIGNORE_ENV_MISSING".to_string());
            msgs.push(".gitignore must include .env".to_string());
        }
    }

    ValidatorResult::from_codes(codes, msgs)
}

pub fn validate_project_brief_presence_and_content(root: &Path) -> ValidatorResult {
    let path = root.join(crate::core::brief::BRIEF_MD);
    let Ok(txt) = fs::read_to_string(&path) else {
        return ValidatorResult::from_codes(
            vec!["BRIEF_MISSING".to_string()],
            vec!["PROJECT_BRIEF.md missing".to_string()],
        );
    };

    let mut codes = Vec::new();
    let mut msgs = Vec::new();
    for h in crate::core::brief::REQUIRED_BRIEF_HEADINGS {
        if !txt.contains(h) {
            codes.push("BRIEF_HEADING_MISSING".to_string());
            msgs.push(format!("Missing brief heading: {}", h));
        }
    }

    for kw in ["Web", "7", "12", "Safety", "MVP", "Acceptance criteria"] {
        if !txt.contains(kw) {
            codes.push("BRIEF_KEYWORD_MISSING".to_string());
            msgs.push(format!("Brief missing required keyword token: {}", kw));
        }
    }

    ValidatorResult::from_codes(codes, msgs)
}

pub fn validate_agents_md(root: &Path, design_b: bool) -> ValidatorResult {
    if !design_b {
        return ValidatorResult::pass();
    }
    let path = root.join("AGENTS.md");
    let Ok(txt) = fs::read_to_string(&path) else {
        return ValidatorResult::from_codes(
            vec!["AGENTS_MISSING".to_string()],
            vec!["AGENTS.md missing for Design B".to_string()],
        );
    };
    let required = ["# Global Rules", "# File Boundaries", "# How to Run Tests", "Do not modify /.orchestrator/**"];
    let mut codes = Vec::new();
    let mut msgs = Vec::new();
    for token in required {
        if !txt.contains(token) {
            codes.push("AGENTS_CONTENT_MISSING".to_string());
            msgs.push(format!("AGENTS.md missing token: {}", token));
        }
    }
    ValidatorResult::from_codes(codes, msgs)
}

pub fn validate_project_brief_yaml_if_present(root: &Path) -> ValidatorResult {
    if !root.join(crate::core::brief::BRIEF_YAML).exists() {
        return ValidatorResult::pass();
    }
    match crate::core::brief::load_brief_config(root) {
        Ok(_) => ValidatorResult::pass(),
        Err(e) => ValidatorResult::from_codes(vec!["BRIEF_YAML_INVALID".to_string()], vec![e.to_string()]),
    }
}

fn to_posix(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn walk_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

const MAX_PROMPT_FILE_BYTES: u64 = 64 * 1024;

pub fn validate_design_b_prompt_skill_guardrails(root: &Path) -> ValidatorResult {
    let mut codes = Vec::new();
    let mut msgs = Vec::new();

    let prompts_dir = root.join("prompts");
    if prompts_dir.is_dir() {
        let mut files = Vec::new();
        walk_files(&prompts_dir, &mut files);
        for path in &files {
            check_prompt_guardrails(root, path, &mut codes, &mut msgs);
        }
    }

    let skills_dir = root.join(".codex").join("skills");
    if skills_dir.is_dir() {
        let mut files = Vec::new();
        walk_files(&skills_dir, &mut files);
        for path in files.iter().filter(|p| p.file_name().map(|n| n == "SKILL.md").unwrap_or(false)) {
            check_skill_guardrails(root, path, &mut codes, &mut msgs);
        }
    }

    ValidatorResult::from_codes(codes, msgs)
}

fn check_prompt_guardrails(root: &Path, path: &Path, codes: &mut Vec<String>, msgs: &mut Vec<String>) {
    let rel = to_posix(root, path);
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > MAX_PROMPT_FILE_BYTES {
            codes.push("PROMPT_FILE_TOO_LARGE".to_string());
            msgs.push(format!("Prompt file exceeds 64KB: {}", rel));
        }
    }
    let Ok(txt) = fs::read_to_string(path) else { return };
    let lower = txt.to_lowercase();
    for bad in FORBIDDEN_SUBSTRINGS {
        if lower.contains(bad) {
            codes.push("PROMPT_FORBIDDEN_SUBSTRING".to_string());
            msgs.push(format!("Prompt contains forbidden text '{}': {}", bad, rel));
        }
    }
}

fn check_skill_guardrails(root: &Path, path: &Path, codes: &mut Vec<String>, msgs: &mut Vec<String>) {
    let rel = to_posix(root, path);
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > MAX_PROMPT_FILE_BYTES {
            codes.push("SKILL_TOO_LARGE".to_string());
            msgs.push(format!("Skill file exceeds 64KB: {}", rel));
        }
    }
    let Ok(txt) = fs::read_to_string(path) else { return };

    if !txt.starts_with("---\n") {
        codes.push("SKILL_FRONT_MATTER_MISSING".to_string());
        msgs.push(format!("Skill missing YAML front matter: {}", rel));
    } else {
        match txt[4..].find("\n---") {
            None => {
                codes.push("SKILL_FRONT_MATTER_MISSING".to_string());
                msgs.push(format!("Skill missing closing YAML front matter: {}", rel));
            }
            Some(end) => {
                let fm = &txt[4..4 + end];
                if !fm.contains("name:") || !fm.contains("description:") {
                    codes.push("SKILL_FRONT_MATTER_KEYS_MISSING".to_string());
                    msgs.push(format!("Skill front matter missing name/description: {}", rel));
                }
            }
        }
    }

    let lower = txt.to_lowercase();
    for bad in FORBIDDEN_SUBSTRINGS {
        if lower.contains(bad) {
            codes.push("SKILL_FORBIDDEN_SUBSTRING".to_string());
            msgs.push(format!("Skill contains forbidden text '{}': {}", bad, rel));
        }
    }
}

/// Runs every check and merges the results. Always runs all checks, even
/// after an early one fails, so `--dry-validate` reports everything at once.
pub fn validate_all(root: &Path, design_b: bool, brief_cfg: &BriefConfig) -> ValidatorResult {
    let brief_text = fs::read_to_string(root.join(crate::core::brief::BRIEF_MD)).unwrap_or_default();
    let mut results = vec![
        validate_base_files_and_structure(root, design_b),
        validate_project_brief_presence_and_content(root),
        validate_project_brief_yaml_if_present(root),
        validate_requirements_md(root),
        validate_test_md(root),
        validate_agent_tasks_md(root),
        validate_agents_md(root, design_b),
        validate_infra_files_if_required(root, &brief_text, brief_cfg),
    ];
    if design_b {
        results.push(validate_design_b_prompt_skill_guardrails(root));
    }
    merge(&results)
}
