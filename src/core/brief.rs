//! Brief parsing (ambient A5).
//!
//! The human-readable brief (`PROJECT_BRIEF.md`) is required; the structured
//! brief (`PROJECT_BRIEF.yaml`) is optional and is, per spec.md §9(a),
//! literal JSON despite its `.yaml` extension — a conservative, well-defined
//! subset of YAML that `serde_json` parses directly.

use crate::core::error::StepgateError;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;

pub const BRIEF_MD: &str = "PROJECT_BRIEF.md";
pub const BRIEF_YAML: &str = "PROJECT_BRIEF.yaml";

pub const REQUIRED_BRIEF_HEADINGS: [&str; 3] = ["# Layer 0", "# Layer 1", "# Layer 2"];

/// A subset of the structured brief's keys relevant to orchestration, with
/// the raw parsed document retained for anything the validator suite needs
/// that isn't modeled explicitly (e.g. `validators.require_docker_compose`).
#[derive(Debug, Clone, Default)]
pub struct BriefConfig {
    pub exists: bool,
    pub project_type: Option<String>,
    pub backend_required: bool,
    pub tests: TestsConfig,
    pub require_docker_compose: bool,
    pub raw: JsonValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestsConfig {
    pub command_source: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl BriefConfig {
    pub fn is_profile_sourced(&self) -> bool {
        self.tests.command_source.as_deref() == Some("profile")
    }
}

/// Loads `PROJECT_BRIEF.yaml` if present, validating the shape §3 requires.
/// Returns a default (`exists: false`) config when the file is absent.
pub fn load_brief_config(root: &Path) -> Result<BriefConfig, StepgateError> {
    let path = root.join(BRIEF_YAML);
    if !path.exists() {
        return Ok(BriefConfig::default());
    }
    let raw_text = fs::read_to_string(&path)?;
    let parsed: JsonValue = serde_json::from_str(&raw_text).map_err(|e| {
        StepgateError::Precondition(format!(
            "{} is not valid JSON-subset YAML: {}",
            BRIEF_YAML, e
        ))
    })?;
    let obj = parsed.as_object().ok_or_else(|| {
        StepgateError::Precondition(format!("{} must parse to an object", BRIEF_YAML))
    })?;

    let project_type = obj.get("project_type").and_then(JsonValue::as_str);
    let project_type = match project_type {
        Some(s) if !s.trim().is_empty() => Some(s.to_string()),
        _ => {
            return Err(StepgateError::Precondition(format!(
                "{} must contain key 'project_type' as a non-empty string",
                BRIEF_YAML
            )));
        }
    };

    let backend_required = obj
        .get("backend_required")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    let tests = obj
        .get("tests")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()
        .map_err(|e| StepgateError::Precondition(format!("{} tests block invalid: {}", BRIEF_YAML, e)))?
        .unwrap_or_default();

    let require_docker_compose = obj
        .get("validators")
        .and_then(|v| v.get("require_docker_compose"))
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    Ok(BriefConfig {
        exists: true,
        project_type,
        backend_required,
        tests,
        require_docker_compose,
        raw: parsed,
    })
}

/// Reads the human-readable brief's full text. Callers must check existence
/// via [`brief_exists`] first; this is a precondition failure otherwise.
pub fn load_brief_text(root: &Path) -> Result<String, StepgateError> {
    let path = root.join(BRIEF_MD);
    fs::read_to_string(&path)
        .map_err(|_| StepgateError::Precondition(format!("{} must exist before running pipeline", BRIEF_MD)))
}

pub fn brief_exists(root: &Path) -> bool {
    root.join(BRIEF_MD).is_file()
}

/// Whether the backend specialist step should run: either the brief text
/// contains the literal "Backend REQUIRED" marker, or the structured brief
/// sets `backend_required: true`.
pub fn should_backend_be_required(brief_text: &str, cfg: &BriefConfig) -> bool {
    brief_text.contains("Backend REQUIRED") || cfg.backend_required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_brief_config_absent_is_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_brief_config(tmp.path()).unwrap();
        assert!(!cfg.exists);
        assert!(!cfg.backend_required);
    }

    #[test]
    fn test_load_brief_config_requires_project_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join(BRIEF_YAML), r#"{"foo": "bar"}"#).unwrap();
        assert!(load_brief_config(tmp.path()).is_err());
    }

    #[test]
    fn test_load_brief_config_parses_profile_tests() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(
            tmp.path().join(BRIEF_YAML),
            r#"{"project_type": "web", "backend_required": true, "tests": {"command_source": "profile", "commands": ["cargo test"]}}"#,
        )
        .unwrap();
        let cfg = load_brief_config(tmp.path()).unwrap();
        assert!(cfg.exists);
        assert!(cfg.backend_required);
        assert!(cfg.is_profile_sourced());
        assert_eq!(cfg.tests.commands, vec!["cargo test".to_string()]);
    }

    #[test]
    fn test_should_backend_be_required_from_text_marker() {
        let cfg = BriefConfig::default();
        assert!(should_backend_be_required("Backend REQUIRED for this project.", &cfg));
        assert!(!should_backend_be_required("No backend needed.", &cfg));
    }
}
