//! Path policy (C2): normalization, forbidden-path checks, and allowlist
//! matching for step-scoped filesystem changes.

use crate::core::error::StepgateError;
use std::path::{Component, Path, PathBuf};

/// Normalizes a workspace-relative path string, rejecting absolute paths,
/// `.` components, and `..` traversal.
pub fn normalize(rel: &str) -> Result<PathBuf, StepgateError> {
    let path = Path::new(rel);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(StepgateError::PathPolicy(format!(
                    "path traversal rejected: {}",
                    rel
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StepgateError::PathPolicy(format!(
                    "absolute path rejected: {}",
                    rel
                )));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(StepgateError::PathPolicy(format!("empty path: {}", rel)));
    }
    Ok(out)
}

/// True if `rel` lies inside the VCS metadata directory or the orchestrator
/// state directory; such paths may never be touched by a step.
pub fn is_forbidden(rel: &str, orchestrator_dir_name: &str) -> bool {
    let normalized = rel.replace('\\', "/");
    normalized == ".git"
        || normalized.starts_with(".git/")
        || normalized == orchestrator_dir_name
        || normalized.starts_with(&format!("{}/", orchestrator_dir_name))
}

/// Translates a glob pattern into a `regex::Regex` anchored to the whole
/// path. Supports `**` (any depth, including none), `*` (any run of
/// non-separator characters), and `?` (one non-separator character).
fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // consume an optional following slash so `dir/**` matches `dir` itself
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' | '(' | ')' | '+' | '|' | '^' | '$' | '{' | '}' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    regex::Regex::new(&out).expect("glob_to_regex always produces a valid pattern")
}

/// Returns true if `rel` matches `pattern` under the glob rules above.
pub fn glob_match(pattern: &str, rel: &str) -> bool {
    glob_to_regex(pattern).is_match(rel)
}

/// Checks that every path in `paths` normalizes cleanly, is not forbidden,
/// does not resolve (by symlink, direct or via an ancestor directory)
/// outside `root`, and matches at least one pattern in `allowlist`. Returns
/// the list of paths that failed the allowlist match (empty on success).
pub fn check_allowlist(
    root: &Path,
    orchestrator_dir_name: &str,
    allowlist: &[String],
    paths: &[String],
) -> Result<Vec<String>, StepgateError> {
    let mut violations = Vec::new();
    let base = if root.as_os_str().is_empty() {
        std::env::current_dir().unwrap_or_else(|_| root.to_path_buf())
    } else {
        root.to_path_buf()
    };
    let canon_root = std::fs::canonicalize(&base).unwrap_or_else(|_| base.clone());

    for rel in paths {
        normalize(rel)?;
        if is_forbidden(rel, orchestrator_dir_name) {
            return Err(StepgateError::Invariant(format!(
                "forbidden path modified: {}",
                rel
            )));
        }
        let abs = base.join(rel);
        if let Ok(meta) = std::fs::symlink_metadata(&abs) {
            if meta.file_type().is_symlink() {
                return Err(StepgateError::Invariant(format!(
                    "symlink escape rejected: {}",
                    rel
                )));
            }
        }
        // Direct-component check above misses an escape via a symlinked
        // *ancestor* directory (e.g. `design` itself a symlink out of the
        // repo): resolve the full path and require it stay a descendant of
        // the real repository root. A path that doesn't exist (e.g. one of
        // the deleted set) can't have escaped anywhere, so a canonicalize
        // failure is not itself a violation.
        if let Ok(canon_abs) = std::fs::canonicalize(&abs) {
            if !canon_abs.starts_with(&canon_root) {
                return Err(StepgateError::Invariant(format!(
                    "symlink escape rejected: {}",
                    rel
                )));
            }
        }
        if !allowlist.iter().any(|pat| glob_match(pat, rel)) {
            violations.push(rel.clone());
        }
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejects_traversal() {
        assert!(normalize("../etc/passwd").is_err());
        assert!(normalize("a/../../b").is_err());
    }

    #[test]
    fn test_normalize_rejects_absolute() {
        assert!(normalize("/etc/passwd").is_err());
    }

    #[test]
    fn test_normalize_accepts_relative() {
        assert_eq!(normalize("design/overview.md").unwrap(), PathBuf::from("design/overview.md"));
    }

    #[test]
    fn test_is_forbidden_git_and_state_dir() {
        assert!(is_forbidden(".git/HEAD", ".orchestrator"));
        assert!(is_forbidden(".orchestrator/policy.json", ".orchestrator"));
        assert!(!is_forbidden("design/overview.md", ".orchestrator"));
    }

    #[test]
    fn test_glob_match_double_star_matches_base_and_descendants() {
        assert!(glob_match("design/**", "design"));
        assert!(glob_match("design/**", "design/overview.md"));
        assert!(glob_match("design/**", "design/nested/deep.md"));
        assert!(!glob_match("design/**", "frontend/app.js"));
    }

    #[test]
    fn test_glob_match_single_star_stays_within_segment() {
        assert!(glob_match("*.md", "README.md"));
        assert!(!glob_match("*.md", "docs/README.md"));
    }

    #[test]
    fn test_check_allowlist_flags_non_matching_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let violations = check_allowlist(
            tmp.path(),
            ".orchestrator",
            &["design/**".to_string()],
            &["backend/server.js".to_string()],
        )
        .unwrap();
        assert_eq!(violations, vec!["backend/server.js"]);
    }

    #[test]
    fn test_check_allowlist_rejects_forbidden_as_invariant() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = check_allowlist(
            tmp.path(),
            ".orchestrator",
            &["**".to_string()],
            &[".orchestrator/policy.json".to_string()],
        );
        assert!(matches!(result, Err(StepgateError::Invariant(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_check_allowlist_rejects_ancestor_symlink_escape() {
        let repo = tempfile::TempDir::new().unwrap();
        let outside = tempfile::TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"leak").unwrap();

        // `design` inside the repo is itself a symlink pointing outside the
        // repo root; the final component ("design/secret.txt") is not a
        // symlink, so only a full-path containment check catches this.
        std::os::unix::fs::symlink(outside.path(), repo.path().join("design")).unwrap();

        let result = check_allowlist(
            repo.path(),
            ".orchestrator",
            &["design/**".to_string()],
            &["design/secret.txt".to_string()],
        );
        assert!(matches!(result, Err(StepgateError::Invariant(_))));
    }
}
