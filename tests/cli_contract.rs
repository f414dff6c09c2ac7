use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn run_stepgate(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_stepgate"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run stepgate")
}

#[test]
fn help_lists_both_flags() {
    let tmp = TempDir::new().unwrap();
    let out = run_stepgate(tmp.path(), &["--help"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("--design-b"));
    assert!(text.contains("--dry-validate"));
}

#[test]
fn version_flag_prints_crate_version() {
    let tmp = TempDir::new().unwrap();
    let out = run_stepgate(tmp.path(), &["--version"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn non_git_directory_fails_with_precondition_exit_code() {
    let tmp = TempDir::new().unwrap();
    let out = run_stepgate(tmp.path(), &["--dry-validate"]);
    assert_eq!(
        out.status.code(),
        Some(3),
        "a plain directory with no .git must be refused as a precondition failure: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn running_stepgate_pids(exe_path: &str) -> Vec<u32> {
    let out = Command::new("ps").args(["-eo", "pid=,args="]).output().expect("ps");
    let text = String::from_utf8_lossy(&out.stdout);
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let mut parts = trimmed.split_whitespace();
            let pid = parts.next()?.parse::<u32>().ok()?;
            let args = parts.collect::<Vec<_>>().join(" ");
            if args.contains(exe_path) {
                Some(pid)
            } else {
                None
            }
        })
        .collect()
}

#[test]
fn stepgate_has_no_lingering_background_process() {
    let tmp = TempDir::new().unwrap();
    let exe_path = env!("CARGO_BIN_EXE_stepgate");
    let before = running_stepgate_pids(exe_path);

    let _ = run_stepgate(tmp.path(), &["--help"]);
    let _ = run_stepgate(tmp.path(), &["--version"]);

    std::thread::sleep(std::time::Duration::from_millis(150));
    let after = running_stepgate_pids(exe_path);
    assert_eq!(before, after, "daemonless contract violated: lingering stepgate process(es)");
}
