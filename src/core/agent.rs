//! Agent invoker (C4).
//!
//! Spawns the external code-generation agent as a subprocess, feeds it a
//! prompt on stdin, and drains stdout/stderr to completion (or until the
//! configured timeout expires). Capability probing happens once per run.

use crate::core::error::StepgateError;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Agent features discovered by probing `<command> exec --help` once at
/// startup. Unsupported flags are silently omitted rather than failing.
/// Recorded verbatim into the run summary (§4.4).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AgentCapabilities {
    pub supports_json_events: bool,
    pub supports_last_message_capture: bool,
}

/// Result of one agent subprocess invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl AgentOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Probes agent capabilities by invoking `<command> exec --help` and
/// scanning the combined output for known flags. Any failure to spawn the
/// agent yields an all-false capability set rather than an error; the
/// precondition check elsewhere is responsible for refusing to run the
/// pipeline at all when the agent binary is entirely absent.
pub fn probe_capabilities(command: &str) -> AgentCapabilities {
    let output = Command::new(command).args(["exec", "--help"]).output();
    let text = match output {
        Ok(o) => format!(
            "{}{}",
            String::from_utf8_lossy(&o.stdout),
            String::from_utf8_lossy(&o.stderr)
        ),
        Err(_) => return AgentCapabilities::default(),
    };
    AgentCapabilities {
        supports_json_events: text.contains("--experimental-json"),
        supports_last_message_capture: text.contains("--output-last-message"),
    }
}

/// Invokes the agent with `prompt` on stdin, rooted at `cwd`, bounded by
/// `timeout`. Drains stdout/stderr on background threads to avoid pipe
/// deadlock while the child is still writing.
pub fn invoke(
    command: &str,
    caps: AgentCapabilities,
    prompt: &str,
    cwd: &Path,
    timeout: Duration,
) -> Result<AgentOutcome, StepgateError> {
    let mut args: Vec<&str> = vec!["exec"];
    if caps.supports_json_events {
        args.push("--experimental-json");
    }
    if caps.supports_last_message_capture {
        args.push("--output-last-message");
        args.push("/dev/stdout");
    }

    let mut child = Command::new(command)
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StepgateError::Internal(format!("failed to spawn agent {}: {}", command, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(prompt.as_bytes());
    }

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(p) = stdout_pipe.as_mut() {
            let _ = p.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(p) = stderr_pipe.as_mut() {
            let _ = p.read_to_string(&mut buf);
        }
        buf
    });

    let start = Instant::now();
    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    timed_out = true;
                    break -1;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(StepgateError::Internal(format!(
                    "failed to wait on agent process: {}",
                    e
                )));
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(AgentOutcome {
        exit_code,
        stdout,
        stderr,
        timed_out,
    })
}
