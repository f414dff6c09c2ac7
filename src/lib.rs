//! stepgate: a daemonless, local-first gating engine that drives an
//! external code-generation agent through a fixed, validated pipeline.
//!
//! Each invocation runs a single pass over the current working directory's
//! git worktree: a fixed sequence of specialist steps is handed to an
//! external agent binary one at a time, every step's diff is gated against
//! an allowlist, byte/file caps, and protected-path locks, and any step that
//! fails the gate is deterministically reverted before the next one runs.
//! With `--design-b`, a prompt/skill-library bootstrap and tuner stage run
//! around the baseline, and the tuned regression is scored and accepted or
//! reverted. With `--dry-validate`, no agent is invoked at all: only the
//! validator suite and test harness run, against whatever the workspace
//! already contains.
//!
//! See `DESIGN.md` for the grounding ledger and [`core`] for the module
//! breakdown.

pub mod cli;
pub mod core;

use clap::Parser;
use colored::Colorize;
use core::driver::{self, RunContext};
use core::error::StepgateError;

/// Parses CLI arguments, runs the requested mode against the current
/// working directory, prints a colored progress/summary line, and returns
/// the process exit code.
pub fn run() -> i32 {
    let cli = cli::Cli::parse();
    let root = match std::env::current_dir() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{} failed to resolve current directory: {}", "error:".red().bold(), e);
            return 8;
        }
    };

    let ctx = RunContext::new(root, cli.design_b, cli.dry_validate);
    println!(
        "{} run {} starting (design_b={}, dry_validate={})",
        "stepgate".cyan().bold(),
        ctx.run_id,
        ctx.design_b,
        ctx.dry_validate
    );

    let outcome = if ctx.dry_validate {
        driver::run_dry_validate(&ctx)
    } else {
        driver::run_pipeline(&ctx)
    };

    match outcome {
        Ok(code) => {
            print_summary(code);
            code
        }
        Err(err) => {
            print_error(&err);
            err.exit_code()
        }
    }
}

fn print_summary(code: i32) {
    if code == 0 {
        println!("{} exit_code={}", "PASS".green().bold(), code);
    } else {
        println!("{} exit_code={}", "FAIL".red().bold(), code);
    }
}

fn print_error(err: &StepgateError) {
    eprintln!("{} {}", "error:".red().bold(), err);
}
