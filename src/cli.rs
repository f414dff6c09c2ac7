//! Command-line surface for the `stepgate` binary.
//!
//! Intentionally tiny: the pipeline has exactly one mode of operation, a
//! baseline run against the project brief in the current working
//! directory, with two independent flags layered on top. There is no
//! subcommand tree because there is nothing to pick between.

use clap::Parser;

/// Daemonless, local-first gating engine that drives an external
/// code-generation agent through a fixed, validated pipeline with
/// deterministic revert and prompt-variant selection.
#[derive(Parser, Debug)]
#[clap(name = "stepgate", version = env!("CARGO_PKG_VERSION"), about)]
pub struct Cli {
    /// Run the prompt/skill-library bootstrap and tuner stage in addition to
    /// the baseline specialist run, and score/accept the tuned regression.
    #[clap(long)]
    pub design_b: bool,

    /// Run the validator suite and test harness only; invoke no agent and
    /// make no workspace changes.
    #[clap(long)]
    pub dry_validate: bool,
}
