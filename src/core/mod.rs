//! Core modules for stepgate's gating engine, scheduler, and pipeline driver.
//!
//! Leaf-first layout: [`snapshot`] and [`path_policy`] have no in-crate
//! dependencies; [`gatekeeper`] builds on both; [`scheduler`] and [`driver`]
//! compose everything above them. See `DESIGN.md` for the grounding ledger
//! mapping each module back to its teacher source.
//!
//! - **`snapshot`**: workspace content-hashing and pure diffing (C1)
//! - **`path_policy`**: path normalization, forbidden paths, glob allowlists (C2)
//! - **`gatekeeper`**: gating engine — invariants, caps, locks, deterministic revert (C3)
//! - **`agent`**: external agent subprocess invocation (C4)
//! - **`validate`**: validator suite over produced artifacts (C5)
//! - **`test_harness`**: test contract parsing and execution (C6)
//! - **`policy`**: persistent per-(agent, epoch) variant statistics (C7)
//! - **`selector`**: prompt-variant selection strategies (C8)
//! - **`scheduler`**: step scheduler — retries, fixer, prompt composition (C9)
//! - **`driver`**: pipeline driver — preflight, bootstrap, tuner, scoring (C10)
//! - **`brief`**: project brief parsing (human-readable + structured)
//! - **`vcs`**: the only module permitted to shell out to `git`
//! - **`error`**: canonical error type for all stepgate operations
//! - **`time`**: timestamp and run-id helpers
//! - **`output`**: compact terminal output rendering helpers

pub mod agent;
pub mod brief;
pub mod driver;
pub mod error;
pub mod gatekeeper;
pub mod output;
pub mod path_policy;
pub mod policy;
pub mod scheduler;
pub mod selector;
pub mod snapshot;
pub mod test_harness;
pub mod time;
pub mod validate;
pub mod vcs;
