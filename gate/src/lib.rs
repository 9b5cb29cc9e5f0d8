//! Merge-queue gate workspace preparation.
//!
//! This crate brings a set of related git projects to the exact commits a
//! merge-queue authority proposed for a gate run, then hands off to
//! project-specific verification hooks. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (ref rewriting, project set
//!   assembly, the error taxonomy). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, git, config,
//!   hooks). Isolated behind traits to enable scripting in tests.
//!
//! Orchestration modules ([`resolve`], [`sync`], [`orchestrate`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
pub mod resolve;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
