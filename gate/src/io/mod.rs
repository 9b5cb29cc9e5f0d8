//! I/O helpers for gate commands.

pub mod config;
pub mod git;
pub mod hooks;
pub mod process;
