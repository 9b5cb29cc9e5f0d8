//! Verification hook adapter.
//!
//! Hooks are external, project-specific programs run after workspace setup:
//! `pre_test` prepares the host, `gate` is the verdict, `post_test` runs
//! after the gate regardless of its result. Only the call interface is owned
//! here; what the hooks do is the projects' business.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::config::{GateConfig, HookCommands};
use crate::io::process::run_command_with_timeout;

/// The three hook points of a gate run, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreTest,
    Gate,
    PostTest,
}

impl HookKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::PreTest => "pre_test",
            Self::Gate => "gate",
            Self::PostTest => "post_test",
        }
    }
}

/// Result of one hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Passed,
    Failed,
    /// No command configured for this hook point.
    Skipped,
}

/// A hook failed; mapped to [`crate::exit_codes::HOOK_FAILED`] at the CLI boundary.
#[derive(Debug, Error)]
#[error("{hook} hook failed")]
pub struct HookFailedError {
    pub hook: &'static str,
}

/// Abstraction over hook execution backends.
pub trait HookRunner {
    fn run(&self, kind: HookKind, workdir: &Path) -> Result<HookStatus>;
}

/// Hook runner that spawns the configured argv in the workspace root.
pub struct CommandHookRunner {
    commands: HookCommands,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandHookRunner {
    pub fn new(commands: HookCommands, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            commands,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(cfg: &GateConfig) -> Self {
        Self::new(
            cfg.hooks.clone(),
            Duration::from_secs(cfg.hook_timeout_secs),
            cfg.output_limit_bytes,
        )
    }

    fn argv(&self, kind: HookKind) -> &[String] {
        match kind {
            HookKind::PreTest => &self.commands.pre_test,
            HookKind::Gate => &self.commands.gate,
            HookKind::PostTest => &self.commands.post_test,
        }
    }
}

impl HookRunner for CommandHookRunner {
    fn run(&self, kind: HookKind, workdir: &Path) -> Result<HookStatus> {
        let argv = self.argv(kind);
        if argv.is_empty() {
            debug!(hook = kind.name(), "no command configured, skipping");
            return Ok(HookStatus::Skipped);
        }

        info!(hook = kind.name(), command = %argv.join(" "), "running hook");
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(workdir);
        let out = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)?;

        if out.timed_out {
            warn!(hook = kind.name(), timeout_secs = self.timeout.as_secs(), "hook timed out");
            return Ok(HookStatus::Failed);
        }
        if !out.status.success() {
            warn!(
                hook = kind.name(),
                exit_code = ?out.status.code(),
                stderr = %out.stderr_text().trim(),
                "hook failed"
            );
            return Ok(HookStatus::Failed);
        }
        info!(hook = kind.name(), "hook passed");
        Ok(HookStatus::Passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(commands: HookCommands) -> CommandHookRunner {
        CommandHookRunner::new(commands, Duration::from_secs(5), 1000)
    }

    #[test]
    fn unconfigured_hook_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let status = runner(HookCommands::default())
            .run(HookKind::Gate, temp.path())
            .expect("run hook");
        assert_eq!(status, HookStatus::Skipped);
    }

    #[test]
    fn zero_exit_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = HookCommands {
            gate: vec!["sh".to_string(), "-c".to_string(), "true".to_string()],
            ..HookCommands::default()
        };
        let status = runner(commands)
            .run(HookKind::Gate, temp.path())
            .expect("run hook");
        assert_eq!(status, HookStatus::Passed);
    }

    #[test]
    fn nonzero_exit_fails_without_erroring() {
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = HookCommands {
            gate: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            ..HookCommands::default()
        };
        let status = runner(commands)
            .run(HookKind::Gate, temp.path())
            .expect("run hook");
        assert_eq!(status, HookStatus::Failed);
    }

    #[test]
    fn hook_runs_in_the_workspace_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = HookCommands {
            gate: vec![
                "sh".to_string(),
                "-c".to_string(),
                "test -f marker".to_string(),
            ],
            ..HookCommands::default()
        };
        std::fs::write(temp.path().join("marker"), "x").expect("write marker");
        let status = runner(commands)
            .run(HookKind::Gate, temp.path())
            .expect("run hook");
        assert_eq!(status, HookStatus::Passed);
    }
}
