//! Gate configuration: a TOML file for the static run shape plus the
//! per-run merge-queue parameters supplied on the command line.
//!
//! The config file is intended to be edited by humans and must remain stable
//! and automatable. Missing fields default to sensible values.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::error::GateError;

/// Static gate configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Remote origin base; project URLs are `<base_url>/<org/name>`.
    /// A local filesystem path also works, which tests rely on.
    pub base_url: String,

    /// Ordered project identifiers kept in lockstep for a run.
    pub projects: Vec<String>,

    /// The gate tooling's own project, prepended to the set unless skipped.
    pub self_project: String,

    /// Per-attempt timeout for remote operations, in seconds.
    pub fetch_timeout_secs: u64,

    /// Remote refresh attempts before the run is declared dead.
    pub fetch_attempts: u32,

    /// Randomized sleep between refresh attempts, lower bound in seconds.
    pub backoff_min_secs: u64,

    /// Randomized sleep between refresh attempts, upper bound in seconds.
    pub backoff_max_secs: u64,

    /// Pause before the single force-clean retry, in seconds.
    pub clean_retry_delay_secs: u64,

    /// Wall-clock budget for each hook, in seconds.
    pub hook_timeout_secs: u64,

    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub hooks: HookCommands,
}

/// Argv vectors for the verification hooks. An empty vector means the hook
/// is not configured and is skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookCommands {
    pub pre_test: Vec<String>,
    pub gate: Vec<String>,
    pub post_test: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            base_url: "https://opendev.org".to_string(),
            projects: Vec::new(),
            self_project: "opendev/gate".to_string(),
            fetch_timeout_secs: 5 * 60,
            fetch_attempts: 3,
            backoff_min_secs: 30,
            backoff_max_secs: 90,
            clean_retry_delay_secs: 1,
            hook_timeout_secs: 2 * 60 * 60,
            output_limit_bytes: 100_000,
            hooks: HookCommands::default(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(inconsistent("base_url must be non-empty"));
        }
        if self.self_project.trim().is_empty() {
            return Err(inconsistent("self_project must be non-empty"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(inconsistent("fetch_timeout_secs must be > 0"));
        }
        if self.fetch_attempts == 0 {
            return Err(inconsistent("fetch_attempts must be > 0"));
        }
        if self.backoff_min_secs > self.backoff_max_secs {
            return Err(inconsistent("backoff_min_secs must be <= backoff_max_secs"));
        }
        if self.hook_timeout_secs == 0 {
            return Err(inconsistent("hook_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(inconsistent("output_limit_bytes must be > 0"));
        }
        if self.projects.iter().any(|p| p.trim().is_empty()) {
            return Err(inconsistent("projects entries must be non-empty"));
        }
        for (name, argv) in [
            ("pre_test", &self.hooks.pre_test),
            ("gate", &self.hooks.gate),
            ("post_test", &self.hooks.post_test),
        ] {
            if !argv.is_empty() && argv[0].trim().is_empty() {
                return Err(inconsistent(&format!(
                    "hooks.{name} command must start with a program name"
                )));
            }
        }
        Ok(())
    }
}

/// Per-run inputs from the merge-queue authority, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueParams {
    /// Branch requested for the new-version pass.
    pub branch: String,
    /// Branch the merge queue targeted with its proposed ref.
    pub queue_branch: String,
    /// Proposed change reference; empty means no speculative state.
    pub queue_ref: String,
    /// Optional branch to substitute into the proposed ref first.
    pub override_branch: Option<String>,
    /// The project the merge queue is actually testing.
    pub project_under_test: String,
    /// Disables the self-gate handoff stage (set on the handed-off run).
    pub skip_self_project: bool,
    /// Workspace root for the new-version pass.
    pub dest_root: PathBuf,
    /// Branch for the optional old-version (upgrade) pass.
    pub old_branch: Option<String>,
    /// Workspace root for the optional old-version pass.
    pub old_dest_root: Option<PathBuf>,
}

impl QueueParams {
    pub fn validate(&self) -> Result<()> {
        if self.branch.trim().is_empty() {
            return Err(inconsistent("branch must be non-empty"));
        }
        if self.queue_branch.trim().is_empty() {
            return Err(inconsistent("queue_branch must be non-empty"));
        }
        if self.project_under_test.trim().is_empty() {
            return Err(inconsistent("project_under_test must be non-empty"));
        }
        if self.old_branch.is_some() != self.old_dest_root.is_some() {
            return Err(inconsistent(
                "old_branch and old_dest_root must be set together",
            ));
        }
        Ok(())
    }
}

fn inconsistent(msg: &str) -> anyhow::Error {
    GateError::ConfigurationInconsistent(msg.to_string()).into()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GateConfig::default()`.
pub fn load_config(path: &Path) -> Result<GateConfig> {
    if !path.exists() {
        let cfg = GateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GateConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> QueueParams {
        QueueParams {
            branch: "master".to_string(),
            queue_branch: "master".to_string(),
            queue_ref: String::new(),
            override_branch: None,
            project_under_test: "acme/widget".to_string(),
            skip_self_project: true,
            dest_root: PathBuf::from("/tmp/gate"),
            old_branch: None,
            old_dest_root: None,
        }
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, GateConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gate.toml");
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..GateConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let cfg = GateConfig {
            backoff_min_secs: 90,
            backoff_max_secs: 30,
            ..GateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_fetch_attempts_are_rejected() {
        let cfg = GateConfig {
            fetch_attempts: 0,
            ..GateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn old_pass_params_must_come_in_pairs() {
        let mut params = queue();
        params.old_branch = Some("stable/one".to_string());
        assert!(params.validate().is_err());

        params.old_dest_root = Some(PathBuf::from("/tmp/gate-old"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn empty_queue_branch_is_rejected() {
        let mut params = queue();
        params.queue_branch = String::new();
        assert!(params.validate().is_err());
    }
}
