//! Git adapter for gate workspace operations.
//!
//! The gate trusts the remote view it builds here for every later decision,
//! so network operations distinguish "ref not found" from "remote
//! unreachable" and everything runs under the command executor's timeout.
//! The [`Vcs`] trait is the seam tests script against.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::error::GateError;
use crate::core::types::Project;
use crate::io::config::GateConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Result of probing a single ref on a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefProbe {
    Found,
    NotFound,
}

/// Version-control operations the resolver and synchronizer need.
///
/// Remote-facing methods return [`GateError::RemoteUnreachable`] (through
/// `anyhow`) on network failure; absence of a branch or ref is ordinary data.
pub trait Vcs {
    /// Whether `refs/heads/<branch>` exists on the project's remote.
    fn remote_branch_exists(&self, project: &Project, branch: &str) -> Result<bool>;

    /// Probe a single ref on the project's remote without fetching it.
    fn remote_ref_exists(&self, project: &Project, refname: &str) -> Result<RefProbe>;

    /// Clone the project into `workdir` if no repository is present there.
    fn ensure_clone(&self, project: &Project, workdir: &Path) -> Result<()>;

    /// Point `origin` at the canonical URL, replacing whatever a cached clone had.
    fn set_origin_url(&self, project: &Project, workdir: &Path) -> Result<()>;

    /// Refresh all remote-tracking refs. One attempt; retry budget lives in the caller.
    fn update_remotes(&self, workdir: &Path) -> Result<()>;

    /// Drop remote-tracking branches no longer present upstream.
    fn prune_origin(&self, workdir: &Path) -> Result<()>;

    /// Fetch one ref from origin into FETCH_HEAD.
    fn fetch_ref(&self, workdir: &Path, refname: &str) -> Result<()>;

    /// Hard-checkout the most recently fetched head.
    fn checkout_fetch_head(&self, workdir: &Path) -> Result<()>;

    /// Check out a branch and hard-reset it to its remote-tracking head.
    fn checkout_branch_head(&self, workdir: &Path, branch: &str) -> Result<()>;

    /// Remove untracked and ignored files and directories. One attempt.
    fn clean(&self, workdir: &Path) -> Result<()>;

    /// Commit the workspace currently points at.
    fn head_sha(&self, workdir: &Path) -> Result<String>;

    /// Whether the tree has no modified or untracked files.
    fn is_clean(&self, workdir: &Path) -> Result<bool>;
}

/// [`Vcs`] implementation that shells out to the `git` binary.
#[derive(Debug, Clone)]
pub struct GitVcs {
    base_url: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl GitVcs {
    pub fn new(base_url: impl Into<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(cfg: &GateConfig) -> Self {
        Self::new(
            cfg.base_url.clone(),
            Duration::from_secs(cfg.fetch_timeout_secs),
            cfg.output_limit_bytes,
        )
    }

    /// Canonical remote URL for a project.
    pub fn origin_url(&self, project: &Project) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), project)
    }

    fn git(&self, workdir: Option<&Path>, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
    }

    /// Run a local git command, treating non-zero exit as an error.
    fn git_checked(&self, workdir: &Path, args: &[&str]) -> Result<CommandOutput> {
        let out = self.git(Some(workdir), args)?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr_text().trim()
            ));
        }
        Ok(out)
    }

    /// Classify a failed remote operation.
    fn remote_failure(&self, op: &str, out: &CommandOutput) -> anyhow::Error {
        let detail = if out.timed_out {
            format!("{op} timed out")
        } else {
            format!("{op} failed: {}", out.stderr_text().trim())
        };
        GateError::RemoteUnreachable { detail }.into()
    }
}

impl Vcs for GitVcs {
    #[instrument(skip_all, fields(project = %project, branch))]
    fn remote_branch_exists(&self, project: &Project, branch: &str) -> Result<bool> {
        let url = self.origin_url(project);
        let pattern = format!("refs/heads/{branch}");
        let out = self.git(None, &["ls-remote", "--heads", &url, &pattern])?;
        if !out.status.success() {
            return Err(self.remote_failure(&format!("ls-remote {url}"), &out));
        }
        let exists = !out.stdout_text().trim().is_empty();
        debug!(exists, "remote branch probe");
        Ok(exists)
    }

    #[instrument(skip_all, fields(project = %project, refname))]
    fn remote_ref_exists(&self, project: &Project, refname: &str) -> Result<RefProbe> {
        let url = self.origin_url(project);
        let out = self.git(None, &["ls-remote", &url, refname])?;
        if !out.status.success() {
            return Err(self.remote_failure(&format!("ls-remote {url}"), &out));
        }
        if out.stdout_text().trim().is_empty() {
            debug!("ref not found on remote");
            Ok(RefProbe::NotFound)
        } else {
            debug!("ref found on remote");
            Ok(RefProbe::Found)
        }
    }

    #[instrument(skip_all, fields(project = %project, workdir = %workdir.display()))]
    fn ensure_clone(&self, project: &Project, workdir: &Path) -> Result<()> {
        if workdir.join(".git").exists() {
            debug!("existing clone found");
            return Ok(());
        }
        if let Some(parent) = workdir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create workspace root {}", parent.display()))?;
        }
        let url = self.origin_url(project);
        debug!(url = %url, "cloning");
        let workdir_arg = workdir
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 workspace path {}", workdir.display()))?;
        let out = self.git(None, &["clone", "-q", &url, workdir_arg])?;
        if !out.status.success() {
            return Err(self.remote_failure(&format!("clone {url}"), &out));
        }
        Ok(())
    }

    fn set_origin_url(&self, project: &Project, workdir: &Path) -> Result<()> {
        let url = self.origin_url(project);
        self.git_checked(workdir, &["remote", "set-url", "origin", &url])?;
        Ok(())
    }

    fn update_remotes(&self, workdir: &Path) -> Result<()> {
        let out = self.git(Some(workdir), &["remote", "update"])?;
        if !out.status.success() {
            return Err(self.remote_failure("remote update", &out));
        }
        Ok(())
    }

    fn prune_origin(&self, workdir: &Path) -> Result<()> {
        let out = self.git(Some(workdir), &["remote", "prune", "origin"])?;
        if !out.status.success() {
            return Err(self.remote_failure("remote prune origin", &out));
        }
        Ok(())
    }

    fn fetch_ref(&self, workdir: &Path, refname: &str) -> Result<()> {
        let out = self.git(Some(workdir), &["fetch", "-q", "origin", refname])?;
        if !out.status.success() {
            return Err(self.remote_failure(&format!("fetch origin {refname}"), &out));
        }
        Ok(())
    }

    fn checkout_fetch_head(&self, workdir: &Path) -> Result<()> {
        self.git_checked(workdir, &["checkout", "-q", "-f", "FETCH_HEAD"])?;
        self.git_checked(workdir, &["reset", "-q", "--hard", "FETCH_HEAD"])?;
        Ok(())
    }

    fn checkout_branch_head(&self, workdir: &Path, branch: &str) -> Result<()> {
        let tracking = format!("remotes/origin/{branch}");
        self.git_checked(workdir, &["checkout", "-q", "-f", "-B", branch, &tracking])?;
        self.git_checked(workdir, &["reset", "-q", "--hard", &tracking])?;
        Ok(())
    }

    fn clean(&self, workdir: &Path) -> Result<()> {
        self.git_checked(workdir, &["clean", "-x", "-f", "-d", "-q"])?;
        Ok(())
    }

    fn head_sha(&self, workdir: &Path) -> Result<String> {
        let out = self.git_checked(workdir, &["rev-parse", "HEAD"])?;
        Ok(out.stdout_text().trim().to_string())
    }

    fn is_clean(&self, workdir: &Path) -> Result<bool> {
        let out = self.git_checked(workdir, &["status", "--porcelain"])?;
        Ok(out.stdout_text().trim().is_empty())
    }
}
