//! Test-only helpers: a scripted [`Vcs`] double, a scripted hook runner, and
//! a fixture that serves real bare git repositories from a temp directory.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::error::GateError;
use crate::core::types::Project;
use crate::io::config::{GateConfig, QueueParams};
use crate::io::git::{RefProbe, Vcs};
use crate::io::hooks::{HookKind, HookRunner, HookStatus};

/// Queue parameters with deterministic defaults for tests.
pub fn queue_params(
    branch: &str,
    queue_branch: &str,
    queue_ref: &str,
    project_under_test: &str,
) -> QueueParams {
    QueueParams {
        branch: branch.to_string(),
        queue_branch: queue_branch.to_string(),
        queue_ref: queue_ref.to_string(),
        override_branch: None,
        project_under_test: project_under_test.to_string(),
        skip_self_project: true,
        dest_root: PathBuf::from("/tmp/gate-tests"),
        old_branch: None,
        old_dest_root: None,
    }
}

/// Gate config that never sleeps, for retry tests.
pub fn fast_config() -> GateConfig {
    GateConfig {
        backoff_min_secs: 0,
        backoff_max_secs: 0,
        clean_retry_delay_secs: 0,
        ..GateConfig::default()
    }
}

/// Scripted [`Vcs`] double: remote contents are declared up front, side
/// effects are recorded in an operation log, and failure budgets simulate
/// flaky remotes.
#[derive(Debug, Default)]
pub struct ScriptedVcs {
    branches: HashSet<(String, String)>,
    refs: HashSet<(String, String)>,
    probe_unreachable: bool,
    update_failures: RefCell<u32>,
    clean_failures: RefCell<u32>,
    heads: RefCell<HashMap<PathBuf, String>>,
    fetched: RefCell<HashMap<PathBuf, String>>,
    ops: RefCell<Vec<String>>,
}

impl ScriptedVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `refs/heads/<branch>` exists on the project's remote.
    pub fn with_branch(mut self, project: &str, branch: &str) -> Self {
        self.branches
            .insert((project.to_string(), branch.to_string()));
        self
    }

    /// Declare that `refname` exists on the project's remote.
    pub fn with_ref(mut self, project: &str, refname: &str) -> Self {
        self.refs.insert((project.to_string(), refname.to_string()));
        self
    }

    /// Make every remote probe fail as unreachable.
    pub fn unreachable(mut self) -> Self {
        self.probe_unreachable = true;
        self
    }

    /// Fail the next `n` calls to `update_remotes`.
    pub fn fail_next_updates(self, n: u32) -> Self {
        *self.update_failures.borrow_mut() = n;
        self
    }

    /// Fail the next `n` calls to `clean`.
    pub fn fail_next_cleans(self, n: u32) -> Self {
        *self.clean_failures.borrow_mut() = n;
        self
    }

    /// Recorded side-effecting operations, in call order.
    pub fn ops(&self) -> Vec<String> {
        self.ops.borrow().clone()
    }

    /// Number of recorded operations starting with `prefix`.
    pub fn op_count(&self, prefix: &str) -> usize {
        self.ops
            .borrow()
            .iter()
            .filter(|op| op.starts_with(prefix))
            .count()
    }

    fn record(&self, op: String) {
        self.ops.borrow_mut().push(op);
    }

    fn unreachable_err(&self, op: &str) -> anyhow::Error {
        GateError::RemoteUnreachable {
            detail: format!("scripted: {op}"),
        }
        .into()
    }
}

impl Vcs for ScriptedVcs {
    fn remote_branch_exists(&self, project: &Project, branch: &str) -> Result<bool> {
        if self.probe_unreachable {
            return Err(self.unreachable_err("ls-remote heads"));
        }
        Ok(self
            .branches
            .contains(&(project.to_string(), branch.to_string())))
    }

    fn remote_ref_exists(&self, project: &Project, refname: &str) -> Result<RefProbe> {
        if self.probe_unreachable {
            return Err(self.unreachable_err("ls-remote ref"));
        }
        if self.refs.contains(&(project.to_string(), refname.to_string())) {
            Ok(RefProbe::Found)
        } else {
            Ok(RefProbe::NotFound)
        }
    }

    fn ensure_clone(&self, _project: &Project, workdir: &Path) -> Result<()> {
        self.record(format!("clone {}", workdir.display()));
        Ok(())
    }

    fn set_origin_url(&self, _project: &Project, workdir: &Path) -> Result<()> {
        self.record(format!("set-url {}", workdir.display()));
        Ok(())
    }

    fn update_remotes(&self, workdir: &Path) -> Result<()> {
        self.record(format!("update {}", workdir.display()));
        let mut failures = self.update_failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            return Err(self.unreachable_err("remote update"));
        }
        Ok(())
    }

    fn prune_origin(&self, workdir: &Path) -> Result<()> {
        self.record(format!("prune {}", workdir.display()));
        Ok(())
    }

    fn fetch_ref(&self, workdir: &Path, refname: &str) -> Result<()> {
        self.record(format!("fetch {} {}", workdir.display(), refname));
        self.fetched
            .borrow_mut()
            .insert(workdir.to_path_buf(), refname.to_string());
        Ok(())
    }

    fn checkout_fetch_head(&self, workdir: &Path) -> Result<()> {
        self.record(format!("checkout-fetch-head {}", workdir.display()));
        let fetched = self
            .fetched
            .borrow()
            .get(workdir)
            .cloned()
            .ok_or_else(|| anyhow!("checkout_fetch_head before fetch_ref"))?;
        self.heads
            .borrow_mut()
            .insert(workdir.to_path_buf(), format!("sha({fetched})"));
        Ok(())
    }

    fn checkout_branch_head(&self, workdir: &Path, branch: &str) -> Result<()> {
        self.record(format!("checkout-branch {} {}", workdir.display(), branch));
        self.heads
            .borrow_mut()
            .insert(workdir.to_path_buf(), format!("sha(origin/{branch})"));
        Ok(())
    }

    fn clean(&self, workdir: &Path) -> Result<()> {
        self.record(format!("clean {}", workdir.display()));
        let mut failures = self.clean_failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            return Err(anyhow!("scripted clean failure"));
        }
        Ok(())
    }

    fn head_sha(&self, workdir: &Path) -> Result<String> {
        self.heads
            .borrow()
            .get(workdir)
            .cloned()
            .ok_or_else(|| anyhow!("no checkout recorded for {}", workdir.display()))
    }

    fn is_clean(&self, _workdir: &Path) -> Result<bool> {
        Ok(true)
    }
}

/// Scripted hook runner recording invocation order.
#[derive(Debug, Default)]
pub struct ScriptedHookRunner {
    statuses: HashMap<&'static str, HookStatus>,
    calls: RefCell<Vec<&'static str>>,
}

impl ScriptedHookRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, hook: &'static str, status: HookStatus) -> Self {
        self.statuses.insert(hook, status);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }
}

impl HookRunner for ScriptedHookRunner {
    fn run(&self, kind: HookKind, _workdir: &Path) -> Result<HookStatus> {
        self.calls.borrow_mut().push(kind.name());
        Ok(*self.statuses.get(kind.name()).unwrap_or(&HookStatus::Skipped))
    }
}

/// Serves real bare git repositories from a temp directory, so integration
/// tests can exercise the actual `git` binary end to end by pointing
/// `base_url` at a local path.
pub struct RemoteHub {
    temp: TempDir,
    counter: RefCell<u64>,
}

impl RemoteHub {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir().context("create hub tempdir")?,
            counter: RefCell::new(0),
        })
    }

    /// Value to use as `base_url` in a [`GateConfig`].
    pub fn base_url(&self) -> String {
        self.temp.path().display().to_string()
    }

    fn project_path(&self, project: &str) -> PathBuf {
        self.temp.path().join(project)
    }

    /// Create an empty bare repository for `project`.
    pub fn add_project(&self, project: &str) -> Result<()> {
        let path = self.project_path(project);
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
        git_in(&path, &["init", "-q", "--bare"])?;
        git_in(&path, &["symbolic-ref", "HEAD", "refs/heads/master"])?;
        Ok(())
    }

    /// Push a fresh commit to `refs/heads/<branch>`, returning its sha.
    pub fn commit(&self, project: &str, branch: &str, message: &str) -> Result<String> {
        self.push_commit(project, &format!("refs/heads/{branch}"), message)
    }

    /// Push a fresh commit to an arbitrary ref (e.g. a proposed merge-queue
    /// ref), returning its sha. Histories are independent per call, which is
    /// fine for resolution tests.
    pub fn push_commit(&self, project: &str, target_ref: &str, message: &str) -> Result<String> {
        let mut counter = self.counter.borrow_mut();
        *counter += 1;
        let scratch = tempfile::tempdir().context("create scratch tempdir")?;
        let dir = scratch.path();

        git_in(dir, &["init", "-q", "-b", "work"])?;
        git_in(dir, &["config", "user.email", "gate@example.com"])?;
        git_in(dir, &["config", "user.name", "Gate Tests"])?;
        fs::write(dir.join("change.txt"), format!("{message} #{counter}"))
            .context("write change file")?;
        git_in(dir, &["add", "-A"])?;
        git_in(dir, &["commit", "-q", "-m", message])?;

        let url = self.project_path(project).display().to_string();
        let refspec = format!("HEAD:{target_ref}");
        git_in(dir, &["push", "-q", "--force", &url, &refspec])?;
        Ok(git_in(dir, &["rev-parse", "HEAD"])?.trim().to_string())
    }
}

fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}
