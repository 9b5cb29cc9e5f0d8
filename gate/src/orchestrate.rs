//! Run orchestration: resolve and synchronize the whole project set, then
//! hand off to the verification hooks.
//!
//! Everything is strictly sequential; a failed resolution or a fatal sync
//! error aborts the pass immediately so the hooks never see an inconsistent
//! workspace.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{ProjectSet, WorkspaceState};
use crate::io::config::{GateConfig, QueueParams};
use crate::io::git::Vcs;
use crate::io::hooks::{HookFailedError, HookKind, HookRunner, HookStatus};
use crate::resolve::resolve;
use crate::sync::sync_project;

/// Resolve and synchronize every project in the set for one pass.
#[instrument(skip_all, fields(branch, dest_root = %dest_root.display(), projects = projects.len()))]
pub fn sync_all<V: Vcs>(
    vcs: &V,
    cfg: &GateConfig,
    queue: &QueueParams,
    projects: &ProjectSet,
    branch: &str,
    dest_root: &Path,
) -> Result<Vec<WorkspaceState>> {
    let mut states = Vec::with_capacity(projects.len());
    for project in projects {
        let outcome = resolve(vcs, queue, project, branch)
            .with_context(|| format!("resolve ref for {project}"))?;
        info!(project = %project, outcome = %outcome, "resolved");
        let state = sync_project(vcs, cfg, project, &outcome, dest_root)
            .with_context(|| format!("synchronize {project}"))?;
        states.push(state);
    }
    Ok(states)
}

/// Run all synchronization passes: the self-gate handoff stage, the
/// new-version pass, and the optional old-version pass.
///
/// The handoff mirrors the tooling testing its own newer version: the gate
/// project is fetched alone first, then the run continues in-process with
/// `skip_self_project` set so the stage cannot recurse.
pub fn sync_passes<V: Vcs>(
    vcs: &V,
    cfg: &GateConfig,
    queue: &QueueParams,
) -> Result<Vec<WorkspaceState>> {
    queue.validate()?;
    let projects = ProjectSet::assemble(&cfg.projects, &cfg.self_project, queue.skip_self_project)?;

    let mut queue = queue.clone();
    if !queue.skip_self_project {
        info!(project = %cfg.self_project, "fetching gate tooling before handoff");
        let self_only = ProjectSet::assemble(&[], &cfg.self_project, false)?;
        sync_all(vcs, cfg, &queue, &self_only, &queue.branch, &queue.dest_root)
            .context("self-gate handoff stage")?;
        queue.skip_self_project = true;
    }

    let mut states = sync_all(vcs, cfg, &queue, &projects, &queue.branch, &queue.dest_root)?;

    if let (Some(old_branch), Some(old_root)) = (&queue.old_branch, &queue.old_dest_root) {
        info!(branch = %old_branch, "running old-version pass");
        states.extend(sync_all(vcs, cfg, &queue, &projects, old_branch, old_root)?);
    }

    Ok(states)
}

/// Full gate run: all sync passes, then the hook sequence.
///
/// `pre_test` failing aborts before the gate hook; `post_test` runs after
/// the gate hook regardless of its verdict, and either failure fails the run.
pub fn run_gate<V: Vcs, H: HookRunner>(
    vcs: &V,
    hooks: &H,
    cfg: &GateConfig,
    queue: &QueueParams,
) -> Result<Vec<WorkspaceState>> {
    let states = sync_passes(vcs, cfg, queue)?;
    run_hooks(hooks, &queue.dest_root)?;
    Ok(states)
}

fn run_hooks<H: HookRunner>(hooks: &H, workdir: &Path) -> Result<()> {
    if hooks.run(HookKind::PreTest, workdir)? == HookStatus::Failed {
        return Err(HookFailedError { hook: "pre_test" }.into());
    }
    let gate = hooks.run(HookKind::Gate, workdir)?;
    let post = hooks.run(HookKind::PostTest, workdir)?;
    if gate == HookStatus::Failed {
        return Err(HookFailedError { hook: "gate" }.into());
    }
    if post == HookStatus::Failed {
        return Err(HookFailedError { hook: "post_test" }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GateError;
    use crate::test_support::{ScriptedHookRunner, ScriptedVcs, fast_config, queue_params};
    use std::path::PathBuf;

    fn widget_queue(under_test: &str) -> QueueParams {
        let mut queue = queue_params("master", "master", "refs/zuul/master/Z1", under_test);
        queue.dest_root = PathBuf::from("/ws");
        queue
    }

    #[test]
    fn sync_all_walks_projects_in_configured_order() {
        let vcs = ScriptedVcs::new()
            .with_branch("acme/widget", "master")
            .with_branch("acme/gadget", "master")
            .with_ref("acme/widget", "refs/zuul/master/Z1")
            .with_ref("acme/gadget", "refs/zuul/master/Z1");
        let cfg = fast_config();
        let queue = widget_queue("acme/widget");
        let projects = ProjectSet::assemble(
            &["acme/widget".to_string(), "acme/gadget".to_string()],
            "opendev/gate",
            true,
        )
        .expect("assemble");

        let states = sync_all(&vcs, &cfg, &queue, &projects, "master", &queue.dest_root)
            .expect("sync all");
        let names: Vec<&str> = states.iter().map(|s| s.project.as_str()).collect();
        assert_eq!(names, vec!["acme/widget", "acme/gadget"]);
    }

    #[test]
    fn failed_resolution_aborts_before_touching_later_projects() {
        // First project is under test and its promised ref is missing.
        let vcs = ScriptedVcs::new()
            .with_branch("acme/widget", "master")
            .with_branch("acme/gadget", "master");
        let cfg = fast_config();
        let queue = widget_queue("acme/widget");
        let projects = ProjectSet::assemble(
            &["acme/widget".to_string(), "acme/gadget".to_string()],
            "opendev/gate",
            true,
        )
        .expect("assemble");

        let err = sync_all(&vcs, &cfg, &queue, &projects, "master", &queue.dest_root).unwrap_err();
        let gate = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<GateError>())
            .expect("gate error");
        assert!(matches!(gate, GateError::RefNotFound { .. }));
        // No workspace was cloned for the second project.
        assert!(!vcs.ops().iter().any(|op| op.contains("gadget")));
    }

    #[test]
    fn handoff_fetches_the_gate_tooling_first() {
        let vcs = ScriptedVcs::new()
            .with_branch("opendev/gate", "master")
            .with_branch("acme/widget", "master");
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..fast_config()
        };
        let mut queue = widget_queue("acme/widget");
        queue.queue_ref = String::new();
        queue.skip_self_project = false;

        sync_passes(&vcs, &cfg, &queue).expect("sync passes");

        let ops = vcs.ops();
        let clones: Vec<&String> = ops.iter().filter(|op| op.starts_with("clone")).collect();
        assert!(clones.first().expect("clone ops").contains("gate"));
    }

    #[test]
    fn skip_flag_leaves_the_gate_tooling_out_entirely() {
        let vcs = ScriptedVcs::new().with_branch("acme/widget", "master");
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..fast_config()
        };
        let mut queue = widget_queue("acme/widget");
        queue.queue_ref = String::new();
        queue.skip_self_project = true;

        sync_passes(&vcs, &cfg, &queue).expect("sync passes");
        assert!(!vcs.ops().iter().any(|op| op.contains("gate")));
    }

    #[test]
    fn old_pass_runs_against_its_own_root() {
        let vcs = ScriptedVcs::new()
            .with_branch("acme/widget", "master")
            .with_branch("acme/widget", "stable/one");
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..fast_config()
        };
        let mut queue = widget_queue("acme/widget");
        queue.queue_ref = String::new();
        queue.old_branch = Some("stable/one".to_string());
        queue.old_dest_root = Some(PathBuf::from("/ws-old"));

        let states = sync_passes(&vcs, &cfg, &queue).expect("sync passes");
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].path, PathBuf::from("/ws/widget"));
        assert_eq!(states[1].path, PathBuf::from("/ws-old/widget"));
    }

    #[test]
    fn failing_gate_hook_fails_the_run_but_post_test_still_runs() {
        let vcs = ScriptedVcs::new().with_branch("acme/widget", "master");
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..fast_config()
        };
        let mut queue = widget_queue("acme/widget");
        queue.queue_ref = String::new();
        let hooks = ScriptedHookRunner::new()
            .with_status("gate", HookStatus::Failed)
            .with_status("post_test", HookStatus::Passed);

        let err = run_gate(&vcs, &hooks, &cfg, &queue).unwrap_err();
        assert!(err.downcast_ref::<HookFailedError>().is_some());
        assert_eq!(hooks.calls(), vec!["pre_test", "gate", "post_test"]);
    }

    #[test]
    fn failing_pre_test_hook_stops_before_the_gate_hook() {
        let vcs = ScriptedVcs::new().with_branch("acme/widget", "master");
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..fast_config()
        };
        let mut queue = widget_queue("acme/widget");
        queue.queue_ref = String::new();
        let hooks = ScriptedHookRunner::new().with_status("pre_test", HookStatus::Failed);

        let err = run_gate(&vcs, &hooks, &cfg, &queue).unwrap_err();
        assert!(err.downcast_ref::<HookFailedError>().is_some());
        assert_eq!(hooks.calls(), vec!["pre_test"]);
    }

    #[test]
    fn fatal_sync_error_prevents_any_hook_from_running() {
        let vcs = ScriptedVcs::new()
            .with_branch("acme/widget", "master")
            .fail_next_updates(3);
        let cfg = GateConfig {
            projects: vec!["acme/widget".to_string()],
            ..fast_config()
        };
        let mut queue = widget_queue("acme/widget");
        queue.queue_ref = String::new();
        let hooks = ScriptedHookRunner::new();

        let err = run_gate(&vcs, &hooks, &cfg, &queue).unwrap_err();
        let gate = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<GateError>())
            .expect("gate error");
        assert!(matches!(gate, GateError::RemoteUnreachable { .. }));
        assert!(hooks.calls().is_empty());
    }
}
