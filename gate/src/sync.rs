//! Workspace synchronization: materialize a resolution outcome on disk.
//!
//! Every pass fully resets the tree, so re-invoking with the same inputs is
//! idempotent regardless of what a previous run (or a stale cached clone)
//! left behind.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::core::error::GateError;
use crate::core::types::{Project, ResolutionOutcome, WorkspaceState};
use crate::io::config::GateConfig;
use crate::io::git::Vcs;

/// Bring `dest_root/basename(project)` to exactly the resolved ref, clean.
#[instrument(skip_all, fields(project = %project, dest_root = %dest_root.display()))]
pub fn sync_project<V: Vcs>(
    vcs: &V,
    cfg: &GateConfig,
    project: &Project,
    outcome: &ResolutionOutcome,
    dest_root: &Path,
) -> Result<WorkspaceState> {
    let workdir = dest_root.join(project.basename());

    vcs.ensure_clone(project, &workdir)
        .with_context(|| format!("clone {project}"))?;
    // A cached clone may point anywhere; the canonical URL always wins.
    vcs.set_origin_url(project, &workdir)
        .with_context(|| format!("reset origin url for {project}"))?;

    refresh_remotes(vcs, cfg, &workdir)?;
    vcs.prune_origin(&workdir)
        .with_context(|| format!("prune remote branches for {project}"))?;

    match outcome {
        ResolutionOutcome::UseChangeRef(reference) => {
            info!(reference = %reference, "checking out proposed ref");
            vcs.fetch_ref(&workdir, reference)
                .with_context(|| format!("fetch {reference} for {project}"))?;
            vcs.checkout_fetch_head(&workdir)
                .with_context(|| format!("checkout fetched head for {project}"))?;
        }
        ResolutionOutcome::UseBranchHead(branch) => {
            info!(branch = %branch, "checking out branch head");
            vcs.checkout_branch_head(&workdir, branch)
                .with_context(|| format!("checkout {branch} for {project}"))?;
        }
    }

    clean_tree(vcs, cfg, &workdir);

    let head = vcs.head_sha(&workdir)?;
    let clean = vcs.is_clean(&workdir)?;
    debug!(head = %head, clean, "workspace synchronized");
    Ok(WorkspaceState {
        project: project.clone(),
        path: workdir,
        head,
        clean,
    })
}

/// Refresh remote-tracking refs with a bounded retry budget.
///
/// Exhausting the budget is fatal to the whole run: a broken remote view
/// would make every subsequent resolution unreliable. Backoff is randomized
/// to desynchronize workers hammering the same remote.
fn refresh_remotes<V: Vcs>(vcs: &V, cfg: &GateConfig, workdir: &Path) -> Result<()> {
    for attempt in 1..=cfg.fetch_attempts {
        match vcs.update_remotes(workdir) {
            Ok(()) => {
                debug!(attempt, "remote update succeeded");
                return Ok(());
            }
            Err(err) if attempt < cfg.fetch_attempts => {
                let pause = backoff_secs(cfg);
                warn!(
                    attempt,
                    attempts = cfg.fetch_attempts,
                    pause_secs = pause,
                    err = %err,
                    "remote update failed, backing off"
                );
                thread::sleep(Duration::from_secs(pause));
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "remote update failed after {} attempts in {}",
                        cfg.fetch_attempts,
                        workdir.display()
                    )
                });
            }
        }
    }
    Ok(())
}

fn backoff_secs(cfg: &GateConfig) -> u64 {
    rand::thread_rng().gen_range(cfg.backoff_min_secs..=cfg.backoff_max_secs)
}

/// Force-clean the tree; one retried failure is tolerated.
///
/// A clean that fails twice typically only leaves harmless stray files, so
/// it is logged and swallowed rather than failing the run.
fn clean_tree<V: Vcs>(vcs: &V, cfg: &GateConfig, workdir: &Path) {
    let Err(first) = vcs.clean(workdir) else {
        return;
    };
    warn!(err = %first, "clean failed, retrying once");
    thread::sleep(Duration::from_secs(cfg.clean_retry_delay_secs));
    if let Err(second) = vcs.clean(workdir) {
        let tolerated = GateError::TreeCorrupt {
            path: workdir.to_path_buf(),
            detail: second.to_string(),
        };
        warn!(err = %tolerated, "clean failed twice, leaving stray files");
    }
}
