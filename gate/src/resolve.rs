//! Ref resolution: which commit does each project check out?
//!
//! The merge queue proposes a speculative ref scoped to one branch. For each
//! project the resolver decides between that ref (possibly rewritten for an
//! override branch or a missing-branch fallback) and the plain branch head,
//! in a fixed candidate order that short-circuits on the first ref present
//! on the remote.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::error::GateError;
use crate::core::refs::rewrite_branch;
use crate::core::types::{Project, ResolutionOutcome};
use crate::io::config::QueueParams;
use crate::io::git::{RefProbe, Vcs};

/// Decide the ref to check out for `project` on `requested_branch`.
///
/// Candidate order is override -> primary -> fallback. When no candidate
/// resolves and `project` is the one under test, the queue promised a ref
/// that does not exist and the run must die; any other project silently
/// falls back to the branch head.
#[instrument(skip_all, fields(project = %project, requested_branch))]
pub fn resolve<V: Vcs>(
    vcs: &V,
    queue: &QueueParams,
    project: &Project,
    requested_branch: &str,
) -> Result<ResolutionOutcome> {
    let override_ref = queue
        .override_branch
        .as_deref()
        .map(|over| rewrite_branch(&queue.queue_ref, requested_branch, over));

    // A project may simply not have the requested branch (e.g. a library cut
    // from master only). Retarget to master and derive the matching ref.
    let mut branch = requested_branch.to_string();
    let mut fallback_ref = None;
    if !vcs.remote_branch_exists(project, &branch)? {
        debug!(branch = %branch, "branch missing on remote, retargeting to master");
        fallback_ref = Some(rewrite_branch(&queue.queue_ref, requested_branch, "master"));
        branch = "master".to_string();
    }

    // The queue's speculative state only applies when its target branch is
    // the one we ended up requesting.
    if queue.queue_branch != branch {
        debug!(queue_branch = %queue.queue_branch, branch = %branch, "queue branch mismatch");
        return Ok(ResolutionOutcome::UseBranchHead(branch));
    }

    let mut candidates = Vec::new();
    if let Some(reference) = override_ref {
        if !reference.is_empty() {
            candidates.push(reference);
        }
    }
    if !queue.queue_ref.is_empty() {
        candidates.push(queue.queue_ref.clone());
    }
    if let Some(reference) = fallback_ref {
        if !reference.is_empty() {
            candidates.push(reference);
        }
    }

    for reference in &candidates {
        match vcs.remote_ref_exists(project, reference)? {
            RefProbe::Found => {
                info!(reference = %reference, "proposed ref resolved");
                return Ok(ResolutionOutcome::UseChangeRef(reference.clone()));
            }
            RefProbe::NotFound => {
                debug!(reference = %reference, "candidate not on remote");
            }
        }
    }

    if project.as_str() == queue.project_under_test && !candidates.is_empty() {
        // The queue promised a ref for the very change being tested.
        return Err(GateError::RefNotFound {
            project: project.to_string(),
            tried: candidates.join(", "),
        }
        .into());
    }

    if !candidates.is_empty() {
        warn!(branch = %branch, "no candidate resolved, using branch head");
    }
    Ok(ResolutionOutcome::UseBranchHead(branch))
}
