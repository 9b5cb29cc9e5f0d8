//! Data model for gate runs.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

use crate::core::error::GateError;

/// A project identifier of the form `org/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project(String);

impl Project {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GateError::ConfigurationInconsistent(
                "project identifier must be non-empty".to_string(),
            )
            .into());
        }
        // A trailing slash would make the workspace directory name empty.
        if id.rsplit('/').next().unwrap_or_default().trim().is_empty() {
            return Err(GateError::ConfigurationInconsistent(format!(
                "project identifier {id:?} has an empty final path component"
            ))
            .into());
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, used as the workspace directory name.
    pub fn basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decision made by the resolver for one project.
///
/// The failure arm of the decision is the `Err` side of
/// [`crate::resolve::resolve`], carrying [`GateError::RefNotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Fetch and check out a concrete proposed ref.
    UseChangeRef(String),
    /// Check out the remote-tracking head of this branch.
    UseBranchHead(String),
}

impl fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseChangeRef(reference) => write!(f, "change-ref {reference}"),
            Self::UseBranchHead(branch) => write!(f, "branch-head {branch}"),
        }
    }
}

/// On-disk working tree for one project after a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceState {
    pub project: Project,
    pub path: PathBuf,
    /// Commit the workspace points at.
    pub head: String,
    /// True when the tree has no modified or untracked files.
    pub clean: bool,
}

/// Ordered, deduplicated list of projects for one run.
///
/// Fixed once assembled; iteration order matches configuration order so runs
/// produce reproducible logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSet(Vec<Project>);

impl ProjectSet {
    /// Assemble the set from configuration.
    ///
    /// The gate tooling's own project is prepended unless `skip_self` is set,
    /// so a gate change is always exercised by the run that tests it.
    pub fn assemble(projects: &[String], self_project: &str, skip_self: bool) -> Result<Self> {
        let mut out = Vec::with_capacity(projects.len() + 1);
        if !skip_self {
            out.push(Project::new(self_project)?);
        }
        for id in projects {
            let project = Project::new(id.clone())?;
            if !out.contains(&project) {
                out.push(project);
            }
        }
        Ok(Self(out))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Project> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ProjectSet {
    type Item = &'a Project;
    type IntoIter = std::slice::Iter<'a, Project>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
