//! Merge-queue gate workspace runner.
//!
//! Fetches every project in the configured set to the commit the merge
//! queue proposed, prepares pristine working trees, and hands off to the
//! verification hooks. Exit codes are stable so the surrounding CI harness
//! can tell a missing proposed ref from an unreachable remote.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use gate::core::error::GateError;
use gate::core::types::Project;
use gate::exit_codes;
use gate::io::config::{QueueParams, load_config};
use gate::io::git::GitVcs;
use gate::io::hooks::{CommandHookRunner, HookFailedError};
use gate::{logging, orchestrate, resolve};

#[derive(Parser)]
#[command(
    name = "gate",
    version,
    about = "Prepare merge-queue gate workspaces and run verification hooks"
)]
struct Cli {
    /// Path to the gate configuration file.
    #[arg(long, global = true, default_value = "gate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize all workspace passes, then run the hooks.
    Run(QueueArgs),
    /// Synchronize all workspace passes without running hooks.
    Sync(QueueArgs),
    /// Print the resolution decision for one project, without syncing.
    Resolve {
        #[command(flatten)]
        queue: QueueArgs,
        /// Project to resolve (defaults to the project under test).
        #[arg(long)]
        project: Option<String>,
    },
}

/// Merge-queue inputs, supplied as flags or environment variables.
#[derive(Args)]
struct QueueArgs {
    /// Branch for the new-version pass.
    #[arg(long, env = "GATE_BRANCH", default_value = "master")]
    branch: String,

    /// Branch the merge queue targeted with its proposed ref.
    #[arg(long, env = "GATE_QUEUE_BRANCH")]
    queue_branch: String,

    /// Proposed change reference; empty means no speculative state.
    #[arg(long, env = "GATE_QUEUE_REF", default_value = "")]
    queue_ref: String,

    /// Branch to substitute into the proposed ref ahead of the primary.
    #[arg(long, env = "GATE_OVERRIDE_BRANCH")]
    override_branch: Option<String>,

    /// The project the merge queue is actually testing.
    #[arg(long, env = "GATE_PROJECT_UNDER_TEST")]
    project_under_test: String,

    /// Skip the self-gate handoff stage.
    #[arg(long, env = "GATE_SKIP_SELF_PROJECT")]
    skip_self_project: bool,

    /// Workspace root for the new-version pass.
    #[arg(long, env = "GATE_DEST_ROOT")]
    dest_root: PathBuf,

    /// Branch for the optional old-version (upgrade) pass.
    #[arg(long, env = "GATE_OLD_BRANCH")]
    old_branch: Option<String>,

    /// Workspace root for the optional old-version pass.
    #[arg(long, env = "GATE_OLD_DEST_ROOT")]
    old_dest_root: Option<PathBuf>,
}

impl QueueArgs {
    fn into_params(self) -> QueueParams {
        QueueParams {
            branch: self.branch,
            queue_branch: self.queue_branch,
            queue_ref: self.queue_ref,
            override_branch: self.override_branch,
            project_under_test: self.project_under_test,
            skip_self_project: self.skip_self_project,
            dest_root: self.dest_root,
            old_branch: self.old_branch,
            old_dest_root: self.old_dest_root,
        }
    }
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&cli.config, args),
        Command::Sync(args) => cmd_sync(&cli.config, args),
        Command::Resolve { queue, project } => cmd_resolve(&cli.config, queue, project),
    }
}

fn cmd_run(config_path: &PathBuf, args: QueueArgs) -> Result<()> {
    let cfg = load_config(config_path)?;
    let queue = args.into_params();
    let vcs = GitVcs::from_config(&cfg);
    let hooks = CommandHookRunner::from_config(&cfg);
    orchestrate::run_gate(&vcs, &hooks, &cfg, &queue)?;
    Ok(())
}

fn cmd_sync(config_path: &PathBuf, args: QueueArgs) -> Result<()> {
    let cfg = load_config(config_path)?;
    let queue = args.into_params();
    let vcs = GitVcs::from_config(&cfg);
    for state in orchestrate::sync_passes(&vcs, &cfg, &queue)? {
        println!("{} {}", state.project, state.head);
    }
    Ok(())
}

fn cmd_resolve(config_path: &PathBuf, args: QueueArgs, project: Option<String>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let queue = args.into_params();
    queue.validate()?;
    let id = project.unwrap_or_else(|| queue.project_under_test.clone());
    let project = Project::new(id)?;
    let vcs = GitVcs::from_config(&cfg);
    let outcome = resolve::resolve(&vcs, &queue, &project, &queue.branch)?;
    println!("{outcome}");
    Ok(())
}

/// Map an error chain to the stable exit code for its classified cause.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(gate) = cause.downcast_ref::<GateError>() {
            return gate.exit_code();
        }
        if cause.downcast_ref::<HookFailedError>().is_some() {
            return exit_codes::HOOK_FAILED;
        }
    }
    exit_codes::INVALID
}
