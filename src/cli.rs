// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use wharf::config::EventKind;
use wharf::deploy::DeploymentStatus;

#[derive(Parser)]
#[command(name = "wharf")]
#[command(about = "Deployment orchestrator with approvals and atomic releases")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (default: discover wharf.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only essential results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who is running the command.
#[derive(Args, Debug, Clone)]
pub struct ActorArgs {
    /// Identity recorded on the deployment (default: $USER)
    #[arg(long)]
    pub actor: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter wharf.yml in the current directory
    Init {
        /// App key for the template
        #[arg(long)]
        app: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and list apps and triggers
    Validate,

    /// Feed a source-control event through trigger resolution
    Event {
        /// Read the event as JSON from this file ('-' for stdin)
        #[arg(long, conflicts_with_all = ["kind", "git_ref"])]
        file: Option<PathBuf>,

        #[arg(long, value_parser = parse_event_kind, required_unless_present = "file")]
        kind: Option<EventKind>,

        /// Branch or tag ref
        #[arg(long = "ref", required_unless_present = "file")]
        git_ref: Option<String>,

        #[arg(long)]
        repository: Option<String>,

        #[arg(long, default_value = "")]
        sha: String,

        #[arg(long)]
        message: Option<String>,

        #[arg(long, default_value = "unknown")]
        author: String,

        /// Delivery id; repeats are ignored
        #[arg(long)]
        delivery: Option<String>,

        /// Only create records; do not run queued deployments
        #[arg(long)]
        no_dispatch: bool,
    },

    /// Create a deployment for an app and trigger
    Deploy {
        app: String,
        trigger: String,

        #[arg(long = "ref")]
        git_ref: String,

        #[arg(long)]
        sha: Option<String>,

        #[arg(long)]
        message: Option<String>,

        #[arg(long)]
        no_dispatch: bool,

        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Approve a pending deployment and run it
    Approve {
        token: String,

        #[arg(long)]
        no_dispatch: bool,

        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Reject a pending deployment
    Reject {
        token: String,

        #[arg(long)]
        reason: Option<String>,

        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Expire pending approvals whose window has closed
    Sweep,

    /// Run a queued deployment
    Dispatch { id: String },

    /// Cancel an active deployment
    Cancel {
        id: String,

        #[arg(long)]
        reason: String,

        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Roll an app back to a previous release
    Rollback {
        app: String,

        /// Release name (advanced) or git ref (simple)
        #[arg(long, conflicts_with = "steps")]
        release: Option<String>,

        /// How many releases to go back
        #[arg(long, default_value_t = 1)]
        steps: u32,

        #[arg(long)]
        no_dispatch: bool,

        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Show one deployment
    Status { id: String },

    /// List deployments, newest first
    List {
        #[arg(long)]
        app: Option<String>,

        #[arg(long, value_parser = parse_status)]
        status: Option<DeploymentStatus>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List releases of an app, newest first
    Releases { app: String },
}

fn parse_event_kind(s: &str) -> Result<EventKind, String> {
    s.parse()
}

fn parse_status(s: &str) -> Result<DeploymentStatus, String> {
    s.parse()
}
