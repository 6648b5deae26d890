// ABOUTME: Entry point for the wharf CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wharf::config;
use wharf::deploy::{ManualDeployment, RollbackTarget};
use wharf::error::{Error, Result};
use wharf::output::{Output, OutputMode};
use wharf::registry::SourceEvent;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    });
    let cwd = env::current_dir()?;

    if let Commands::Init { app, force } = &cli.command {
        config::init_config(&cwd, app.as_deref(), *force)?;
        output.success(&format!("Created {}", config::CONFIG_FILENAME));
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref(), &cwd)?;
    let base = base_dir(cli.config.as_deref(), &cwd);
    if let Commands::Validate = cli.command {
        return commands::validate(&config, &base, output);
    }

    let orchestrator = commands::build_orchestrator(&config, &base)?;

    match cli.command {
        Commands::Init { .. } | Commands::Validate => Ok(()),
        Commands::Event {
            file,
            kind,
            git_ref,
            repository,
            sha,
            message,
            author,
            delivery,
            no_dispatch,
        } => {
            let event = match (file, kind, git_ref) {
                (Some(path), _, _) => commands::read_event(&path)?,
                (None, Some(kind), Some(git_ref)) => SourceEvent {
                    kind,
                    git_ref,
                    repository,
                    author,
                    commit_sha: sha,
                    commit_message: message,
                    delivery_id: delivery,
                    payload: serde_json::Value::Null,
                },
                _ => {
                    return Err(Error::InvalidArgument(
                        "either --file or --kind and --ref are required".to_string(),
                    ));
                }
            };
            commands::event(orchestrator, event, !no_dispatch, output).await
        }
        Commands::Deploy {
            app,
            trigger,
            git_ref,
            sha,
            message,
            no_dispatch,
            actor,
        } => {
            let request = ManualDeployment {
                git_ref,
                commit_sha: sha,
                commit_message: message,
            };
            let actor = commands::actor(actor.actor);
            commands::deploy(
                orchestrator,
                &app,
                &trigger,
                request,
                &actor,
                !no_dispatch,
                output,
            )
            .await
        }
        Commands::Approve {
            token,
            no_dispatch,
            actor,
        } => {
            let actor = commands::actor(actor.actor);
            commands::approve(orchestrator, &token, &actor, !no_dispatch, output).await
        }
        Commands::Reject {
            token,
            reason,
            actor,
        } => {
            let actor = commands::actor(actor.actor);
            commands::reject(orchestrator, &token, &actor, reason.as_deref(), output).await
        }
        Commands::Sweep => commands::sweep(orchestrator, output).await,
        Commands::Dispatch { id } => commands::dispatch(orchestrator, &id, output).await,
        Commands::Cancel { id, reason, actor } => {
            let actor = commands::actor(actor.actor);
            commands::cancel(orchestrator, &id, &actor, &reason, output).await
        }
        Commands::Rollback {
            app,
            release,
            steps,
            no_dispatch,
            actor,
        } => {
            let target = match release {
                Some(name) => RollbackTarget::Release(name),
                None => RollbackTarget::Steps(steps),
            };
            let actor = commands::actor(actor.actor);
            commands::rollback(orchestrator, &app, target, &actor, !no_dispatch, output).await
        }
        Commands::Status { id } => commands::status(orchestrator, &id, output).await,
        Commands::List { app, status, limit } => {
            commands::list(orchestrator, app.as_deref(), status, limit, output).await
        }
        Commands::Releases { app } => commands::releases(orchestrator, &app, output).await,
    }
}

/// Directory relative settings paths resolve against.
fn base_dir(config_path: Option<&Path>, cwd: &Path) -> PathBuf {
    config_path
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| cwd.join(p))
        .unwrap_or_else(|| cwd.to_path_buf())
}
