// ABOUTME: Operator command implementations: dispatch, cancel, and rollback.
// ABOUTME: Rollbacks are recorded as deployments and run inline by default.

use std::sync::Arc;
use wharf::approval::Actor;
use wharf::deploy::{DeploymentStatus, Orchestrator, RollbackTarget};
use wharf::error::{Error, Result};
use wharf::output::Output;

use super::event::{finish, settle};
use super::parse_id;

pub async fn dispatch(orchestrator: Arc<Orchestrator>, id: &str, mut output: Output) -> Result<()> {
    output.start_timer();
    let id = parse_id(id)?;
    let record = orchestrator.dispatch(id).await?;
    output.record(&record);
    if record.status != DeploymentStatus::Success {
        return Err(Error::Unsuccessful {
            id: record.id.to_string(),
            status: record.status.to_string(),
        });
    }
    output.success("Deployment complete");
    Ok(())
}

pub async fn cancel(
    orchestrator: Arc<Orchestrator>,
    id: &str,
    actor: &Actor,
    reason: &str,
    output: Output,
) -> Result<()> {
    let id = parse_id(id)?;
    let record = orchestrator.cancel(id, actor, reason).await?;
    output.record(&record);
    output.success(&format!("Cancelled deployment {}", record.id));
    Ok(())
}

pub async fn rollback(
    orchestrator: Arc<Orchestrator>,
    app: &str,
    target: RollbackTarget,
    actor: &Actor,
    dispatch: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!("Rolling back {app} to {target}"));

    let created = orchestrator.rollback(app, target, actor).await?;
    let failures = match settle(&orchestrator, created, dispatch, &output).await? {
        Some(record) if record.status == DeploymentStatus::Failed => vec![record],
        _ => Vec::new(),
    };
    finish(failures, &output)
}
