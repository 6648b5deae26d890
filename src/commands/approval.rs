// ABOUTME: Approval command implementations: approve, reject, and the expiry sweep.
// ABOUTME: Approved deployments run inline unless dispatch is disabled.

use std::sync::Arc;
use wharf::approval::Actor;
use wharf::deploy::{DeploymentStatus, Orchestrator};
use wharf::error::{Error, Result};
use wharf::output::Output;

pub async fn approve(
    orchestrator: Arc<Orchestrator>,
    token: &str,
    actor: &Actor,
    dispatch: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let record = orchestrator.approve(token, actor).await?;
    output.progress(&format!(
        "Approved deployment {} by {}",
        record.id,
        actor.identity()
    ));

    if !dispatch {
        output.record(&record);
        return Ok(());
    }

    let finished = orchestrator.dispatch(record.id).await?;
    output.record(&finished);
    if finished.status == DeploymentStatus::Failed {
        return Err(Error::Unsuccessful {
            id: finished.id.to_string(),
            status: finished.status.to_string(),
        });
    }
    output.success("Deployment complete");
    Ok(())
}

pub async fn reject(
    orchestrator: Arc<Orchestrator>,
    token: &str,
    actor: &Actor,
    reason: Option<&str>,
    output: Output,
) -> Result<()> {
    let record = orchestrator.reject(token, actor, reason).await?;
    output.record(&record);
    output.success(&format!("Rejected deployment {}", record.id));
    Ok(())
}

pub async fn sweep(orchestrator: Arc<Orchestrator>, output: Output) -> Result<()> {
    let expired = orchestrator.expire_stale().await?;
    for record in &expired {
        output.progress(&format!(
            "  expired {} ({}/{})",
            record.id, record.app_key, record.trigger_name
        ));
    }
    output.success(&format!("Expired {} pending approval(s)", expired.len()));
    Ok(())
}
