// ABOUTME: Event and deploy command implementations.
// ABOUTME: Creates records from events or operator requests and runs queued ones inline.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use wharf::approval::Actor;
use wharf::deploy::{
    CreatedDeployment, DeploymentRecord, DeploymentStatus, ManualDeployment, Orchestrator,
    TriggerOutcome,
};
use wharf::error::{Error, Result};
use wharf::output::Output;
use wharf::registry::SourceEvent;

/// Read a JSON event from a file, or from stdin when `path` is `-`.
pub fn read_event(path: &Path) -> Result<SourceEvent> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&content)?)
}

pub async fn event(
    orchestrator: Arc<Orchestrator>,
    event: SourceEvent,
    dispatch: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Received {} event for {}",
        event.kind, event.git_ref
    ));

    let outcomes = orchestrator.handle_event(event).await?;
    if outcomes.is_empty() {
        output.success("No trigger matched the event");
        return Ok(());
    }

    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            TriggerOutcome::Created(created) => {
                if let Some(record) = settle(&orchestrator, created, dispatch, &output).await?
                    && record.status == DeploymentStatus::Failed
                {
                    failures.push(record);
                }
            }
            TriggerOutcome::Duplicate(record) => {
                output.warning(&format!(
                    "delivery already processed as deployment {}",
                    record.id
                ));
                output.record(&record);
            }
            TriggerOutcome::Refused {
                app,
                trigger,
                error,
            } => output.warning(&format!("{app}/{trigger}: {error}")),
        }
    }

    finish(failures, &output)
}

pub async fn deploy(
    orchestrator: Arc<Orchestrator>,
    app: &str,
    trigger: &str,
    request: ManualDeployment,
    actor: &Actor,
    dispatch: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Deploying {app} via {trigger} at {}",
        request.git_ref
    ));

    let created = orchestrator
        .create_deployment(app, trigger, request, actor)
        .await?;
    let failures = match settle(&orchestrator, created, dispatch, &output).await? {
        Some(record) if record.status == DeploymentStatus::Failed => vec![record],
        _ => Vec::new(),
    };
    finish(failures, &output)
}

/// Show the approval token, or run the deployment when it is queued.
/// Returns the final record when it was dispatched.
pub(super) async fn settle(
    orchestrator: &Arc<Orchestrator>,
    created: CreatedDeployment,
    dispatch: bool,
    output: &Output,
) -> Result<Option<DeploymentRecord>> {
    let CreatedDeployment { record, approval } = created;

    if let Some(token) = approval {
        output.approval_token(&record, token.expose());
        return Ok(None);
    }
    if !dispatch || record.status != DeploymentStatus::Queued {
        output.record(&record);
        return Ok(None);
    }

    output.progress(&format!(
        "  → Running {} for {}...",
        record.trigger_name, record.app_key
    ));
    let finished = orchestrator.dispatch(record.id).await?;
    output.record(&finished);
    Ok(Some(finished))
}

pub(super) fn finish(failures: Vec<DeploymentRecord>, output: &Output) -> Result<()> {
    match failures.into_iter().next() {
        Some(failed) => Err(Error::Unsuccessful {
            id: failed.id.to_string(),
            status: failed.status.to_string(),
        }),
        None => {
            output.success("Done");
            Ok(())
        }
    }
}
