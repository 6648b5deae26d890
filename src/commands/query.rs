// ABOUTME: Read-only command implementations: status, list, and releases.
// ABOUTME: Records are shown without their approval token digest.

use std::sync::Arc;
use wharf::deploy::{DeploymentStatus, Orchestrator};
use wharf::error::{Error, Result};
use wharf::output::Output;
use wharf::store::DeploymentFilter;
use wharf::types::AppKey;

use super::parse_id;

pub async fn status(orchestrator: Arc<Orchestrator>, id: &str, output: Output) -> Result<()> {
    let record = orchestrator.status(parse_id(id)?).await?;
    output.record(&record);
    Ok(())
}

pub async fn list(
    orchestrator: Arc<Orchestrator>,
    app: Option<&str>,
    status: Option<DeploymentStatus>,
    limit: usize,
    output: Output,
) -> Result<()> {
    let app = app
        .map(|key| {
            orchestrator.apps().resolve(key)?;
            AppKey::new(key).map_err(|e| Error::InvalidArgument(e.to_string()))
        })
        .transpose()?;
    let filter = DeploymentFilter {
        app,
        status,
        limit: Some(limit),
    };
    let records = orchestrator.list(&filter).await?;
    output.records(&records);
    Ok(())
}

pub async fn releases(orchestrator: Arc<Orchestrator>, app: &str, output: Output) -> Result<()> {
    let releases = orchestrator.releases(app).await?;
    output.releases(&releases);
    Ok(())
}
