pub mod db_dump;
pub mod planner;
pub mod s3_upload;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{AppConfig, ExportConfig, OperationConfig};
use crate::connection::ConnectionManager;
use db_dump::DumpInvoker;
use planner::{ExportArtifact, ExportPlanner};

/// Entry point for `backup`: plan, dump, then upload when object storage is configured.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<ExportArtifact> {
    let export_config = match &app_config.operation {
        Some(OperationConfig::Backup(cfg)) => cfg,
        _ => anyhow::bail!("Backup operation selected but no export configuration found."),
    };

    let mut manager = ConnectionManager::new(app_config.connection.clone());
    let outcome = async {
        manager
            .open()
            .await
            .context("Cannot reach the source database")?;
        perform_export(app_config, export_config).await
    }
    .await;
    manager.close().await;
    outcome
}

async fn perform_export(app_config: &AppConfig, export_config: &ExportConfig) -> Result<ExportArtifact> {
    let connection = &app_config.connection;
    let request = &export_config.request;

    let dumper = DumpInvoker::locate(&app_config.tools)?;
    let artifact = ExportPlanner::plan(request, connection.host_label());
    info!(
        scope = %artifact.scope,
        path = %artifact.path.display(),
        "planned export"
    );

    dumper
        .dump(connection, &artifact, request)
        .with_context(|| format!("Export of {} failed", artifact.scope))?;

    if !artifact.exists() {
        anyhow::bail!(
            "{} exited successfully but {} was not written",
            dumper.program().display(),
            artifact.path.display()
        );
    }

    match (&app_config.spaces_config, export_config.upload_to_spaces) {
        (Some(spaces), true) => {
            s3_upload::upload_artifact(spaces, &artifact, connection.host_label())
                .await
                .context("Artifact was written locally but the upload failed")?;
        }
        _ => warn!("object storage not configured, artifact kept locally only"),
    }

    info!(path = %artifact.path.display(), "✓ backup complete");
    Ok(artifact)
}
