pub mod db_restore;
pub mod s3_download;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::backup::db_dump::DumpInvoker;
use crate::config::{AppConfig, ConnectionConfig, OperationConfig, RestoreConfig};
use crate::connection::ConnectionManager;
use crate::precheck::PreCheckWorkflow;
use crate::utils::command::ToolRunner;
use db_restore::{RestoreInvoker, RestoreRequest};

/// Entry point for `restore`.
///
/// With `require_precheck` the source scope must pass a schema pre-check first;
/// a rejected pre-check stops the flow before the target is touched.
pub async fn run_restore_flow(app_config: &AppConfig) -> Result<()> {
    let restore_config = match &app_config.operation {
        Some(OperationConfig::Restore(cfg)) => cfg,
        _ => anyhow::bail!("Restore operation selected but no restore configuration found."),
    };

    let mut manager = ConnectionManager::new(app_config.connection.clone());
    let outcome = async {
        manager
            .open()
            .await
            .context("Cannot reach the restore target server")?;
        perform_restore(app_config, restore_config).await
    }
    .await;
    manager.close().await;
    outcome
}

async fn perform_restore(app_config: &AppConfig, restore_config: &RestoreConfig) -> Result<()> {
    let connection = &app_config.connection;
    let restorer = RestoreInvoker::locate(&app_config.tools)?;

    let artifact_path = if restore_config.download_from_spaces {
        let spaces = app_config
            .spaces_config
            .as_ref()
            .context("S3 artifact requested but s3_storage is not configured")?;
        s3_download::download_artifact(
            spaces,
            &restore_config.artifact_source_path,
            &restore_config.download_dir,
        )
        .await?
    } else {
        PathBuf::from(&restore_config.artifact_source_path)
    };

    let workflow = if restore_config.require_precheck {
        Some(PreCheckWorkflow::new(
            DumpInvoker::locate(&app_config.tools)?,
            RestoreInvoker::locate(&app_config.tools)?,
            app_config.precheck.clone(),
        ))
    } else {
        None
    };
    gated_restore(
        connection,
        restore_config,
        artifact_path,
        workflow.as_ref(),
        &restorer,
    )?;
    Ok(())
}

/// Restores `artifact_path` into the configured target.
///
/// When `require_precheck` is set the source scope is pre-checked through
/// `workflow` first and nothing reaches `restorer` unless it validates.
pub fn gated_restore<R: ToolRunner>(
    connection: &ConnectionConfig,
    restore_config: &RestoreConfig,
    artifact_path: PathBuf,
    workflow: Option<&PreCheckWorkflow<R>>,
    restorer: &RestoreInvoker<R>,
) -> Result<RestoreRequest> {
    if restore_config.require_precheck {
        let source = restore_config
            .source_database
            .as_deref()
            .context("restore.source_database is required for the pre-check gate")?;
        let workflow = workflow.context("pre-check required but no pre-check tools available")?;
        let result = workflow
            .precheck(connection, source, &restore_config.tables)
            .with_context(|| format!("Pre-check of {} could not run", source))?;
        result.require_validated()?;
    }

    let target = restore_config.target_database.clone().unwrap_or_else(|| {
        RestoreRequest::default_target(restore_config.source_database.as_deref())
    });
    let request = RestoreRequest::new(artifact_path, target);
    info!(
        artifact = %request.artifact_path.display(),
        target = %request.target_database,
        "restoring artifact"
    );

    restorer
        .restore(connection, &request)
        .with_context(|| format!("Restore into {} failed", request.target_database))?;
    info!(target = %request.target_database, "✓ restore complete");
    Ok(request)
}
