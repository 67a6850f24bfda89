pub mod workflow;

use anyhow::{Context, Result};
use tracing::info;

use crate::backup::db_dump::DumpInvoker;
use crate::config::{AppConfig, ConnectionConfig, OperationConfig};
use crate::connection::ConnectionManager;
use crate::restore::db_restore::RestoreInvoker;
pub use workflow::{PreCheckOutcome, PreCheckResult, PreCheckWorkflow};

fn workflow_for(app_config: &AppConfig) -> Result<PreCheckWorkflow> {
    Ok(PreCheckWorkflow::new(
        DumpInvoker::locate(&app_config.tools)?,
        RestoreInvoker::locate(&app_config.tools)?,
        app_config.precheck.clone(),
    ))
}

/// The configured session, pointed at the database a scope names.
pub fn scoped_connection(base: &ConnectionConfig, database: &str) -> ConnectionConfig {
    base.clone().with_database(database)
}

/// Entry point for `precheck`. Fails unless the scope validates.
pub async fn run_precheck_flow(app_config: &AppConfig) -> Result<PreCheckResult> {
    let scope = match &app_config.operation {
        Some(OperationConfig::PreCheck(scope)) => scope,
        _ => anyhow::bail!("Pre-check operation selected but no precheck scope found."),
    };

    let mut manager =
        ConnectionManager::new(scoped_connection(&app_config.connection, &scope.database));
    let outcome = async {
        manager
            .open()
            .await
            .context("Cannot reach the database to pre-check")?;
        let result = workflow_for(app_config)?
            .precheck(&app_config.connection, &scope.database, &scope.tables)
            .with_context(|| format!("Pre-check of {} could not run", scope.database))?;
        result.require_validated()?;
        info!(database = %scope.database, "✓ pre-check passed");
        Ok::<_, anyhow::Error>(result)
    }
    .await;
    manager.close().await;
    outcome
}

/// Entry point for `ddl`: the statement runs only after its scope validates.
pub async fn run_ddl_flow(app_config: &AppConfig) -> Result<PreCheckResult> {
    let ddl = match &app_config.operation {
        Some(OperationConfig::Ddl(ddl)) => ddl,
        _ => anyhow::bail!("DDL operation selected but no ddl configuration found."),
    };

    let connection = scoped_connection(&app_config.connection, &ddl.scope.database);
    let mut manager = ConnectionManager::new(connection.clone());
    let outcome = async {
        let handle = manager
            .open()
            .await
            .context("Cannot reach the database for DDL")?;
        let result = workflow_for(app_config)?
            .apply_ddl(
                handle,
                &connection,
                &ddl.scope.database,
                &ddl.scope.tables,
                &ddl.statement,
            )
            .await
            .context("DDL was not applied")?;
        result.require_validated()?;
        Ok::<_, anyhow::Error>(result)
    }
    .await;
    manager.close().await;
    outcome
}
