// pgopstool/src/precheck/workflow.rs
//! Schema restorability check.
//!
//! A schema-only dump of the scope is restored into a scratch database. Only a
//! clean restore counts as [`PreCheckOutcome::Validated`]; callers must not
//! trust a real restore of the same scope otherwise.

use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::backup::db_dump::DumpInvoker;
use crate::backup::planner::{ExportArtifact, ExportMode, ExportPlanner, ExportRequest};
use crate::config::{ConnectionConfig, PreCheckConfig};
use crate::connection::ConnectionHandle;
use crate::errors::{AppError, PreCheckRejected, ToolError};
use crate::restore::db_restore::{RestoreInvoker, RestoreRequest};
use crate::utils::command::{ProcessRunner, ToolRunner};
use crate::utils::create_dir_all;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCheckOutcome {
    Validated,
    SchemaRestoreFailed { code: Option<i32>, reason: String },
    ExportMissing,
}

impl fmt::Display for PreCheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreCheckOutcome::Validated => write!(f, "validated"),
            PreCheckOutcome::SchemaRestoreFailed { code: Some(code), .. } => {
                write!(f, "schema restore failed with exit code {}", code)
            }
            PreCheckOutcome::SchemaRestoreFailed { code: None, reason } => {
                write!(f, "schema restore failed: {}", reason)
            }
            PreCheckOutcome::ExportMissing => write!(f, "schema export produced no artifact"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCheckResult {
    pub outcome: PreCheckOutcome,
    pub database: String,
    pub tables: Vec<String>,
    pub scratch_database: String,
    pub artifact: Option<ExportArtifact>,
}

impl PreCheckResult {
    pub fn is_validated(&self) -> bool {
        self.outcome == PreCheckOutcome::Validated
    }

    /// The gate in front of a production restore.
    pub fn require_validated(&self) -> Result<&ExportArtifact, PreCheckRejected> {
        match (&self.outcome, &self.artifact) {
            (PreCheckOutcome::Validated, Some(artifact)) => Ok(artifact),
            _ => Err(PreCheckRejected {
                scope: self.scope_label(),
                outcome: self.outcome.to_string(),
            }),
        }
    }

    fn scope_label(&self) -> String {
        if self.tables.is_empty() {
            self.database.clone()
        } else {
            format!("{}[{}]", self.database, self.tables.join(","))
        }
    }
}

/// Composes planner, dump and restore into the pre-check cycle.
pub struct PreCheckWorkflow<R = ProcessRunner> {
    dumper: DumpInvoker<R>,
    restorer: RestoreInvoker<R>,
    settings: PreCheckConfig,
}

impl<R: ToolRunner> PreCheckWorkflow<R> {
    pub fn new(dumper: DumpInvoker<R>, restorer: RestoreInvoker<R>, settings: PreCheckConfig) -> Self {
        Self {
            dumper,
            restorer,
            settings,
        }
    }

    /// `{root}/{host_label}/{database}/{YYYYMMDD}`
    pub fn destination_dir(&self, config: &ConnectionConfig, database: &str) -> PathBuf {
        self.settings
            .root_dir
            .join(config.host_label().replace(['/', '\\'], "_"))
            .join(database)
            .join(Local::now().format("%Y%m%d").to_string())
    }

    /// Dumps the scope schema-only and restores it into the scratch database.
    ///
    /// Dump failures are fatal and returned as errors. A failed restore is an
    /// outcome, not an error.
    pub fn precheck(
        &self,
        config: &ConnectionConfig,
        database: &str,
        tables: &[String],
    ) -> Result<PreCheckResult, ToolError> {
        info!(host = %config.host(), database, tables = ?tables, "pre-checking schema restorability");

        let destination = self.destination_dir(config, database);
        create_dir_all(&destination)?;

        let request = ExportRequest::new(&destination)
            .with_database(database)
            .with_tables(tables.iter().cloned())
            .with_mode(ExportMode::SchemaOnly);
        let artifact = ExportPlanner::plan(&request, config.host_label());

        let output = self.dumper.dump(config, &artifact, &request)?;
        info!(
            path = %artifact.path.display(),
            bytes = output.len(),
            "pre-check export result"
        );

        let mut result = PreCheckResult {
            outcome: PreCheckOutcome::ExportMissing,
            database: database.to_string(),
            tables: tables.to_vec(),
            scratch_database: self.settings.scratch_database.clone(),
            artifact: None,
        };

        if !artifact.exists() {
            warn!(path = %artifact.path.display(), "pre-check export produced no file");
            return Ok(result);
        }

        let restore_request = RestoreRequest::new(&artifact.path, &self.settings.scratch_database);
        result.outcome = match self.restorer.restore(config, &restore_request) {
            Ok(_) => {
                info!(
                    database,
                    scratch = %self.settings.scratch_database,
                    "✓ schema restore validated"
                );
                PreCheckOutcome::Validated
            }
            Err(e) => {
                error!(
                    database,
                    scratch = %self.settings.scratch_database,
                    error = %e,
                    "schema restore failed during pre-check"
                );
                PreCheckOutcome::SchemaRestoreFailed {
                    code: e.exit_code(),
                    reason: e.to_string(),
                }
            }
        };
        result.artifact = Some(artifact);
        Ok(result)
    }

    /// Pre-checks the scope, then runs `statement` on `handle` only if it validated.
    pub async fn apply_ddl(
        &self,
        handle: &mut ConnectionHandle,
        config: &ConnectionConfig,
        database: &str,
        tables: &[String],
        statement: &str,
    ) -> Result<PreCheckResult, AppError> {
        // the validated scope and the session running the statement must agree
        if handle.database() != database {
            return Err(AppError::DatabaseMismatch {
                scope_database: database.to_string(),
                session_database: handle.database().to_string(),
            });
        }
        let result = self.precheck(config, database, tables)?;
        if !result.is_validated() {
            warn!(database, outcome = %result.outcome, "skipping DDL, pre-check did not validate");
            return Ok(result);
        }
        let affected = handle.try_execute(statement).await?;
        info!(database, affected, "✓ DDL applied after pre-check");
        Ok(result)
    }
}
