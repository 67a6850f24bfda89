// pgopstool/src/restore/db_restore.rs
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backup::db_dump::with_credentials;
use crate::backup::planner::ExportArtifact;
use crate::config::{ConnectionConfig, DEFAULT_DATABASE, ToolPaths};
use crate::errors::{FileSystemError, ToolError};
use crate::utils::command::{ProcessRunner, ToolCommand, ToolRunner};
use crate::utils::find_executable;

pub const PG_RESTORE: &str = "pg_restore";
const VALIDATION_SUFFIX: &str = "_validate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub artifact_path: PathBuf,
    pub target_database: String,
}

impl RestoreRequest {
    pub fn new(artifact_path: impl Into<PathBuf>, target_database: impl Into<String>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            target_database: target_database.into(),
        }
    }

    /// Targets `{database}_validate`, or `postgres` for artifacts without a database,
    /// so a restore never lands on its own source by default.
    pub fn for_artifact(artifact: &ExportArtifact) -> Self {
        Self::new(
            &artifact.path,
            Self::default_target(artifact.scope.database.as_deref()),
        )
    }

    pub fn default_target(source_database: Option<&str>) -> String {
        match source_database {
            Some(db) if !db.is_empty() => format!("{}{}", db, VALIDATION_SUFFIX),
            _ => DEFAULT_DATABASE.to_string(),
        }
    }
}

/// Builds and runs `pg_restore` for a dump artifact.
pub struct RestoreInvoker<R = ProcessRunner> {
    program: PathBuf,
    runner: R,
}

impl RestoreInvoker<ProcessRunner> {
    pub fn locate(tools: &ToolPaths) -> Result<Self, ToolError> {
        let program = find_executable(PG_RESTORE, tools.pg_restore.as_deref())?;
        Ok(Self::with_runner(program, ProcessRunner))
    }
}

impl<R: ToolRunner> RestoreInvoker<R> {
    pub fn with_runner(program: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn command(&self, config: &ConnectionConfig, request: &RestoreRequest) -> ToolCommand {
        let command = ToolCommand::new(&self.program)
            .assign("--host", config.host().to_string())
            .assign("--port", config.port().to_string())
            .assign("--username", config.user().to_string())
            .assign("-d", request.target_database.clone())
            .flag("-Fc")
            .positional(request.artifact_path.to_string_lossy());
        with_credentials(command, config)
    }

    /// Loads the artifact into `request.target_database`.
    ///
    /// Fails before spawning when the artifact is missing; a non-zero exit is
    /// [`ToolError::NonZeroExit`] and is not retried.
    pub fn restore(
        &self,
        config: &ConnectionConfig,
        request: &RestoreRequest,
    ) -> Result<Vec<u8>, ToolError> {
        if !request.artifact_path.is_file() {
            return Err(FileSystemError::MissingArtifact {
                path: request.artifact_path.clone(),
            }
            .into());
        }

        let command = self.command(config, request);
        info!(
            host = %config.host(),
            database = %request.target_database,
            artifact = %request.artifact_path.display(),
            command = %command,
            "running restore"
        );

        let output = self.runner.run(&command)?;
        info!(
            database = %request.target_database,
            "✓ restore into {} finished",
            request.target_database
        );
        Ok(output)
    }
}
