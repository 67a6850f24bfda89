// pgopstool/src/backup/db_dump.rs
use std::path::{Path, PathBuf};
use tracing::info;

use super::planner::{ExportArtifact, ExportRequest};
use crate::config::{ConnectionConfig, ToolPaths};
use crate::errors::{FileSystemError, ToolError};
use crate::utils::command::{ProcessRunner, ToolCommand, ToolRunner};
use crate::utils::{ensure_writable_dir, find_executable};

pub const PG_DUMP: &str = "pg_dump";

/// Appends `--password=<pw>` or `--no-password`, and exports `PGPASSWORD` for the child.
pub(crate) fn with_credentials(command: ToolCommand, config: &ConnectionConfig) -> ToolCommand {
    if config.has_password() {
        command
            .secret("--password", config.password().to_string())
            .env("PGPASSWORD", config.password().to_string())
    } else {
        command.flag("--no-password")
    }
}

/// Builds and runs `pg_dump` for a planned export.
pub struct DumpInvoker<R = ProcessRunner> {
    program: PathBuf,
    runner: R,
}

impl DumpInvoker<ProcessRunner> {
    /// Uses the configured `pg_dump` path, or finds it in PATH.
    pub fn locate(tools: &ToolPaths) -> Result<Self, ToolError> {
        let program = find_executable(PG_DUMP, tools.pg_dump.as_deref())?;
        Ok(Self::with_runner(program, ProcessRunner))
    }
}

impl<R: ToolRunner> DumpInvoker<R> {
    pub fn with_runner(program: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn command(
        &self,
        config: &ConnectionConfig,
        artifact: &ExportArtifact,
        request: &ExportRequest,
    ) -> ToolCommand {
        let mut command = ToolCommand::new(&self.program)
            .assign("--host", config.host().to_string())
            .assign("--port", config.port().to_string())
            .assign("--username", config.user().to_string())
            .flag("-Fc")
            .separate("-f", artifact.path.to_string_lossy())
            .flag("-v");

        command = with_credentials(command, config);

        for table in &request.tables {
            command = command.assign("--table", table.clone());
        }

        if let Some(mode_flag) = request.mode.dump_flag() {
            command = command.flag(mode_flag);
        }

        if let Some(database) = request.database.as_deref().filter(|db| !db.is_empty()) {
            command = command.assign("--dbname", database);
        }

        command
    }

    /// Runs the dump and returns the tool's standard output.
    ///
    /// The dump itself lands in `artifact.path`. A non-zero exit is returned as
    /// [`ToolError::NonZeroExit`] and is never retried.
    pub fn dump(
        &self,
        config: &ConnectionConfig,
        artifact: &ExportArtifact,
        request: &ExportRequest,
    ) -> Result<Vec<u8>, ToolError> {
        let destination = artifact
            .path
            .parent()
            .ok_or_else(|| FileSystemError::MissingDirectory {
                path: artifact.path.clone(),
            })?;
        ensure_writable_dir(destination)?;

        let command = self.command(config, artifact, request);
        info!(
            host = %config.host(),
            database = request.database.as_deref().unwrap_or(config.database()),
            scope = %artifact.scope,
            command = %command,
            "running export"
        );

        let output = self.runner.run(&command)?;
        info!(path = %artifact.path.display(), "✓ export finished");
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use crate::errors::ToolError;
    use crate::utils::command::{ToolCommand, ToolRunner};

    /// What the fake tool does for one invocation.
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Exit 0, writing `-f <path>` if present, and print `stdout`.
        Succeed(&'static str),
        /// Exit 0 without writing any output file.
        SucceedWithoutFile,
        Exit(i32),
    }

    /// Records every command and replays scripted outcomes in order.
    /// Once the script runs out, every call succeeds.
    #[derive(Debug, Clone, Default)]
    pub struct FakeRunner {
        pub calls: Arc<Mutex<Vec<ToolCommand>>>,
        script: Arc<Mutex<Vec<Script>>>,
    }

    impl FakeRunner {
        pub fn scripted(script: Vec<Script>) -> Self {
            Self {
                calls: Arc::default(),
                script: Arc::new(Mutex::new(script)),
            }
        }

        pub fn recorded(&self) -> Vec<ToolCommand> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn argv(&self, index: usize) -> Vec<String> {
            self.recorded()[index].argv()
        }
    }

    impl ToolRunner for FakeRunner {
        fn run(&self, command: &ToolCommand) -> Result<Vec<u8>, ToolError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(command.clone());
            }
            let next = self
                .script
                .lock()
                .ok()
                .and_then(|mut s| if s.is_empty() { None } else { Some(s.remove(0)) })
                .unwrap_or(Script::Succeed(""));

            match next {
                Script::Succeed(stdout) => {
                    let argv = command.argv();
                    if let Some(pos) = argv.iter().position(|a| a == "-f") {
                        let out = PathBuf::from(&argv[pos + 1]);
                        std::fs::write(&out, b"PGDMP").map_err(|source| ToolError::Spawn {
                            program: command.program_name(),
                            source,
                        })?;
                    }
                    Ok(stdout.as_bytes().to_vec())
                }
                Script::SucceedWithoutFile => Ok(Vec::new()),
                Script::Exit(code) => Err(ToolError::NonZeroExit {
                    program: command.program_name(),
                    code,
                    stderr: format!("scripted failure {}", code),
                }),
            }
        }
    }
}
