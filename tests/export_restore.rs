use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;

use pgopstool::backup::db_dump::DumpInvoker;
use pgopstool::backup::planner::{ExportMode, ExportPlanner, ExportRequest};
use pgopstool::config::{ConnectionConfig, PreCheckConfig};
use pgopstool::errors::ToolError;
use pgopstool::precheck::{PreCheckOutcome, PreCheckWorkflow};
use pgopstool::restore::db_restore::{RestoreInvoker, RestoreRequest};
use pgopstool::utils::command::{ToolCommand, ToolRunner};

/// Stands in for pg_dump/pg_restore: writes the `-f` target and exits with scripted codes.
#[derive(Default)]
struct StubTools {
    exit_codes: RefCell<VecDeque<i32>>,
    seen: RefCell<Vec<Vec<String>>>,
}

impl StubTools {
    fn exiting_with(codes: &[i32]) -> Self {
        Self {
            exit_codes: RefCell::new(codes.iter().copied().collect()),
            seen: RefCell::default(),
        }
    }
}

impl ToolRunner for StubTools {
    fn run(&self, command: &ToolCommand) -> Result<Vec<u8>, ToolError> {
        let argv = command.argv();
        self.seen.borrow_mut().push(argv.clone());
        let code = self.exit_codes.borrow_mut().pop_front().unwrap_or(0);
        if code != 0 {
            return Err(ToolError::NonZeroExit {
                program: command.program_name(),
                code,
                stderr: "stub failure".to_string(),
            });
        }
        if let Some(pos) = argv.iter().position(|a| a == "-f") {
            std::fs::write(PathBuf::from(&argv[pos + 1]), b"PGDMP").map_err(|source| {
                ToolError::Spawn {
                    program: command.program_name(),
                    source,
                }
            })?;
        }
        Ok(Vec::new())
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("db1.internal", 5432, "postgres", "postgres", "")
}

#[test]
fn schema_export_then_validation_restore() -> anyhow::Result<()> {
    let backup_dir = tempfile::tempdir()?;
    let tools = StubTools::default();
    let dumper = DumpInvoker::with_runner("pg_dump", &tools);
    let restorer = RestoreInvoker::with_runner("pg_restore", &tools);

    let request = ExportRequest::new(backup_dir.path())
        .with_database("sales")
        .with_mode(ExportMode::SchemaOnly);
    let artifact = ExportPlanner::plan(&request, config().host_label());
    assert!(artifact.file_name.ends_with("_db1.internal_sales_backup.sql"));
    assert_eq!(artifact.path.parent(), Some(backup_dir.path()));

    dumper.dump(&config(), &artifact, &request)?;
    assert!(artifact.exists());

    let restore = RestoreRequest::for_artifact(&artifact);
    assert_eq!(restore.target_database, "sales_validate");
    restorer.restore(&config(), &restore)?;

    let seen = tools.seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].contains(&"--schema-only".to_string()));
    assert!(seen[0].contains(&"--no-password".to_string()));
    assert!(seen[1].contains(&"-d=sales_validate".to_string()));
    assert_eq!(seen[1][5], artifact.path.to_string_lossy());
    Ok(())
}

#[test]
fn failed_restore_is_surfaced_with_its_exit_code() -> anyhow::Result<()> {
    let backup_dir = tempfile::tempdir()?;
    let tools = StubTools::exiting_with(&[0, 1]);
    let dumper = DumpInvoker::with_runner("pg_dump", &tools);
    let restorer = RestoreInvoker::with_runner("pg_restore", &tools);

    let request = ExportRequest::new(backup_dir.path())
        .with_database("sales")
        .with_mode(ExportMode::SchemaOnly);
    let artifact = ExportPlanner::plan(&request, "db1.internal");
    dumper.dump(&config(), &artifact, &request)?;

    let err = restorer
        .restore(&config(), &RestoreRequest::for_artifact(&artifact))
        .unwrap_err();
    assert_eq!(err.exit_code(), Some(1));
    Ok(())
}

#[test]
fn production_restore_is_gated_on_precheck() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let precheck_settings = PreCheckConfig {
        root_dir: root.path().to_path_buf(),
        scratch_database: "scratch".to_string(),
    };
    let tables = vec!["orders".to_string(), "customers".to_string()];

    let healthy = StubTools::default();
    let workflow = PreCheckWorkflow::new(
        DumpInvoker::with_runner("pg_dump", &healthy),
        RestoreInvoker::with_runner("pg_restore", &healthy),
        precheck_settings.clone(),
    );
    let result = workflow.precheck(&config(), "sales", &tables)?;
    assert_eq!(result.outcome, PreCheckOutcome::Validated);
    let validated = result.require_validated()?;
    assert!(validated.file_name.ends_with("_db1.internal_sales_tables_backup.sql"));

    let broken = StubTools::exiting_with(&[0, 1]);
    let workflow = PreCheckWorkflow::new(
        DumpInvoker::with_runner("pg_dump", &broken),
        RestoreInvoker::with_runner("pg_restore", &broken),
        precheck_settings,
    );
    let result = workflow.precheck(&config(), "sales", &tables)?;
    assert!(matches!(
        result.outcome,
        PreCheckOutcome::SchemaRestoreFailed { code: Some(1), .. }
    ));
    let rejected = result.require_validated().unwrap_err();
    assert_eq!(rejected.scope, "sales[orders,customers]");
    Ok(())
}
