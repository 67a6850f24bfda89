//! PostgreSQL operations tool
//!
//! CLI front end for backup, restore, schema pre-check, activity and gated DDL.

// pgopstool/src/main.rs
use anyhow::{Context, Result};
use pgopstool::config::{
    AppConfig, OperationConfig, load_ddl_config_from_json, load_export_config_from_json,
    load_precheck_scope_from_json, load_restore_config_from_json,
};
use pgopstool::utils::logging::init_logging;
use pgopstool::{activity, backup, precheck, restore};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const CONFIG_PATH_VAR: &str = "PGOPSTOOL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = env::var(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut app_config = AppConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            config_path.display()
        )
    })?;
    init_logging(&app_config.log_level);

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    let spaces_is_configured = app_config.spaces_config.is_some();

    match choice.as_str() {
        "1" | "backup" => {
            info!("🚀 Starting backup");
            let export_config =
                load_export_config_from_json(&app_config.raw_json_config, spaces_is_configured)
                    .context("Failed to load export configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Backup(export_config));
            let artifact = backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
            info!(path = %artifact.path.display(), "artifact written");
        }
        "2" | "restore" => {
            info!("🔄 Starting restore");
            let restore_config =
                load_restore_config_from_json(&app_config.raw_json_config, spaces_is_configured)
                    .context("Failed to load restore configuration from JSON")?;
            info!(
                artifact = %restore_config.artifact_source_path,
                require_precheck = restore_config.require_precheck,
                "restore requested"
            );
            app_config.operation = Some(OperationConfig::Restore(restore_config));
            restore::run_restore_flow(&app_config)
                .await
                .context("Restore process failed")?;
        }
        "3" | "precheck" => {
            info!("🔍 Starting schema pre-check");
            let scope = load_precheck_scope_from_json(&app_config.raw_json_config)
                .context("Failed to load precheck scope from JSON")?;
            app_config.operation = Some(OperationConfig::PreCheck(scope));
            precheck::run_precheck_flow(&app_config)
                .await
                .context("Pre-check failed")?;
        }
        "4" | "activity" => {
            app_config.operation = Some(OperationConfig::Activity);
            let sessions = activity::run_activity_flow(&app_config)
                .await
                .context("Activity check failed")?;
            info!(count = sessions.len(), "active sessions listed");
        }
        "5" | "ddl" => {
            info!("🛠 Starting pre-checked DDL");
            let ddl_config = load_ddl_config_from_json(&app_config.raw_json_config)
                .context("Failed to load ddl configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Ddl(ddl_config));
            precheck::run_ddl_flow(&app_config)
                .await
                .context("DDL process failed")?;
        }
        _ => {
            anyhow::bail!(
                "Invalid operation choice {:?}. Please enter 1 (backup), 2 (restore), 3 (precheck), 4 (activity) or 5 (ddl).",
                choice
            );
        }
    }
    Ok(())
}

/// Asks for an operation when none was given on the command line.
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    println!("3. Pre-check Schema Restore (or type 'precheck')");
    println!("4. Show Active Sessions (or type 'activity')");
    println!("5. Apply Pre-checked DDL (or type 'ddl')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
