// pgopstool/src/backup/planner.rs
//! Artifact naming for exports.
//!
//! Names follow `{YYYYMMDDHHMMSS_micros}_{host}[_{database}[_tables]]_backup.sql`.
//! Other tooling locates backups by this layout, so it must not change.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S_%6f";
const ARTIFACT_SUFFIX: &str = "backup.sql";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportMode {
    #[default]
    Full,
    SchemaOnly,
    DataOnly,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Full => "full",
            ExportMode::SchemaOnly => "schema-only",
            ExportMode::DataOnly => "data-only",
        }
    }

    /// The dump flag selecting this mode; a full dump has none.
    pub fn dump_flag(&self) -> Option<&'static str> {
        match self {
            ExportMode::Full => None,
            ExportMode::SchemaOnly => Some("--schema-only"),
            ExportMode::DataOnly => Some("--data-only"),
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown export mode {0:?} (expected full, schema-only or data-only)")]
pub struct UnknownExportMode(pub String);

impl FromStr for ExportMode {
    type Err = UnknownExportMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "full" => Ok(ExportMode::Full),
            "schema-only" => Ok(ExportMode::SchemaOnly),
            "data-only" => Ok(ExportMode::DataOnly),
            other => Err(UnknownExportMode(other.to_string())),
        }
    }
}

/// What to export and where. An empty table list means the whole database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub database: Option<String>,
    pub tables: Vec<String>,
    pub destination_dir: PathBuf,
    pub mode: ExportMode,
}

impl ExportRequest {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            database: None,
            tables: Vec::new(),
            destination_dir: destination_dir.into(),
            mode: ExportMode::Full,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: ExportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn scope(&self) -> ExportScope {
        ExportScope {
            database: self.database.clone(),
            tables: self.tables.clone(),
            mode: self.mode,
        }
    }
}

/// Database, table subset and mode covered by an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportScope {
    pub database: Option<String>,
    pub tables: Vec<String>,
    pub mode: ExportMode,
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}", db)?,
            None => write!(f, "<default database>")?,
        }
        if !self.tables.is_empty() {
            write!(f, "[{}]", self.tables.join(","))?;
        }
        write!(f, " ({})", self.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub scope: ExportScope,
    pub created_at: DateTime<Local>,
}

impl ExportArtifact {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

static LAST_PLANNED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Now, bumped to at least one microsecond after the previous plan in this process.
fn next_timestamp() -> DateTime<Local> {
    let now = Local::now();
    let now_micros = now.timestamp_micros();
    let mut previous = LAST_PLANNED_MICROS.load(Ordering::Acquire);
    loop {
        let candidate = now_micros.max(previous.saturating_add(1));
        match LAST_PLANNED_MICROS.compare_exchange_weak(
            previous,
            candidate,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return now + chrono::Duration::microseconds(candidate - now_micros),
            Err(actual) => previous = actual,
        }
    }
}

/// Computes artifact names and paths. Never touches the filesystem.
pub struct ExportPlanner;

impl ExportPlanner {
    pub fn plan(request: &ExportRequest, host_label: &str) -> ExportArtifact {
        Self::plan_at(request, host_label, next_timestamp())
    }

    pub fn plan_at(
        request: &ExportRequest,
        host_label: &str,
        created_at: DateTime<Local>,
    ) -> ExportArtifact {
        let file_name = Self::file_name(
            &created_at,
            host_label,
            request.database.as_deref(),
            !request.tables.is_empty(),
        );
        ExportArtifact {
            path: request.destination_dir.join(&file_name),
            file_name,
            scope: request.scope(),
            created_at,
        }
    }

    pub fn file_name(
        created_at: &DateTime<Local>,
        host_label: &str,
        database: Option<&str>,
        has_tables: bool,
    ) -> String {
        let mut name = format!(
            "{}_{}_",
            created_at.format(TIMESTAMP_FORMAT),
            sanitize_label(host_label)
        );
        // Without a database the table segment is dropped as well.
        if let Some(db) = database.filter(|db| !db.is_empty()) {
            name.push_str(db);
            name.push('_');
            if has_tables {
                name.push_str("tables_");
            }
        }
        name.push_str(ARTIFACT_SUFFIX);
        name
    }
}

/// Socket-directory hosts contain path separators; keep the name a single path component.
fn sanitize_label(label: &str) -> String {
    label.replace(['/', '\\'], "_")
}
