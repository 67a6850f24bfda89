use std::path::PathBuf;
use thiserror::Error;

/// Failures while acquiring or using a database session.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(
        "gave up connecting to {host}:{port}/{database} after {attempts} attempt(s): {last_error}"
    )]
    RetriesExhausted {
        host: String,
        port: u16,
        database: String,
        attempts: u32,
        last_error: String,
    },

    #[error("connection to {host}/{database} is closed")]
    Closed { host: String, database: String },

    #[error("cannot connect to {host}:{port}/{database}: {reason}")]
    Unavailable {
        host: String,
        port: u16,
        database: String,
        reason: String,
    },
}

/// A statement failed server-side, or the handle could not run it.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("statement failed on {host}/{database}: {source}")]
    Statement {
        host: String,
        database: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Error, Debug)]
pub enum FileSystemError {
    #[error("destination directory {} does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("destination directory {} is not writable: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} does not exist", path.display())]
    MissingArtifact { path: PathBuf },
}

/// Failures of the external dump/restore tools.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{program} executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} was terminated before reporting an exit code")]
    Terminated { program: String },

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),
}

impl ToolError {
    /// Exit code reported by the tool, when it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ToolError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Raised when a restore is attempted for a scope whose pre-check did not validate.
#[derive(Error, Debug)]
#[error("pre-check for {scope} did not validate ({outcome}); refusing to restore")]
pub struct PreCheckRejected {
    pub scope: String,
    pub outcome: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    PreCheck(#[from] PreCheckRejected),

    #[error("statement for {scope_database} refused: session is connected to {session_database}")]
    DatabaseMismatch {
        scope_database: String,
        session_database: String,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
