//! Database session lifecycle: bounded-retry connect, query helpers, explicit close.
//!
//! A [`ConnectionHandle`] wraps exactly one server session. Every operation
//! takes `&mut self`, so a handle cannot be shared between concurrent callers
//! without external synchronisation.

pub mod rows;

use backon::{ConstantBuilder, Retryable};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::errors::{ConnectionError, QueryError};
pub use rows::RowMap;

const APPLICATION_NAME: &str = "pgopstool";

/// Why a single connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Authentication was rejected (SQLSTATE class 28).
    Credentials,
    /// The server could not be reached, or the transport broke.
    Network,
    /// Anything else: unknown database, bad options, protocol errors.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct ConnectFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ConnectFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn classify(err: &sqlx::Error) -> Self {
        let kind = match err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // invalid_password, invalid_authorization_specification
                Some("28P01") | Some("28000") => FailureKind::Credentials,
                _ => FailureKind::Fatal,
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => FailureKind::Network,
            _ => FailureKind::Fatal,
        };
        Self::new(kind, err.to_string())
    }

    pub fn is_retryable(&self, retry_on_network_errors: bool) -> bool {
        match self.kind {
            FailureKind::Credentials => true,
            FailureKind::Network => retry_on_network_errors,
            FailureKind::Fatal => false,
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} failure: {}", self.kind, self.message)
    }
}

/// Runs `attempt` up to `config.retry()` times, sleeping `config.retry_delay()` between tries.
///
/// Only retryable failures (see [`ConnectFailure::is_retryable`]) are retried.
pub async fn connect_with_retry<T, F, Fut>(
    config: &ConnectionConfig,
    mut attempt: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectFailure>>,
{
    let max_attempts = config.retry().max(1);
    let policy = ConstantBuilder::default()
        .with_delay(config.retry_delay())
        .with_max_times((max_attempts - 1) as usize);
    let attempts = Cell::new(0u32);

    let result = (|| {
        attempts.set(attempts.get() + 1);
        attempt()
    })
    .retry(policy)
    .when(|failure: &ConnectFailure| failure.is_retryable(config.retry_on_network_errors()))
    .notify(|failure: &ConnectFailure, delay: Duration| {
        warn!(
            host = %config.host(),
            database = %config.database(),
            attempt = attempts.get(),
            max_attempts,
            "connection attempt failed ({}), retrying in {:?}",
            failure,
            delay
        );
    })
    .await;

    result.map_err(|failure| {
        if failure.is_retryable(config.retry_on_network_errors()) {
            ConnectionError::RetriesExhausted {
                host: config.host().to_string(),
                port: config.port(),
                database: config.database().to_string(),
                attempts: attempts.get(),
                last_error: failure.message,
            }
        } else {
            ConnectionError::Unavailable {
                host: config.host().to_string(),
                port: config.port(),
                database: config.database().to_string(),
                reason: failure.message,
            }
        }
    })
}

async fn connect_once(config: &ConnectionConfig) -> Result<PgConnection, ConnectFailure> {
    let mut options = PgConnectOptions::new()
        .host(config.host())
        .port(config.port())
        .database(config.database())
        .username(config.user())
        .application_name(APPLICATION_NAME);
    if config.has_password() {
        options = options.password(config.password());
    }
    PgConnection::connect_with(&options)
        .await
        .map_err(|e| ConnectFailure::classify(&e))
}

/// A live session against one database. Closed handles reject every operation.
pub struct ConnectionHandle {
    conn: Option<PgConnection>,
    host: String,
    database: String,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("open", &self.is_open())
            .finish()
    }
}

impl ConnectionHandle {
    pub async fn open(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let conn = connect_with_retry(config, || connect_once(config)).await?;
        info!(
            host = %config.host(),
            port = config.port(),
            database = %config.database(),
            user = %config.user(),
            "connection established"
        );
        Ok(Self {
            conn: Some(conn),
            host: config.host().to_string(),
            database: config.database().to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub(crate) fn connection(&mut self) -> Result<&mut PgConnection, ConnectionError> {
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(ConnectionError::Closed {
                host: self.host.clone(),
                database: self.database.clone(),
            }),
        }
    }

    pub(crate) fn statement_error(&self, statement: &str, source: sqlx::Error) -> QueryError {
        QueryError::Statement {
            host: self.host.clone(),
            database: self.database.clone(),
            statement: statement.to_string(),
            source,
        }
    }

    /// Executes a statement and returns the number of affected rows.
    pub async fn try_execute(&mut self, statement: &str) -> Result<u64, QueryError> {
        let result = self.connection()?.execute(statement).await;
        match result {
            Ok(done) => Ok(done.rows_affected()),
            Err(source) => Err(self.statement_error(statement, source)),
        }
    }

    /// Like [`try_execute`](Self::try_execute), but a failing statement is logged
    /// and reported as `None`. A closed handle is still an error.
    pub async fn execute(&mut self, statement: &str) -> Result<Option<u64>, ConnectionError> {
        degrade(self.try_execute(statement).await)
    }

    pub async fn try_query_all(&mut self, statement: &str) -> Result<Vec<RowMap>, QueryError> {
        let result = self.connection()?.fetch_all(statement).await;
        match result {
            Ok(rows) => Ok(rows.iter().map(rows::row_to_map).collect()),
            Err(source) => Err(self.statement_error(statement, source)),
        }
    }

    /// Like [`try_query_all`](Self::try_query_all), degrading query failures to no rows.
    pub async fn query_all(&mut self, statement: &str) -> Result<Vec<RowMap>, ConnectionError> {
        Ok(degrade(self.try_query_all(statement).await)?.unwrap_or_default())
    }

    /// Releases the session. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            match conn.close().await {
                Ok(()) => debug!(host = %self.host, database = %self.database, "connection closed"),
                Err(e) => warn!(
                    host = %self.host,
                    database = %self.database,
                    error = %e,
                    "connection did not close cleanly"
                ),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn closed(host: &str, database: &str) -> Self {
        Self {
            conn: None,
            host: host.to_string(),
            database: database.to_string(),
        }
    }
}

/// Query failures are logged and become `None`; connection failures propagate.
pub(crate) fn degrade<T>(result: Result<T, QueryError>) -> Result<Option<T>, ConnectionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(QueryError::Connection(e)) => Err(e),
        Err(QueryError::Statement {
            host,
            database,
            statement,
            source,
        }) => {
            warn!(
                host = %host,
                database = %database,
                error = %source,
                "statement failed: {}",
                statement.trim()
            );
            Ok(None)
        }
    }
}

/// Owns the configuration and at most one live handle.
pub struct ConnectionManager {
    config: ConnectionConfig,
    handle: Option<ConnectionHandle>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the live handle, connecting first when none is open.
    pub async fn open(&mut self) -> Result<&mut ConnectionHandle, ConnectionError> {
        let live = matches!(&self.handle, Some(handle) if handle.is_open());
        if !live {
            self.handle = Some(ConnectionHandle::open(&self.config).await?);
        }
        self.handle()
    }

    pub fn handle(&mut self) -> Result<&mut ConnectionHandle, ConnectionError> {
        match self.handle.as_mut() {
            Some(handle) if handle.is_open() => Ok(handle),
            _ => Err(ConnectionError::Closed {
                host: self.config.host().to_string(),
                database: self.config.database().to_string(),
            }),
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close().await;
        }
    }
}
