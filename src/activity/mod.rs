// pgopstool/src/activity/mod.rs
//! Read-only view of what the server is busy with.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::connection::{ConnectionHandle, ConnectionManager, degrade};
use crate::errors::{ConnectionError, QueryError};

/// Active backends, oldest-running query first.
pub const ACTIVE_SESSIONS_SQL: &str = r#"
    SELECT
        usename::text AS usename,
        pid,
        query_start,
        EXTRACT(EPOCH FROM (now() - query_start))::float8 AS runtime_secs,
        wait_event_type,
        state,
        query
    FROM pg_stat_activity
    WHERE usename::text <> ALL($1::text[])
      AND state = 'active'
    ORDER BY query_start ASC
"#;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ActivitySession {
    pub usename: Option<String>,
    pub pid: i32,
    pub query_start: Option<DateTime<Utc>>,
    pub runtime_secs: Option<f64>,
    pub wait_event_type: Option<String>,
    pub state: Option<String>,
    pub query: Option<String>,
}

impl fmt::Display for ActivitySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} user={} runtime={:.1}s wait={} query={}",
            self.pid,
            self.usename.as_deref().unwrap_or("-"),
            self.runtime_secs.unwrap_or_default(),
            self.wait_event_type.as_deref().unwrap_or("-"),
            self.query.as_deref().map(str::trim).unwrap_or_default()
        )
    }
}

pub struct ActivityMonitor;

impl ActivityMonitor {
    pub async fn try_active_sessions(
        handle: &mut ConnectionHandle,
        excluded_users: &[String],
    ) -> Result<Vec<ActivitySession>, QueryError> {
        let result = sqlx::query_as::<_, ActivitySession>(ACTIVE_SESSIONS_SQL)
            .bind(excluded_users.to_vec())
            .fetch_all(handle.connection()?)
            .await;
        result.map_err(|source| handle.statement_error(ACTIVE_SESSIONS_SQL, source))
    }

    /// Active sessions excluding `excluded_users`, ordered by query start.
    ///
    /// A failing query is logged and yields no sessions; a closed handle is an error.
    pub async fn active_sessions(
        handle: &mut ConnectionHandle,
        excluded_users: &[String],
    ) -> Result<Vec<ActivitySession>, ConnectionError> {
        let sessions = degrade(Self::try_active_sessions(handle, excluded_users).await)?;
        match sessions {
            Some(sessions) => {
                info!(
                    host = %handle.host(),
                    database = %handle.database(),
                    count = sessions.len(),
                    "active sessions"
                );
                Ok(sessions)
            }
            None => {
                warn!(host = %handle.host(), "activity query failed, reporting no sessions");
                Ok(Vec::new())
            }
        }
    }
}

/// Entry point for `activity`: logs every active session, oldest first.
pub async fn run_activity_flow(app_config: &AppConfig) -> Result<Vec<ActivitySession>> {
    let mut manager = ConnectionManager::new(app_config.connection.clone());
    let outcome = async {
        let handle = manager
            .open()
            .await
            .context("Cannot reach the database to inspect activity")?;
        let sessions =
            ActivityMonitor::active_sessions(handle, &app_config.activity.excluded_users).await?;
        for session in &sessions {
            info!("{}", session);
        }
        Ok::<_, anyhow::Error>(sessions)
    }
    .await;
    manager.close().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::connection::test_support::live_config;

    #[test]
    fn test_query_shape() {
        assert!(ACTIVE_SESSIONS_SQL.contains("state = 'active'"));
        assert!(ACTIVE_SESSIONS_SQL.contains("<> ALL($1::text[])"));
        assert!(ACTIVE_SESSIONS_SQL.trim_end().ends_with("ORDER BY query_start ASC"));
    }

    #[test]
    fn test_session_display() {
        let session = ActivitySession {
            usename: Some("app".to_string()),
            pid: 4242,
            query_start: None,
            runtime_secs: Some(12.34),
            wait_event_type: None,
            state: Some("active".to_string()),
            query: Some("  SELECT pg_sleep(60)\n".to_string()),
        };
        assert_eq!(
            session.to_string(),
            "pid=4242 user=app runtime=12.3s wait=- query=SELECT pg_sleep(60)"
        );
    }

    #[tokio::test]
    async fn test_closed_handle_is_an_error() {
        let mut handle = ConnectionHandle::closed("127.0.0.1", "postgres");
        let err = ActivityMonitor::active_sessions(&mut handle, &[]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Closed { .. }));
    }

    #[tokio::test]
    async fn test_excluded_account_is_filtered_out() -> anyhow::Result<()> {
        let Some(config) = live_config() else {
            return Ok(());
        };
        let user = config.user().to_string();
        let mut manager = ConnectionManager::new(config);
        let handle = manager.open().await?;

        // the monitor's own query is active while it runs
        let all = ActivityMonitor::active_sessions(handle, &[]).await?;
        assert!(all.iter().any(|s| s.usename.as_deref() == Some(user.as_str())));
        let starts: Vec<_> = all.iter().map(|s| s.query_start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);

        let filtered = ActivityMonitor::active_sessions(handle, &[user.clone()]).await?;
        assert!(filtered.iter().all(|s| s.usename.as_deref() != Some(user.as_str())));

        manager.close().await;
        Ok(())
    }
}
