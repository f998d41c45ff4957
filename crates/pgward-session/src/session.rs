//! Session-backed executor
//!
//! Owns exactly one checked-out connection for the lifetime of one
//! transaction. Statements serialize on the connection mutex: concurrent
//! calls against the same session are legal but never parallel, which is
//! also what PostgreSQL would enforce on the wire.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Connection;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use tokio::sync::Mutex;
use tracing::debug;

use pgward_protocol::{GatewayError, GatewayResult, QueryOutcome};

use crate::executor::{CloseMode, ExecuteOptions, QueryExecutor};
use crate::values::run_statement;

/// An executor pinned to a single dedicated connection.
pub struct SessionExecutor {
    conn: Mutex<Option<PoolConnection<Postgres>>>,
}

impl SessionExecutor {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }
}

#[async_trait]
impl QueryExecutor for SessionExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        opts: &ExecuteOptions,
    ) -> GatewayResult<QueryOutcome> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| GatewayError::Internal("session connection already closed".into()))?;
        run_statement(conn, sql, params, opts).await
    }

    /// Already pinned; deriving a session from a session is the identity.
    async fn derive_session(self: Arc<Self>) -> GatewayResult<Arc<dyn QueryExecutor>> {
        Ok(self)
    }

    async fn close(&self, mode: CloseMode) -> GatewayResult<()> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        match mode {
            CloseMode::Return => drop(conn),
            CloseMode::Destroy => {
                // Detach so the pool never sees this connection again, then
                // terminate it. Teardown failures are not actionable.
                if let Err(err) = conn.detach().close().await {
                    debug!("session connection teardown: {err}");
                }
            }
        }
        Ok(())
    }
}
