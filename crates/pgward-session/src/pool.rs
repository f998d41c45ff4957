//! Pool-backed executor
//!
//! One pooled connection per call: acquire, run, release. Deriving a session
//! checks a connection out and hands it to a [`SessionExecutor`] that keeps
//! it for the lifetime of a transaction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use pgward_protocol::{GatewayResult, QueryOutcome};

use crate::executor::{CloseMode, ExecuteOptions, QueryExecutor};
use crate::session::SessionExecutor;
use crate::values::{db_error, run_statement};

/// Pool sizing and acquisition settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// The shared, process-wide executor for stateless statements.
pub struct PoolExecutor {
    pool: PgPool,
}

impl PoolExecutor {
    /// Connect to PostgreSQL and build the shared pool.
    pub async fn connect(database_url: &str, settings: PoolSettings) -> GatewayResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(db_error)?;

        info!(
            min = settings.min_connections,
            max = settings.max_connections,
            "connection pool ready"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool (test harnesses, embedded use).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for PoolExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        opts: &ExecuteOptions,
    ) -> GatewayResult<QueryOutcome> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let outcome = run_statement(&mut conn, sql, params, opts).await;
        // `conn` drops here and returns to the pool.
        outcome
    }

    async fn derive_session(self: Arc<Self>) -> GatewayResult<Arc<dyn QueryExecutor>> {
        let conn = self.pool.acquire().await.map_err(db_error)?;
        Ok(Arc::new(SessionExecutor::new(conn)))
    }

    async fn close(&self, _mode: CloseMode) -> GatewayResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
