//! The executor capability
//!
//! Handlers never see a pool or a raw connection; they see this trait. The
//! pool-backed and session-backed implementations differ only in connection
//! lifetime, which is exactly the difference the trait hides.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use pgward_protocol::request::StatementOptions;
use pgward_protocol::{GatewayResult, QueryOutcome};

/// What happens to an executor's connection(s) on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Hand the connection back to the shared pool. Only valid for the
    /// transient connection inside one-shot pool executions.
    Return,
    /// Physically terminate the connection. The required path at session end
    /// (commit, rollback, TTL expiry, error): a connection that has held a
    /// transaction may carry session-local settings, temp tables, or
    /// prepared statements, and must never reach another caller.
    Destroy,
}

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Server-side `statement_timeout` applied for the duration of the call.
    pub statement_timeout: Option<Duration>,
}

impl From<&StatementOptions> for ExecuteOptions {
    fn from(opts: &StatementOptions) -> Self {
        Self {
            statement_timeout: opts.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Capability to run SQL against PostgreSQL.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute one statement with positional `$n` parameters.
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        opts: &ExecuteOptions,
    ) -> GatewayResult<QueryOutcome>;

    /// Obtain an executor pinned to a single dedicated connection. The pool
    /// implementation checks a connection out and wraps it; a session
    /// executor is already pinned and returns itself.
    async fn derive_session(self: Arc<Self>) -> GatewayResult<Arc<dyn QueryExecutor>>;

    /// Release the executor's connection(s) according to `mode`. Idempotent.
    async fn close(&self, mode: CloseMode) -> GatewayResult<()>;
}

impl std::fmt::Debug for dyn QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn QueryExecutor>")
    }
}
