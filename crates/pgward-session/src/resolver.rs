//! Executor resolution
//!
//! The single point higher layers call to turn an optional session id into
//! an executor. Neither the pool nor individual session executors are
//! visible above this.

use std::sync::Arc;

use pgward_protocol::GatewayResult;

use crate::executor::QueryExecutor;
use crate::manager::SessionManager;

#[derive(Clone)]
pub struct ExecutorResolver {
    pool: Arc<dyn QueryExecutor>,
    sessions: Arc<SessionManager>,
}

impl ExecutorResolver {
    pub fn new(pool: Arc<dyn QueryExecutor>, sessions: Arc<SessionManager>) -> Self {
        Self { pool, sessions }
    }

    /// No session id → the shared pool. A session id → that session's
    /// executor, with its TTL refreshed; unknown or expired ids fail with
    /// `UnknownSession`.
    pub fn resolve(&self, session_id: Option<&str>) -> GatewayResult<Arc<dyn QueryExecutor>> {
        match session_id {
            None => Ok(Arc::clone(&self.pool)),
            Some(id) => self.sessions.get(id),
        }
    }

    /// The shared pool executor, for handlers that must run outside any
    /// transaction (maintenance commands, stateless batches).
    pub fn pool(&self) -> &Arc<dyn QueryExecutor> {
        &self.pool
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }
}
