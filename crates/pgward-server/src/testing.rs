//! Stub executors and harness for exercising the dispatcher without
//! PostgreSQL. Gateway logic (routing, safety, registry bookkeeping,
//! envelopes) is all observable through what the stubs record.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use pgward_protocol::{GatewayError, GatewayResult, QueryOutcome};
use pgward_session::{
    CloseMode, ExecuteOptions, ExecutorResolver, QueryExecutor, SessionManager,
};

use crate::dispatch::Dispatcher;

#[derive(Default)]
pub(crate) struct StubBehavior {
    /// Statements containing this substring fail with a stub database error.
    pub fail_on: Option<&'static str>,
}

pub(crate) struct StubExecutor {
    behavior: Arc<StubBehavior>,
    pub calls: Mutex<Vec<String>>,
    pub closed: Mutex<Option<CloseMode>>,
    pub children: Mutex<Vec<Arc<StubExecutor>>>,
}

impl StubExecutor {
    pub fn new(behavior: Arc<StubBehavior>) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
            children: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn child(&self, index: usize) -> Arc<StubExecutor> {
        self.children.lock().unwrap()[index].clone()
    }

    /// Statements seen by this executor and every derived session.
    pub fn all_statements(&self) -> Vec<String> {
        let mut statements = self.recorded();
        for child in self.children.lock().unwrap().iter() {
            statements.extend(child.recorded());
        }
        statements
    }
}

#[async_trait]
impl QueryExecutor for StubExecutor {
    async fn execute(
        &self,
        sql: &str,
        _params: &[Value],
        _opts: &ExecuteOptions,
    ) -> GatewayResult<QueryOutcome> {
        self.calls.lock().unwrap().push(sql.to_string());
        if let Some(pattern) = self.behavior.fail_on {
            if sql.contains(pattern) {
                return Err(GatewayError::Database {
                    code: Some("23505".to_string()),
                    message: format!("stub rejected: {sql}"),
                });
            }
        }
        Ok(QueryOutcome::default())
    }

    async fn derive_session(self: Arc<Self>) -> GatewayResult<Arc<dyn QueryExecutor>> {
        let child = StubExecutor::new(Arc::clone(&self.behavior));
        self.children.lock().unwrap().push(Arc::clone(&child));
        Ok(child)
    }

    async fn close(&self, mode: CloseMode) -> GatewayResult<()> {
        *self.closed.lock().unwrap() = Some(mode);
        Ok(())
    }
}

pub(crate) struct TestGateway {
    pub dispatcher: Dispatcher,
    pub pool: Arc<StubExecutor>,
    pub sessions: Arc<SessionManager>,
}

pub(crate) fn gateway(max_sessions: usize, ttl: Duration) -> TestGateway {
    gateway_with(StubBehavior::default(), max_sessions, ttl)
}

pub(crate) fn gateway_with(
    behavior: StubBehavior,
    max_sessions: usize,
    ttl: Duration,
) -> TestGateway {
    let pool = StubExecutor::new(Arc::new(behavior));
    let source: Arc<dyn QueryExecutor> = Arc::clone(&pool) as Arc<dyn QueryExecutor>;
    let sessions = SessionManager::new(Arc::clone(&source), max_sessions, ttl);
    let resolver = ExecutorResolver::new(source, Arc::clone(&sessions));
    TestGateway {
        dispatcher: Dispatcher::new(resolver),
        pool,
        sessions,
    }
}
