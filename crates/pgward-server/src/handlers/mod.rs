//! Action handler system
//!
//! One handler per `(tool, action)` pair, registered in a static table built
//! at construction. A handler translates its typed parameter record into
//! executor calls and returns a structured JSON result; it borrows an
//! executor for the duration of one call and never retains a connection
//! reference across calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use pgward_protocol::{GatewayError, GatewayResult, ToolAction};
use pgward_session::ExecutorResolver;

pub mod admin;
pub mod monitor;
pub mod query;
pub mod schema;
pub mod transaction;

/// Explicit dependencies passed to every handler call. No globals, no
/// task-local state.
pub struct HandlerContext {
    pub resolver: ExecutorResolver,
}

/// A single action's implementation.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value>;
}

/// Build the static `(tool, action)` → handler table.
pub fn build_registry() -> HashMap<ToolAction, Arc<dyn ActionHandler>> {
    use ToolAction::*;
    let mut table: HashMap<ToolAction, Arc<dyn ActionHandler>> = HashMap::new();

    table.insert(QueryRead, Arc::new(query::ReadHandler));
    table.insert(QueryWrite, Arc::new(query::WriteHandler));
    table.insert(QueryExplain, Arc::new(query::ExplainHandler));
    table.insert(QueryTransaction, Arc::new(query::BatchHandler));

    table.insert(SchemaList, Arc::new(schema::ListHandler));
    table.insert(SchemaDescribe, Arc::new(schema::DescribeHandler));
    table.insert(SchemaCreate, Arc::new(schema::DdlHandler::create()));
    table.insert(SchemaAlter, Arc::new(schema::DdlHandler::alter()));
    table.insert(SchemaDrop, Arc::new(schema::DdlHandler::drop()));

    table.insert(TxBegin, Arc::new(transaction::BeginHandler));
    table.insert(TxCommit, Arc::new(transaction::CommitHandler));
    table.insert(TxRollback, Arc::new(transaction::RollbackHandler));
    table.insert(TxSavepoint, Arc::new(transaction::SavepointHandler::savepoint()));
    table.insert(TxRelease, Arc::new(transaction::SavepointHandler::release()));
    table.insert(TxList, Arc::new(transaction::ListHandler));

    table.insert(AdminVacuum, Arc::new(admin::VacuumHandler));
    table.insert(AdminAnalyze, Arc::new(admin::AnalyzeHandler));
    table.insert(AdminReindex, Arc::new(admin::ReindexHandler));
    table.insert(AdminSettingsGet, Arc::new(admin::SettingsGetHandler));
    table.insert(AdminSettingsSet, Arc::new(admin::SettingsSetHandler));

    table.insert(MonitorActivity, Arc::new(monitor::ActivityHandler));
    table.insert(MonitorLocks, Arc::new(monitor::LocksHandler));
    table.insert(MonitorTableStats, Arc::new(monitor::TableStatsHandler));
    table.insert(MonitorDatabaseSize, Arc::new(monitor::DatabaseSizeHandler));

    table
}

/// Deserialize an action's typed parameter record at the boundary. An
/// absent params object is treated as empty so all-optional records parse.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> GatewayResult<T> {
    let params = match params {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|err| GatewayError::InvalidParameters(err.to_string()))
}

/// Serialize a handler's own result type. Failure here is a bug, not bad
/// caller input.
pub(crate) fn to_result<T: Serialize>(value: &T) -> GatewayResult<Value> {
    serde_json::to_value(value).map_err(|err| GatewayError::Internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_action() {
        use ToolAction::*;
        let table = build_registry();
        for action in [
            QueryRead,
            QueryWrite,
            QueryExplain,
            QueryTransaction,
            SchemaList,
            SchemaDescribe,
            SchemaCreate,
            SchemaAlter,
            SchemaDrop,
            TxBegin,
            TxCommit,
            TxRollback,
            TxSavepoint,
            TxRelease,
            TxList,
            AdminVacuum,
            AdminAnalyze,
            AdminReindex,
            AdminSettingsGet,
            AdminSettingsSet,
            MonitorActivity,
            MonitorLocks,
            MonitorTableStats,
            MonitorDatabaseSize,
        ] {
            assert!(table.contains_key(&action), "missing handler for {action:?}");
        }
    }

    #[test]
    fn null_params_parse_as_empty() {
        let parsed: pgward_protocol::request::BeginParams = parse_params(Value::Null).unwrap();
        assert!(parsed.options.isolation.is_none());
    }
}
