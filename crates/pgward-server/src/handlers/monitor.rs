//! Monitor tool: read-only observability over pg_stat views

use async_trait::async_trait;
use serde_json::{Value, json};

use pgward_protocol::GatewayResult;
use pgward_protocol::request::TableStatsParams;
use pgward_session::ExecuteOptions;

use super::{ActionHandler, HandlerContext, parse_params, to_result};

/// `monitor.activity`
pub struct ActivityHandler;

#[async_trait]
impl ActionHandler for ActivityHandler {
    async fn handle(&self, ctx: &HandlerContext, _params: Value) -> GatewayResult<Value> {
        let outcome = ctx
            .resolver
            .resolve(None)?
            .execute(
                "SELECT pid, usename AS user_name, datname AS database, state, query, \
                        wait_event_type, wait_event, backend_start, state_change \
                 FROM pg_stat_activity \
                 WHERE datname = current_database() \
                 ORDER BY backend_start",
                &[],
                &ExecuteOptions::default(),
            )
            .await?;
        to_result(&outcome)
    }
}

/// `monitor.locks`
pub struct LocksHandler;

#[async_trait]
impl ActionHandler for LocksHandler {
    async fn handle(&self, ctx: &HandlerContext, _params: Value) -> GatewayResult<Value> {
        let outcome = ctx
            .resolver
            .resolve(None)?
            .execute(
                "SELECT l.locktype, l.mode, l.granted, \
                        l.relation::regclass::text AS relation, \
                        a.pid, a.usename AS user_name, a.query \
                 FROM pg_locks l \
                 LEFT JOIN pg_stat_activity a ON a.pid = l.pid \
                 ORDER BY a.pid",
                &[],
                &ExecuteOptions::default(),
            )
            .await?;
        to_result(&outcome)
    }
}

/// `monitor.table_stats`
pub struct TableStatsHandler;

#[async_trait]
impl ActionHandler for TableStatsHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: TableStatsParams = parse_params(params)?;
        let schema_bind = p.schema.as_deref().map_or(Value::Null, |s| json!(s));
        let outcome = ctx
            .resolver
            .resolve(None)?
            .execute(
                "SELECT schemaname AS schema, relname AS table_name, \
                        seq_scan, idx_scan, n_live_tup, n_dead_tup, \
                        pg_total_relation_size(relid) AS total_bytes \
                 FROM pg_stat_user_tables \
                 WHERE ($1::text IS NULL OR schemaname = $1) \
                 ORDER BY pg_total_relation_size(relid) DESC",
                &[schema_bind],
                &ExecuteOptions::default(),
            )
            .await?;
        to_result(&outcome)
    }
}

/// `monitor.database_size`
pub struct DatabaseSizeHandler;

#[async_trait]
impl ActionHandler for DatabaseSizeHandler {
    async fn handle(&self, ctx: &HandlerContext, _params: Value) -> GatewayResult<Value> {
        let outcome = ctx
            .resolver
            .resolve(None)?
            .execute(
                "SELECT current_database() AS database, \
                        pg_database_size(current_database()) AS bytes, \
                        pg_size_pretty(pg_database_size(current_database())) AS size",
                &[],
                &ExecuteOptions::default(),
            )
            .await?;
        to_result(&outcome)
    }
}
