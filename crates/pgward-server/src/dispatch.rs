//! Request dispatch
//!
//! The single inbound seam: resolve the `(tool, action)` pair against the
//! static table, run the safety gate for write-marked actions, invoke the
//! handler, and decorate the response with session metadata. Start and end
//! of every action are logged with duration and error category; errors pass
//! through unmodified.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use pgward_protocol::request::SafetyFields;
use pgward_protocol::{AccessMode, Envelope, GatewayError, GatewayResult, ToolAction};
use pgward_session::ExecutorResolver;

use crate::envelope::decorate;
use crate::handlers::{self, ActionHandler, HandlerContext};

pub struct Dispatcher {
    ctx: HandlerContext,
    handlers: HashMap<ToolAction, Arc<dyn ActionHandler>>,
}

impl Dispatcher {
    pub fn new(resolver: ExecutorResolver) -> Self {
        Self {
            ctx: HandlerContext { resolver },
            handlers: handlers::build_registry(),
        }
    }

    pub async fn dispatch(
        &self,
        tool: &str,
        action: &str,
        params: Value,
    ) -> GatewayResult<Envelope> {
        let started = Instant::now();
        debug!(tool, action, "action started");

        let result = self.run(tool, action, params).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(tool, action, elapsed_ms, "action completed"),
            Err(err) => warn!(
                tool,
                action,
                elapsed_ms,
                category = err.category(),
                "action failed: {err}"
            ),
        }
        result
    }

    async fn run(&self, tool: &str, action: &str, params: Value) -> GatewayResult<Envelope> {
        let entry = ToolAction::parse(tool, action)
            .ok_or_else(|| GatewayError::NotImplemented(format!("{tool}.{action}")))?;

        // The gate is a table lookup on the action marker, never an
        // inspection of SQL text. The batch action is exempt: it wraps its
        // operations in a transaction of its own, which is the intent the
        // gate exists to demand.
        if entry.mode() == AccessMode::Write && entry != ToolAction::QueryTransaction {
            enforce_write_intent(&params)?;
        }

        let handler = self
            .handlers
            .get(&entry)
            .ok_or_else(|| GatewayError::Internal(format!("no handler for {tool}.{action}")))?;
        let result = handler.handle(&self.ctx, params.clone()).await?;

        let active_session = decorate(entry, &params, &result, self.ctx.resolver.sessions());
        Ok(Envelope {
            result,
            active_session,
        })
    }
}

/// Default deny: a write must arrive with a claimed session or an explicit
/// autocommit admission, checked before any handler or database work.
fn enforce_write_intent(params: &Value) -> GatewayResult<()> {
    let fields: SafetyFields = match params {
        Value::Null => SafetyFields::default(),
        other => serde_json::from_value(other.clone())
            .map_err(|err| GatewayError::InvalidParameters(err.to_string()))?,
    };
    if fields.session_id.is_none() && !fields.autocommit {
        return Err(GatewayError::SafetyCheckFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubBehavior, gateway, gateway_with};
    use pgward_session::CloseMode;
    use serde_json::json;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(30 * 60);

    #[tokio::test]
    async fn unknown_pairs_are_not_implemented() {
        let gw = gateway(4, TTL);
        let err = gw
            .dispatcher
            .dispatch("query", "truncate_everything", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn write_without_intent_is_denied_before_any_database_work() {
        let gw = gateway(4, TTL);
        let err = gw
            .dispatcher
            .dispatch("query", "write", json!({"sql": "INSERT INTO t VALUES (1)"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SafetyCheckFailed));
        assert!(gw.pool.all_statements().is_empty(), "no statement may run");
    }

    #[tokio::test]
    async fn ddl_and_settings_are_gated_too() {
        let gw = gateway(4, TTL);
        for (tool, action, params) in [
            (
                "schema",
                "create",
                json!({"target": "table", "name": "t", "definition": "id int"}),
            ),
            (
                "admin",
                "settings_set",
                json!({"name": "work_mem", "value": "64MB"}),
            ),
        ] {
            let err = gw.dispatcher.dispatch(tool, action, params).await.unwrap_err();
            assert!(matches!(err, GatewayError::SafetyCheckFailed), "{tool}.{action}");
        }
        assert!(gw.pool.all_statements().is_empty());
    }

    #[tokio::test]
    async fn autocommit_admits_a_single_write() {
        let gw = gateway(4, TTL);
        let envelope = gw
            .dispatcher
            .dispatch(
                "query",
                "write",
                json!({"sql": "INSERT INTO t VALUES (1)", "autocommit": true}),
            )
            .await
            .unwrap();
        assert_eq!(envelope.result["command"], "INSERT");
        // Autocommit runs on the pool; there is no session to echo.
        assert!(envelope.active_session.is_none());
        assert_eq!(gw.pool.recorded(), vec!["INSERT INTO t VALUES (1)".to_string()]);
    }

    #[tokio::test]
    async fn begin_hands_out_a_session_and_echoes_it() {
        let gw = gateway(4, TTL);
        let envelope = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();

        let session_id = envelope.result["session_id"].as_str().unwrap();
        assert!(!session_id.is_empty());

        let echo = envelope.active_session.expect("begin must echo the session");
        assert_eq!(echo.id, session_id);
        assert!(echo.hint.contains("use this session_id"));

        assert_eq!(gw.pool.child(0).recorded(), vec!["BEGIN".to_string()]);
    }

    #[tokio::test]
    async fn begin_applies_isolation_options() {
        let gw = gateway(4, TTL);
        gw.dispatcher
            .dispatch(
                "transaction",
                "begin",
                json!({"options": {"isolation": "serializable", "read_only": true}}),
            )
            .await
            .unwrap();
        assert_eq!(
            gw.pool.child(0).recorded(),
            vec!["BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_begin_leaks_no_session() {
        let gw = gateway_with(
            StubBehavior {
                fail_on: Some("BEGIN"),
            },
            4,
            TTL,
        );
        let err = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Database { .. }));
        assert_eq!(gw.sessions.session_count(), 0);
        assert_eq!(*gw.pool.child(0).closed.lock().unwrap(), Some(CloseMode::Destroy));
    }

    #[tokio::test]
    async fn writes_inside_a_session_echo_the_transaction() {
        let gw = gateway(4, TTL);
        let begun = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let session_id = begun.result["session_id"].as_str().unwrap().to_string();

        let envelope = gw
            .dispatcher
            .dispatch(
                "query",
                "write",
                json!({"sql": "INSERT INTO t VALUES (1)", "session_id": session_id}),
            )
            .await
            .unwrap();
        let echo = envelope.active_session.expect("writes echo their session");
        assert_eq!(echo.id, session_id);
        assert!(echo.hint.contains("active transaction"));

        // The statement ran on the session's pinned connection, not the pool.
        assert!(gw.pool.recorded().is_empty());
        assert_eq!(
            gw.pool.child(0).recorded(),
            vec!["BEGIN".to_string(), "INSERT INTO t VALUES (1)".to_string()]
        );
    }

    #[tokio::test]
    async fn reads_without_a_session_carry_no_echo() {
        let gw = gateway(4, TTL);
        let envelope = gw
            .dispatcher
            .dispatch("query", "read", json!({"sql": "SELECT 1"}))
            .await
            .unwrap();
        assert!(envelope.active_session.is_none());
    }

    #[tokio::test]
    async fn near_expiry_sessions_warn_on_any_reference() {
        // A TTL below the warning threshold makes every response near-expiry.
        let gw = gateway(4, Duration::from_secs(60));
        let begun = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let session_id = begun.result["session_id"].as_str().unwrap().to_string();

        let envelope = gw
            .dispatcher
            .dispatch(
                "query",
                "read",
                json!({"sql": "SELECT 1", "session_id": session_id}),
            )
            .await
            .unwrap();
        let echo = envelope.active_session.expect("near-expiry reads must warn");
        assert!(echo.hint.contains("expiring soon"));
    }

    #[tokio::test]
    async fn session_limit_is_surfaced() {
        let gw = gateway(1, TTL);
        gw.dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let err = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SessionLimitExceeded { limit: 1 }));
    }

    #[tokio::test]
    async fn commit_invalidates_the_session_id() {
        let gw = gateway(4, TTL);
        let begun = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let session_id = begun.result["session_id"].as_str().unwrap().to_string();

        let committed = gw
            .dispatcher
            .dispatch("transaction", "commit", json!({"session_id": session_id}))
            .await
            .unwrap();
        assert_eq!(committed.result["committed"], true);

        let child = gw.pool.child(0);
        assert_eq!(child.recorded(), vec!["BEGIN".to_string(), "COMMIT".to_string()]);
        assert_eq!(*child.closed.lock().unwrap(), Some(CloseMode::Destroy));

        let err = gw
            .dispatcher
            .dispatch(
                "query",
                "read",
                json!({"sql": "SELECT 1", "session_id": session_id}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn rollback_destroys_even_when_the_statement_fails() {
        let gw = gateway_with(
            StubBehavior {
                fail_on: Some("ROLLBACK"),
            },
            4,
            TTL,
        );
        let begun = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let session_id = begun.result["session_id"].as_str().unwrap().to_string();

        let err = gw
            .dispatcher
            .dispatch("transaction", "rollback", json!({"session_id": session_id}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Database { .. }));
        assert_eq!(gw.sessions.session_count(), 0);
        assert_eq!(*gw.pool.child(0).closed.lock().unwrap(), Some(CloseMode::Destroy));
    }

    #[tokio::test]
    async fn session_bound_actions_demand_an_id() {
        let gw = gateway(4, TTL);
        for action in ["commit", "rollback"] {
            let err = gw
                .dispatcher
                .dispatch("transaction", action, json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::MissingSessionId(_)), "{action}");
        }
        let err = gw
            .dispatcher
            .dispatch("transaction", "savepoint", json!({"name": "sp1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingSessionId(_)));
    }

    #[tokio::test]
    async fn savepoints_are_sanitized() {
        let gw = gateway(4, TTL);
        let begun = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let session_id = begun.result["session_id"].as_str().unwrap().to_string();

        gw.dispatcher
            .dispatch(
                "transaction",
                "savepoint",
                json!({"session_id": session_id, "name": "sp1"}),
            )
            .await
            .unwrap();
        assert!(
            gw.pool
                .child(0)
                .recorded()
                .contains(&"SAVEPOINT \"sp1\"".to_string())
        );

        let err = gw
            .dispatcher
            .dispatch(
                "transaction",
                "savepoint",
                json!({"session_id": session_id, "name": "sp1; DROP TABLE t"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn transaction_list_snapshots_live_sessions() {
        let gw = gateway(4, TTL);
        let begun = gw
            .dispatcher
            .dispatch("transaction", "begin", json!({}))
            .await
            .unwrap();
        let session_id = begun.result["session_id"].as_str().unwrap().to_string();

        let listed = gw
            .dispatcher
            .dispatch("transaction", "list", json!({}))
            .await
            .unwrap();
        let sessions = listed.result["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["id"], session_id);
    }

    #[tokio::test]
    async fn batch_commits_in_order_on_success() {
        let gw = gateway(4, TTL);
        let envelope = gw
            .dispatcher
            .dispatch(
                "query",
                "transaction",
                json!({"operations": [
                    {"sql": "INSERT INTO t(x) VALUES (1)"},
                    {"sql": "UPDATE t SET x = 2"},
                ]}),
            )
            .await
            .unwrap();
        assert_eq!(envelope.result["committed"], true);
        assert_eq!(envelope.result["operations"], 2);

        let child = gw.pool.child(0);
        assert_eq!(
            child.recorded(),
            vec![
                "BEGIN".to_string(),
                "INSERT INTO t(x) VALUES (1)".to_string(),
                "UPDATE t SET x = 2".to_string(),
                "COMMIT".to_string(),
            ]
        );
        // The private session never enters the registry and is destroyed.
        assert_eq!(gw.sessions.session_count(), 0);
        assert_eq!(*child.closed.lock().unwrap(), Some(CloseMode::Destroy));
    }

    #[tokio::test]
    async fn batch_failure_reports_the_ordinal_and_rolls_back() {
        let gw = gateway_with(
            StubBehavior {
                fail_on: Some("VALUES (2)"),
            },
            4,
            TTL,
        );
        let err = gw
            .dispatcher
            .dispatch(
                "query",
                "transaction",
                json!({"operations": [
                    {"sql": "INSERT INTO t(x) VALUES (1)"},
                    {"sql": "INSERT INTO t(x) VALUES (2)"},
                ]}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("operation 1 failed"), "{err}");

        let child = gw.pool.child(0);
        let statements = child.recorded();
        assert!(statements.contains(&"ROLLBACK".to_string()));
        assert!(!statements.contains(&"COMMIT".to_string()));
        assert_eq!(*child.closed.lock().unwrap(), Some(CloseMode::Destroy));
    }

    #[tokio::test]
    async fn empty_batches_are_invalid() {
        let gw = gateway(4, TTL);
        let err = gw
            .dispatcher
            .dispatch("query", "transaction", json!({"operations": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn explain_composes_its_prefix() {
        let gw = gateway(4, TTL);
        gw.dispatcher
            .dispatch(
                "query",
                "explain",
                json!({
                    "sql": "SELECT * FROM t",
                    "options": {"analyze": true, "format": "json"},
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            gw.pool.recorded(),
            vec!["EXPLAIN (ANALYZE, FORMAT JSON) SELECT * FROM t".to_string()]
        );
    }

    #[tokio::test]
    async fn ddl_builds_sanitized_statements() {
        let gw = gateway(4, TTL);
        gw.dispatcher
            .dispatch(
                "schema",
                "create",
                json!({
                    "target": "table",
                    "name": "users",
                    "schema": "app",
                    "definition": "id bigint PRIMARY KEY",
                    "options": {"if_not_exists": true},
                    "autocommit": true,
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            gw.pool.recorded(),
            vec!["CREATE TABLE IF NOT EXISTS \"app\".\"users\" (id bigint PRIMARY KEY)".to_string()]
        );
    }

    #[tokio::test]
    async fn reindex_demands_a_concrete_target() {
        let gw = gateway(4, TTL);
        let err = gw
            .dispatcher
            .dispatch("admin", "reindex", json!({"target": "table"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParameters(_)));
        assert!(gw.pool.recorded().is_empty());
    }

    #[tokio::test]
    async fn malformed_params_fail_at_the_boundary() {
        let gw = gateway(4, TTL);
        let err = gw
            .dispatcher
            .dispatch("query", "read", json!({"params": [1]}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParameters(_)));
        assert!(gw.pool.recorded().is_empty());
    }
}
