//! Transaction tool: the client-held session state machine
//!
//! `begin` rents a dedicated connection out of the registry; `commit` and
//! `rollback` end it destructively. A statement failure mid-transaction
//! leaves the session open so the caller can still roll back; the TTL
//! reaper is the backstop for callers that never do.

use async_trait::async_trait;
use serde_json::{Value, json};

use pgward_protocol::ident::sanitize_identifier;
use pgward_protocol::request::{BeginParams, SavepointParams, SessionRefParams};
use pgward_protocol::{GatewayError, GatewayResult};
use pgward_session::ExecuteOptions;

use super::{ActionHandler, HandlerContext, parse_params};

/// `transaction.begin`
pub struct BeginHandler;

#[async_trait]
impl ActionHandler for BeginHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: BeginParams = parse_params(params)?;

        let mut statement = String::from("BEGIN");
        if let Some(level) = p.options.isolation {
            statement.push_str(" ISOLATION LEVEL ");
            statement.push_str(level.as_sql());
        }
        if p.options.read_only {
            statement.push_str(" READ ONLY");
        }

        let sessions = ctx.resolver.sessions();
        let (session_id, executor) = sessions.begin().await?;

        // A failed BEGIN must not leak a registry entry.
        if let Err(err) = executor
            .execute(&statement, &[], &ExecuteOptions::default())
            .await
        {
            sessions.close(&session_id, "begin failed").await;
            return Err(err);
        }

        Ok(json!({ "session_id": session_id }))
    }
}

/// `transaction.commit`
pub struct CommitHandler;

#[async_trait]
impl ActionHandler for CommitHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: SessionRefParams = parse_params(params)?;
        let session_id = p
            .session_id
            .ok_or(GatewayError::MissingSessionId("transaction.commit"))?;

        let executor = ctx.resolver.sessions().get(&session_id)?;
        // A failed COMMIT leaves the session open; the caller may still
        // inspect state and roll back explicitly.
        executor
            .execute("COMMIT", &[], &ExecuteOptions::default())
            .await?;
        ctx.resolver.sessions().close(&session_id, "commit").await;

        Ok(json!({ "session_id": session_id, "committed": true }))
    }
}

/// `transaction.rollback`
pub struct RollbackHandler;

#[async_trait]
impl ActionHandler for RollbackHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: SessionRefParams = parse_params(params)?;
        let session_id = p
            .session_id
            .ok_or(GatewayError::MissingSessionId("transaction.rollback"))?;

        let executor = ctx.resolver.sessions().get(&session_id)?;
        let result = executor
            .execute("ROLLBACK", &[], &ExecuteOptions::default())
            .await;
        // Even a failed ROLLBACK ends the session: nothing recoverable
        // remains on that connection.
        ctx.resolver.sessions().close(&session_id, "rollback").await;
        result?;

        Ok(json!({ "session_id": session_id, "rolled_back": true }))
    }
}

/// `transaction.savepoint` / `transaction.release`
pub struct SavepointHandler {
    release: bool,
}

impl SavepointHandler {
    pub fn savepoint() -> Self {
        Self { release: false }
    }

    pub fn release() -> Self {
        Self { release: true }
    }
}

#[async_trait]
impl ActionHandler for SavepointHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: SavepointParams = parse_params(params)?;
        let action = if self.release {
            "transaction.release"
        } else {
            "transaction.savepoint"
        };
        let session_id = p.session_id.ok_or(GatewayError::MissingSessionId(action))?;
        let name = sanitize_identifier(&p.name)?;

        let statement = if self.release {
            format!("RELEASE SAVEPOINT {name}")
        } else {
            format!("SAVEPOINT {name}")
        };
        let executor = ctx.resolver.sessions().get(&session_id)?;
        executor
            .execute(&statement, &[], &ExecuteOptions::default())
            .await?;

        Ok(json!({ "session_id": session_id, "savepoint": p.name }))
    }
}

/// `transaction.list`
pub struct ListHandler;

#[async_trait]
impl ActionHandler for ListHandler {
    async fn handle(&self, ctx: &HandlerContext, _params: Value) -> GatewayResult<Value> {
        let sessions: Vec<Value> = ctx
            .resolver
            .sessions()
            .list()
            .into_iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "idle_seconds": s.idle.as_secs(),
                    "expires_in_seconds": s.expires_in.as_secs(),
                })
            })
            .collect();
        Ok(json!({ "sessions": sessions }))
    }
}
