//! Query tool: read, write, explain, and stateless atomic batches

use async_trait::async_trait;
use serde_json::{Value, json};

use pgward_protocol::request::{BatchParams, ExplainOptions, ExplainParams, ReadParams, WriteParams};
use pgward_protocol::{GatewayError, GatewayResult};
use pgward_session::{CloseMode, ExecuteOptions};

use super::{ActionHandler, HandlerContext, parse_params, to_result};

/// `query.read`: one statement on the resolved executor.
pub struct ReadHandler;

#[async_trait]
impl ActionHandler for ReadHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: ReadParams = parse_params(params)?;
        let executor = ctx.resolver.resolve(p.session_id.as_deref())?;
        let outcome = executor
            .execute(&p.sql, &p.params, &ExecuteOptions::from(&p.options))
            .await?;
        to_result(&outcome)
    }
}

/// `query.write`: one mutating statement. The safety gate has already run;
/// this handler only executes and reports.
pub struct WriteHandler;

#[async_trait]
impl ActionHandler for WriteHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: WriteParams = parse_params(params)?;
        let executor = ctx.resolver.resolve(p.session_id.as_deref())?;
        let outcome = executor
            .execute(&p.sql, &p.params, &ExecuteOptions::from(&p.options))
            .await?;
        Ok(json!({
            "command": leading_keyword(&p.sql),
            "row_count": outcome.row_count,
            // RETURNING clauses produce rows like any read.
            "rows": outcome.rows,
            "fields": outcome.fields,
        }))
    }
}

/// `query.explain`: prefix the statement with an EXPLAIN clause list.
pub struct ExplainHandler;

#[async_trait]
impl ActionHandler for ExplainHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: ExplainParams = parse_params(params)?;
        let sql = format!("{} {}", explain_prefix(&p.options)?, p.sql);
        let executor = ctx.resolver.resolve(p.session_id.as_deref())?;
        let outcome = executor
            .execute(
                &sql,
                &p.params,
                &ExecuteOptions {
                    statement_timeout: p.options.timeout_ms.map(std::time::Duration::from_millis),
                },
            )
            .await?;
        to_result(&outcome)
    }
}

/// `query.transaction`: an atomic batch on a private session. The session
/// never enters the registry and is destroyed on every exit path; callers
/// wanting a reusable transaction use `transaction.begin`.
pub struct BatchHandler;

#[async_trait]
impl ActionHandler for BatchHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: BatchParams = parse_params(params)?;
        if p.operations.is_empty() {
            return Err(GatewayError::InvalidParameters(
                "operations must contain at least one statement".to_string(),
            ));
        }

        let session = ctx.resolver.pool().clone().derive_session().await?;
        let opts = ExecuteOptions::default();

        if let Err(err) = session.execute("BEGIN", &[], &opts).await {
            let _ = session.close(CloseMode::Destroy).await;
            return Err(err);
        }

        let mut row_counts = Vec::with_capacity(p.operations.len());
        for (index, op) in p.operations.iter().enumerate() {
            match session.execute(&op.sql, &op.params, &opts).await {
                Ok(outcome) => row_counts.push(outcome.row_count),
                Err(err) => {
                    // Best effort: the connection may already be unusable.
                    let _ = session.execute("ROLLBACK", &[], &opts).await;
                    let _ = session.close(CloseMode::Destroy).await;
                    return Err(batch_failure(index, err));
                }
            }
        }

        if let Err(err) = session.execute("COMMIT", &[], &opts).await {
            let _ = session.close(CloseMode::Destroy).await;
            return Err(err);
        }
        let _ = session.close(CloseMode::Destroy).await;

        Ok(json!({
            "committed": true,
            "operations": row_counts.len(),
            "row_counts": row_counts,
        }))
    }
}

/// Tag the failing ordinal onto the database error the caller sees.
fn batch_failure(index: usize, err: GatewayError) -> GatewayError {
    match err {
        GatewayError::Database { code, message } => GatewayError::Database {
            code,
            message: format!("operation {index} failed: {message}"),
        },
        other => other,
    }
}

/// Display-only command word for write responses. Never used for read/write
/// classification, which is by action identity.
fn leading_keyword(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

fn explain_prefix(options: &ExplainOptions) -> GatewayResult<String> {
    let mut clauses: Vec<String> = Vec::new();
    if options.analyze {
        clauses.push("ANALYZE".to_string());
    }
    if let Some(format) = &options.format {
        let upper = format.to_ascii_uppercase();
        match upper.as_str() {
            "TEXT" | "JSON" | "XML" | "YAML" => clauses.push(format!("FORMAT {upper}")),
            _ => {
                return Err(GatewayError::InvalidParameters(format!(
                    "unsupported explain format {format:?}; expected text, json, xml, or yaml"
                )));
            }
        }
    }
    Ok(if clauses.is_empty() {
        "EXPLAIN".to_string()
    } else {
        format!("EXPLAIN ({})", clauses.join(", "))
    })
}
