//! Admin tool: maintenance commands and server settings
//!
//! Maintenance statements cannot run inside a transaction block, so they
//! always execute on the pool executor regardless of any live sessions.

use async_trait::async_trait;
use serde_json::{Value, json};

use pgward_protocol::ident::{qualified_identifier, sanitize_identifier};
use pgward_protocol::request::{
    AnalyzeParams, ReindexParams, ReindexTarget, SettingsGetParams, SettingsSetParams,
    VacuumParams,
};
use pgward_protocol::{GatewayError, GatewayResult};
use pgward_session::ExecuteOptions;

use super::{ActionHandler, HandlerContext, parse_params, to_result};

fn maintenance_target(
    table: &Option<String>,
    schema: &Option<String>,
) -> GatewayResult<Option<String>> {
    match (table, schema) {
        (Some(table), Some(schema)) => Ok(Some(qualified_identifier(schema, table)?)),
        (Some(table), None) => Ok(Some(sanitize_identifier(table)?)),
        (None, Some(_)) => Err(GatewayError::InvalidParameters(
            "schema may only be given together with table".to_string(),
        )),
        (None, None) => Ok(None),
    }
}

/// `admin.vacuum`
pub struct VacuumHandler;

#[async_trait]
impl ActionHandler for VacuumHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: VacuumParams = parse_params(params)?;

        let mut sql = String::from("VACUUM");
        let mut flags = Vec::new();
        if p.options.full {
            flags.push("FULL");
        }
        if p.options.analyze {
            flags.push("ANALYZE");
        }
        if !flags.is_empty() {
            sql.push_str(&format!(" ({})", flags.join(", ")));
        }
        if let Some(target) = maintenance_target(&p.table, &p.schema)? {
            sql.push(' ');
            sql.push_str(&target);
        }

        ctx.resolver
            .pool()
            .execute(&sql, &[], &ExecuteOptions::default())
            .await?;
        Ok(json!({ "command": sql }))
    }
}

/// `admin.analyze`
pub struct AnalyzeHandler;

#[async_trait]
impl ActionHandler for AnalyzeHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: AnalyzeParams = parse_params(params)?;

        let mut sql = String::from("ANALYZE");
        if let Some(target) = maintenance_target(&p.table, &p.schema)? {
            sql.push(' ');
            sql.push_str(&target);
        }

        ctx.resolver
            .pool()
            .execute(&sql, &[], &ExecuteOptions::default())
            .await?;
        Ok(json!({ "command": sql }))
    }
}

/// `admin.reindex`: a concrete target is mandatory; database-wide reindex
/// is rejected before anything reaches the server.
pub struct ReindexHandler;

#[async_trait]
impl ActionHandler for ReindexHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: ReindexParams = parse_params(params)?;
        let name = p
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::InvalidParameters(
                    "reindex requires a non-empty table or index name".to_string(),
                )
            })?;
        let keyword = match p.target {
            ReindexTarget::Table => "TABLE",
            ReindexTarget::Index => "INDEX",
        };
        let sql = format!("REINDEX {keyword} {}", sanitize_identifier(name)?);

        ctx.resolver
            .pool()
            .execute(&sql, &[], &ExecuteOptions::default())
            .await?;
        Ok(json!({ "command": sql }))
    }
}

/// `admin.settings_get`
pub struct SettingsGetHandler;

#[async_trait]
impl ActionHandler for SettingsGetHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: SettingsGetParams = parse_params(params)?;
        let executor = ctx.resolver.resolve(None)?;
        let outcome = match p.name {
            Some(name) => {
                executor
                    .execute(
                        "SELECT name, setting, unit, short_desc \
                         FROM pg_settings WHERE name = $1",
                        &[json!(name)],
                        &ExecuteOptions::default(),
                    )
                    .await?
            }
            None => {
                executor
                    .execute(
                        "SELECT name, setting, unit, short_desc \
                         FROM pg_settings ORDER BY name",
                        &[],
                        &ExecuteOptions::default(),
                    )
                    .await?
            }
        };
        to_result(&outcome)
    }
}

/// `admin.settings_set`: the one write-marked admin action; runs through
/// the resolver so a session-scoped change lands on that session's
/// connection.
pub struct SettingsSetHandler;

#[async_trait]
impl ActionHandler for SettingsSetHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: SettingsSetParams = parse_params(params)?;
        let executor = ctx.resolver.resolve(p.session_id.as_deref())?;
        executor
            .execute(
                "SELECT set_config($1, $2, false) AS value",
                &[json!(p.name), json!(p.value)],
                &ExecuteOptions::default(),
            )
            .await?;
        Ok(json!({ "name": p.name, "value": p.value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_target_rejects_schema_without_table() {
        assert!(maintenance_target(&None, &Some("public".to_string())).is_err());
        assert_eq!(maintenance_target(&None, &None).unwrap(), None);
        assert_eq!(
            maintenance_target(&Some("users".to_string()), &Some("app".to_string())).unwrap(),
            Some("\"app\".\"users\"".to_string())
        );
    }
}
