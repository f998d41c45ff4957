//! Schema tool: catalog introspection and sanitized DDL
//!
//! Introspection translates the target enum into system-catalog queries with
//! positional binds. DDL interpolates nothing but sanitized identifiers; the
//! `definition` clause passes through verbatim: column lists and view
//! bodies are too complex to safely reparse, and the caller is trusted with
//! them under the same policy that gates the action itself.

use async_trait::async_trait;
use serde_json::{Value, json};

use pgward_protocol::ident::{qualified_identifier, sanitize_identifier};
use pgward_protocol::request::{
    DdlOptions, DdlParams, DescribeParams, ListOptions, SchemaListParams, SchemaTarget,
};
use pgward_protocol::{GatewayError, GatewayResult};
use pgward_session::ExecuteOptions;

use super::{ActionHandler, HandlerContext, parse_params, to_result};

/// `schema.list`
pub struct ListHandler;

#[async_trait]
impl ActionHandler for ListHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: SchemaListParams = parse_params(params)?;
        let (sql, binds) = list_query(p.target, &p.schema, &p.table, &p.options)?;
        let executor = ctx.resolver.resolve(None)?;
        let outcome = executor
            .execute(&sql, &binds, &ExecuteOptions::default())
            .await?;
        to_result(&outcome)
    }
}

fn list_query(
    target: SchemaTarget,
    schema: &Option<String>,
    table: &Option<String>,
    options: &ListOptions,
) -> GatewayResult<(String, Vec<Value>)> {
    let schema_bind = schema.as_deref().map_or(Value::Null, |s| json!(s));
    let table_bind = table.as_deref().map_or(Value::Null, |t| json!(t));
    let page = |n: usize| format!("LIMIT ${} OFFSET ${}", n, n + 1);

    let query = match target {
        SchemaTarget::Schema => (
            format!(
                "SELECT schema_name \
                 FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
                 ORDER BY schema_name {}",
                page(1)
            ),
            vec![json!(options.limit), json!(options.offset)],
        ),
        SchemaTarget::Table => (
            format!(
                "SELECT table_schema, table_name \
                 FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' \
                   AND table_schema NOT IN ('pg_catalog', 'information_schema') \
                   AND ($1::text IS NULL OR table_schema = $1) \
                 ORDER BY table_schema, table_name {}",
                page(2)
            ),
            vec![schema_bind, json!(options.limit), json!(options.offset)],
        ),
        SchemaTarget::View => {
            let mut sql = String::from(
                "SELECT table_schema AS schema, table_name AS name, 'view' AS kind \
                 FROM information_schema.views \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
                   AND ($1::text IS NULL OR table_schema = $1)",
            );
            if options.include_materialized {
                sql.push_str(
                    " UNION ALL \
                     SELECT schemaname AS schema, matviewname AS name, \
                            'materialized view' AS kind \
                     FROM pg_matviews \
                     WHERE ($1::text IS NULL OR schemaname = $1)",
                );
            }
            sql.push_str(&format!(" ORDER BY 1, 2 {}", page(2)));
            (sql, vec![schema_bind, json!(options.limit), json!(options.offset)])
        }
        SchemaTarget::Function => (
            format!(
                "SELECT n.nspname AS schema, p.proname AS name, \
                        pg_get_function_identity_arguments(p.oid) AS arguments, \
                        CASE p.prokind \
                          WHEN 'a' THEN 'aggregate' \
                          WHEN 'w' THEN 'window' \
                          WHEN 'p' THEN 'procedure' \
                          ELSE 'function' \
                        END AS kind \
                 FROM pg_proc p \
                 JOIN pg_namespace n ON n.oid = p.pronamespace \
                 WHERE n.nspname NOT IN ('pg_catalog', 'information_schema') \
                   AND ($1::text IS NULL OR n.nspname = $1) \
                 ORDER BY n.nspname, p.proname {}",
                page(2)
            ),
            vec![schema_bind, json!(options.limit), json!(options.offset)],
        ),
        SchemaTarget::Trigger => (
            format!(
                "SELECT trigger_schema AS schema, trigger_name AS name, \
                        event_object_table AS table_name, \
                        action_timing, event_manipulation AS event \
                 FROM information_schema.triggers \
                 WHERE ($1::text IS NULL OR trigger_schema = $1) \
                   AND ($2::text IS NULL OR event_object_table = $2) \
                 ORDER BY trigger_schema, trigger_name {}",
                page(3)
            ),
            vec![
                schema_bind,
                table_bind,
                json!(options.limit),
                json!(options.offset),
            ],
        ),
        SchemaTarget::Sequence => (
            format!(
                "SELECT sequence_schema AS schema, sequence_name AS name, data_type \
                 FROM information_schema.sequences \
                 WHERE ($1::text IS NULL OR sequence_schema = $1) \
                 ORDER BY sequence_schema, sequence_name {}",
                page(2)
            ),
            vec![schema_bind, json!(options.limit), json!(options.offset)],
        ),
        SchemaTarget::Constraint => (
            format!(
                "SELECT tc.constraint_schema AS schema, tc.table_name, \
                        tc.constraint_name AS name, tc.constraint_type AS kind \
                 FROM information_schema.table_constraints tc \
                 WHERE ($1::text IS NULL OR tc.constraint_schema = $1) \
                   AND ($2::text IS NULL OR tc.table_name = $2) \
                 ORDER BY tc.constraint_schema, tc.table_name, tc.constraint_name {}",
                page(3)
            ),
            vec![
                schema_bind,
                table_bind,
                json!(options.limit),
                json!(options.offset),
            ],
        ),
        other => {
            return Err(GatewayError::NotImplemented(format!(
                "schema.list target '{}'",
                other.as_str()
            )));
        }
    };
    Ok(query)
}

/// `schema.describe`
pub struct DescribeHandler;

const DESCRIBE_COLUMNS_SQL: &str = "SELECT column_name AS name, data_type AS type, \
            is_nullable = 'YES' AS nullable, column_default AS default_value \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

const DESCRIBE_INDEXES_SQL: &str = "SELECT indexname AS name, indexdef AS definition \
     FROM pg_indexes \
     WHERE schemaname = $1 AND tablename = $2 \
     ORDER BY indexname";

#[async_trait]
impl ActionHandler for DescribeHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: DescribeParams = parse_params(params)?;
        if p.target != SchemaTarget::Table {
            return Err(GatewayError::NotImplemented(format!(
                "schema.describe target '{}'",
                p.target.as_str()
            )));
        }
        let schema = p.schema.unwrap_or_else(|| "public".to_string());

        // Resolving through the session id makes uncommitted tables visible.
        let executor = ctx.resolver.resolve(p.session_id.as_deref())?;
        let binds = vec![json!(schema), json!(p.name)];
        let columns = executor
            .execute(DESCRIBE_COLUMNS_SQL, &binds, &ExecuteOptions::default())
            .await?;
        let indexes = executor
            .execute(DESCRIBE_INDEXES_SQL, &binds, &ExecuteOptions::default())
            .await?;

        Ok(json!({
            "schema": schema,
            "name": p.name,
            "columns": columns.rows,
            "indexes": indexes.rows,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdlVerb {
    Create,
    Alter,
    Drop,
}

/// `schema.create` / `schema.alter` / `schema.drop`
pub struct DdlHandler {
    verb: DdlVerb,
}

impl DdlHandler {
    pub fn create() -> Self {
        Self { verb: DdlVerb::Create }
    }

    pub fn alter() -> Self {
        Self { verb: DdlVerb::Alter }
    }

    pub fn drop() -> Self {
        Self { verb: DdlVerb::Drop }
    }
}

#[async_trait]
impl ActionHandler for DdlHandler {
    async fn handle(&self, ctx: &HandlerContext, params: Value) -> GatewayResult<Value> {
        let p: DdlParams = parse_params(params)?;
        let sql = build_ddl(self.verb, &p)?;
        let executor = ctx.resolver.resolve(p.session_id.as_deref())?;
        executor.execute(&sql, &[], &ExecuteOptions::default()).await?;
        Ok(json!({
            "command": sql.split_whitespace().take(2).collect::<Vec<_>>().join(" "),
            "target": p.target.as_str(),
            "name": p.name,
        }))
    }
}

fn ddl_keyword(target: SchemaTarget) -> GatewayResult<&'static str> {
    match target {
        SchemaTarget::Table => Ok("TABLE"),
        SchemaTarget::Index => Ok("INDEX"),
        SchemaTarget::View => Ok("VIEW"),
        SchemaTarget::Schema => Ok("SCHEMA"),
        SchemaTarget::Sequence => Ok("SEQUENCE"),
        other => Err(GatewayError::NotImplemented(format!(
            "DDL target '{}'",
            other.as_str()
        ))),
    }
}

/// The object's quoted name. Tables, views, and sequences take an optional
/// schema prefix; schemas and index names stand alone.
fn ddl_name(target: SchemaTarget, name: &str, schema: &Option<String>) -> GatewayResult<String> {
    match (target, schema) {
        (SchemaTarget::Schema, _) => sanitize_identifier(name),
        (_, Some(schema)) => qualified_identifier(schema, name),
        (_, None) => sanitize_identifier(name),
    }
}

fn require_definition<'a>(p: &'a DdlParams, what: &str) -> GatewayResult<&'a str> {
    p.definition
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| {
            GatewayError::InvalidParameters(format!("{what} requires a definition clause"))
        })
}

fn build_ddl(verb: DdlVerb, p: &DdlParams) -> GatewayResult<String> {
    let keyword = ddl_keyword(p.target)?;
    let DdlOptions {
        if_exists,
        if_not_exists,
        cascade,
    } = p.options;

    let sql = match verb {
        DdlVerb::Create => {
            let exists_clause = if if_not_exists { "IF NOT EXISTS " } else { "" };
            match p.target {
                SchemaTarget::Table => {
                    let name = ddl_name(p.target, &p.name, &p.schema)?;
                    let definition = require_definition(p, "create table")?;
                    format!("CREATE TABLE {exists_clause}{name} ({definition})")
                }
                SchemaTarget::View => {
                    if if_not_exists {
                        return Err(GatewayError::InvalidParameters(
                            "if_not_exists is not supported for views".to_string(),
                        ));
                    }
                    let name = ddl_name(p.target, &p.name, &p.schema)?;
                    let definition = require_definition(p, "create view")?;
                    format!("CREATE VIEW {name} AS {definition}")
                }
                SchemaTarget::Index => {
                    // An index lives in its table's schema; only the index
                    // name itself is quoted here.
                    let name = sanitize_identifier(&p.name)?;
                    let definition = require_definition(p, "create index")?;
                    format!("CREATE INDEX {exists_clause}{name} ON {definition}")
                }
                SchemaTarget::Schema => {
                    let name = sanitize_identifier(&p.name)?;
                    format!("CREATE SCHEMA {exists_clause}{name}")
                }
                SchemaTarget::Sequence => {
                    let name = ddl_name(p.target, &p.name, &p.schema)?;
                    match p.definition.as_deref().filter(|d| !d.trim().is_empty()) {
                        Some(definition) => {
                            format!("CREATE SEQUENCE {exists_clause}{name} {definition}")
                        }
                        None => format!("CREATE SEQUENCE {exists_clause}{name}"),
                    }
                }
                _ => unreachable!("ddl_keyword rejected other targets"),
            }
        }
        DdlVerb::Alter => {
            let name = ddl_name(p.target, &p.name, &p.schema)?;
            let definition = require_definition(p, "alter")?;
            format!("ALTER {keyword} {name} {definition}")
        }
        DdlVerb::Drop => {
            let name = ddl_name(p.target, &p.name, &p.schema)?;
            let exists_clause = if if_exists { "IF EXISTS " } else { "" };
            let cascade_clause = if cascade { " CASCADE" } else { "" };
            format!("DROP {keyword} {exists_clause}{name}{cascade_clause}")
        }
    };
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ddl(target: SchemaTarget, name: &str) -> DdlParams {
        DdlParams {
            target,
            name: name.to_string(),
            schema: None,
            definition: None,
            options: DdlOptions::default(),
            session_id: None,
            autocommit: true,
        }
    }

    #[test]
    fn create_table_with_schema_and_guard() {
        let mut p = ddl(SchemaTarget::Table, "users");
        p.schema = Some("app".to_string());
        p.definition = Some("id bigint PRIMARY KEY, email text NOT NULL".to_string());
        p.options.if_not_exists = true;
        assert_eq!(
            build_ddl(DdlVerb::Create, &p).unwrap(),
            "CREATE TABLE IF NOT EXISTS \"app\".\"users\" (id bigint PRIMARY KEY, email text NOT NULL)"
        );
    }

    #[test]
    fn create_table_requires_definition() {
        let p = ddl(SchemaTarget::Table, "users");
        assert!(matches!(
            build_ddl(DdlVerb::Create, &p),
            Err(GatewayError::InvalidParameters(_))
        ));
    }

    #[test]
    fn create_index_keeps_definition_verbatim() {
        let mut p = ddl(SchemaTarget::Index, "users_email_idx");
        p.definition = Some("users (lower(email))".to_string());
        assert_eq!(
            build_ddl(DdlVerb::Create, &p).unwrap(),
            "CREATE INDEX \"users_email_idx\" ON users (lower(email))"
        );
    }

    #[test]
    fn drop_with_cascade_and_if_exists() {
        let mut p = ddl(SchemaTarget::View, "report");
        p.options.if_exists = true;
        p.options.cascade = true;
        assert_eq!(
            build_ddl(DdlVerb::Drop, &p).unwrap(),
            "DROP VIEW IF EXISTS \"report\" CASCADE"
        );
    }

    #[test]
    fn alter_table_passes_definition_through() {
        let mut p = ddl(SchemaTarget::Table, "users");
        p.definition = Some("ADD COLUMN age integer".to_string());
        assert_eq!(
            build_ddl(DdlVerb::Alter, &p).unwrap(),
            "ALTER TABLE \"users\" ADD COLUMN age integer"
        );
    }

    #[test]
    fn ddl_rejects_malicious_identifiers() {
        let mut p = ddl(SchemaTarget::Table, "users; DROP TABLE users--");
        p.definition = Some("id int".to_string());
        assert!(matches!(
            build_ddl(DdlVerb::Create, &p),
            Err(GatewayError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn ddl_rejects_unsupported_targets() {
        let p = ddl(SchemaTarget::Trigger, "t");
        assert!(matches!(
            build_ddl(DdlVerb::Drop, &p),
            Err(GatewayError::NotImplemented(_))
        ));
    }

    #[test]
    fn list_query_rejects_unsupported_targets() {
        let err = list_query(
            SchemaTarget::Index,
            &None,
            &None,
            &ListOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::NotImplemented(_)));
    }

    #[test]
    fn list_query_binds_pagination() {
        let (sql, binds) = list_query(
            SchemaTarget::Table,
            &Some("app".to_string()),
            &None,
            &ListOptions::default(),
        )
        .unwrap();
        assert!(sql.contains("LIMIT $2 OFFSET $3"));
        assert_eq!(binds.len(), 3);
        assert_eq!(binds[0], serde_json::json!("app"));
    }

    #[test]
    fn view_listing_includes_matviews_on_request() {
        let options = ListOptions {
            include_materialized: true,
            ..ListOptions::default()
        };
        let (sql, _) = list_query(SchemaTarget::View, &None, &None, &options).unwrap();
        assert!(sql.contains("pg_matviews"));
    }
}
