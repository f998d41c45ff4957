//! Statement execution, parameter binding, and row decoding
//!
//! Shared by both executor implementations: the per-call sequence is
//! identical, only the connection lifetime differs. Parameters arrive as
//! JSON values and bind positionally; rows come back as JSON objects with a
//! field-description list carrying the server-reported type names.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Either, PgConnection, Postgres, Row, TypeInfo};
use tracing::debug;
use uuid::Uuid;

use pgward_protocol::{FieldDescription, GatewayError, GatewayResult, QueryOutcome};

use crate::executor::ExecuteOptions;

/// Map a driver error into the gateway taxonomy, keeping the SQLSTATE.
pub(crate) fn db_error(err: sqlx::Error) -> GatewayError {
    match &err {
        sqlx::Error::Database(db) => GatewayError::Database {
            code: db.code().map(|c| c.to_string()),
            message: db.message().to_string(),
        },
        _ => GatewayError::Database {
            code: None,
            message: err.to_string(),
        },
    }
}

/// Run one statement on `conn`, honoring the per-call timeout discipline:
/// set `statement_timeout` before, reset it after, and never let a failing
/// reset mask the primary result.
pub(crate) async fn run_statement(
    conn: &mut PgConnection,
    sql: &str,
    params: &[Value],
    opts: &ExecuteOptions,
) -> GatewayResult<QueryOutcome> {
    if let Some(timeout) = opts.statement_timeout {
        sqlx::query(&format!("SET statement_timeout = {}", timeout.as_millis()))
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
    }

    let result = fetch(&mut *conn, sql, params).await;

    if opts.statement_timeout.is_some() {
        // The connection may already be dead; the primary error wins.
        if let Err(err) = sqlx::query("SET statement_timeout = 0")
            .execute(&mut *conn)
            .await
        {
            debug!("statement_timeout reset failed: {err}");
        }
    }

    result
}

async fn fetch<'q>(
    conn: &mut PgConnection,
    sql: &'q str,
    params: &'q [Value],
) -> GatewayResult<QueryOutcome> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_json(query, param);
    }

    let mut rows: Vec<PgRow> = Vec::new();
    let mut rows_affected = 0u64;
    {
        let mut stream = query.fetch_many(&mut *conn);
        while let Some(item) = stream.try_next().await.map_err(db_error)? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => rows.push(row),
            }
        }
    }

    let fields = describe_fields(rows.first());
    let row_count = if rows.is_empty() {
        rows_affected
    } else {
        rows.len() as u64
    };
    let rows = rows.iter().map(|row| decode_row(row, &fields)).collect();

    Ok(QueryOutcome {
        rows,
        row_count,
        fields,
    })
}

/// Bind one JSON parameter positionally. Arrays and objects travel as JSONB;
/// a JSON null becomes a parameter-level NULL.
fn bind_json<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                // u64 beyond i64::MAX; let the server parse the literal
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => query.bind(value),
    }
}

fn describe_fields(first_row: Option<&PgRow>) -> Vec<FieldDescription> {
    first_row
        .map(|row| {
            row.columns()
                .iter()
                .map(|col| FieldDescription {
                    name: col.name().to_string(),
                    data_type: col.type_info().name().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn decode_row(row: &PgRow, fields: &[FieldDescription]) -> Value {
    let mut object = Map::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        object.insert(
            field.name.clone(),
            decode_column(row, index, &field.data_type),
        );
    }
    Value::Object(object)
}

/// Decode one column into JSON by the server-reported type name. Types
/// outside the table fall back to a text decode, and to NULL past that;
/// the caller still gets the rest of the row.
fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => opt(row.try_get::<Option<bool>, _>(index)).map_or(Value::Null, Value::Bool),
        "INT2" => opt(row.try_get::<Option<i16>, _>(index))
            .map_or(Value::Null, |v| Value::Number(v.into())),
        "INT4" | "OID" => opt(row.try_get::<Option<i32>, _>(index))
            .map_or(Value::Null, |v| Value::Number(v.into())),
        "INT8" => opt(row.try_get::<Option<i64>, _>(index))
            .map_or(Value::Null, |v| Value::Number(v.into())),
        "FLOAT4" => opt(row.try_get::<Option<f32>, _>(index))
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map_or(Value::Null, Value::Number),
        "FLOAT8" => opt(row.try_get::<Option<f64>, _>(index))
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number),
        // Rendered as a string to keep arbitrary precision intact.
        "NUMERIC" => opt(row.try_get::<Option<Decimal>, _>(index))
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            opt(row.try_get::<Option<String>, _>(index)).map_or(Value::Null, Value::String)
        }
        "UUID" => opt(row.try_get::<Option<Uuid>, _>(index))
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "JSON" | "JSONB" => {
            opt(row.try_get::<Option<Value>, _>(index)).unwrap_or(Value::Null)
        }
        "TIMESTAMPTZ" => opt(row.try_get::<Option<DateTime<Utc>>, _>(index))
            .map_or(Value::Null, |v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => opt(row.try_get::<Option<NaiveDateTime>, _>(index))
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(index))
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(index))
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "BYTEA" => opt(row.try_get::<Option<Vec<u8>>, _>(index))
            .map_or(Value::Null, |v| Value::String(BASE64.encode(v))),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => opt(row.try_get::<Option<Vec<String>>, _>(index))
            .map_or(Value::Null, |v| {
                Value::Array(v.into_iter().map(Value::String).collect())
            }),
        "INT4[]" => opt(row.try_get::<Option<Vec<i32>>, _>(index)).map_or(Value::Null, |v| {
            Value::Array(v.into_iter().map(|i| Value::Number(i.into())).collect())
        }),
        "INT8[]" => opt(row.try_get::<Option<Vec<i64>>, _>(index)).map_or(Value::Null, |v| {
            Value::Array(v.into_iter().map(|i| Value::Number(i.into())).collect())
        }),
        "VOID" => Value::Null,
        _ => opt(row.try_get::<Option<String>, _>(index)).map_or(Value::Null, Value::String),
    }
}

fn opt<T>(result: Result<Option<T>, sqlx::Error>) -> Option<T> {
    result.ok().flatten()
}
