//! Response payloads and the session-echo envelope

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Column metadata attached to every query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescription {
    pub name: String,
    /// PostgreSQL type name as reported by the server (`INT8`, `TEXT`, ...).
    pub data_type: String,
}

/// The uniform result of one executed statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    /// Result rows as JSON objects keyed by column name.
    pub rows: Vec<Value>,
    /// Returned row count for reads, affected row count for writes.
    pub row_count: u64,
    pub fields: Vec<FieldDescription>,
}

/// Session metadata echoed back on mutating or near-expiry responses.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub id: String,
    /// Human-formatted time since the session was last used.
    pub idle_for: String,
    /// Human-formatted time until the TTL reaper fires.
    pub expires_in: String,
    pub hint: String,
}

/// What the dispatcher hands back to the transport layer.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_session: Option<ActiveSession>,
}

impl Envelope {
    pub fn bare(result: Value) -> Self {
        Self {
            result,
            active_session: None,
        }
    }
}

/// Render a duration the way a human reads a countdown: `"28m 45s"`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
