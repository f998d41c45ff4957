//! Session-echo decoration
//!
//! Reads outside a transaction need no reminder; mutations should always
//! remind the caller which transaction they ran in (or that they ran in
//! none), and near-expiry reminders prevent silent data loss when the
//! reaper fires.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use pgward_protocol::response::format_duration;
use pgward_protocol::{AccessMode, ActiveSession, ToolAction};
use pgward_session::{SessionManager, SessionSnapshot};

/// Sessions with less remaining lifetime than this get a warning hint on
/// every response that references them.
const EXPIRY_WARNING: Duration = Duration::from_secs(5 * 60);

/// Decide whether the response carries an `active_session` block.
pub(crate) fn decorate(
    action: ToolAction,
    params: &Value,
    result: &Value,
    sessions: &Arc<SessionManager>,
) -> Option<ActiveSession> {
    if action == ToolAction::TxBegin {
        // The new session id lives in the result, not the params.
        let id = result.get("session_id")?.as_str()?;
        let snapshot = sessions.peek(id)?;
        return Some(block(
            snapshot,
            "use this session_id for subsequent operations".to_string(),
        ));
    }

    let id = params.get("session_id")?.as_str()?;
    let snapshot = sessions.peek(id)?;
    let near_expiry = snapshot.expires_in < EXPIRY_WARNING;
    if action.mode() != AccessMode::Write && !near_expiry {
        return None;
    }

    let hint = if near_expiry {
        "expiring soon; commit or roll back shortly".to_string()
    } else {
        format!("active transaction: {id}")
    };
    Some(block(snapshot, hint))
}

fn block(snapshot: SessionSnapshot, hint: String) -> ActiveSession {
    ActiveSession {
        id: snapshot.id,
        idle_for: format_duration(snapshot.idle),
        expires_in: format_duration(snapshot.expires_in),
        hint,
    }
}
