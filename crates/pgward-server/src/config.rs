//! Gateway configuration
//!
//! Plain values with sensible defaults; `from_env` overlays environment
//! variables for containerized deployments. Connection credentials live in
//! `DATABASE_URL` only; they are never logged.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// PostgreSQL connection URL (`DATABASE_URL`).
    pub database_url: String,
    /// Minimum pooled connections (`PGWARD_POOL_MIN`).
    pub pool_min: u32,
    /// Maximum pooled connections (`PGWARD_POOL_MAX`).
    pub pool_max: u32,
    /// Pool acquire timeout (`PGWARD_ACQUIRE_TIMEOUT_SECS`).
    pub acquire_timeout: Duration,
    /// Concurrent transaction session bound (`PGWARD_MAX_SESSIONS`).
    pub max_sessions: usize,
    /// Sliding idle TTL per session (`PGWARD_SESSION_TTL_SECS`).
    pub session_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/postgres".to_string(),
            pool_min: 2,
            pool_max: 10,
            acquire_timeout: Duration::from_secs(30),
            max_sessions: 10,
            session_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            pool_min: env_parse("PGWARD_POOL_MIN").unwrap_or(defaults.pool_min),
            pool_max: env_parse("PGWARD_POOL_MAX").unwrap_or(defaults.pool_max),
            acquire_timeout: env_parse("PGWARD_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            max_sessions: env_parse("PGWARD_MAX_SESSIONS").unwrap_or(defaults.max_sessions),
            session_ttl: env_parse("PGWARD_SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "unparseable configuration value ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.pool_min, 2);
        assert_eq!(config.pool_max, 10);
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
    }
}
