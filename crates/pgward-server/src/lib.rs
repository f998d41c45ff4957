//! # pgward
//!
//! A stateful PostgreSQL gateway for automated agents. Multiple concurrent
//! clients share one deployed instance; the gateway centralizes credentials,
//! pools connections, enforces a default-deny write policy, and brokers
//! multi-statement transactions for clients that cannot hold a database
//! connection themselves.
//!
//! The protocol transport (JSON-RPC framing, stdio/HTTP) lives outside this
//! crate: it parses requests into `(tool, action, params)` triples and calls
//! [`Gateway::dispatch`], which returns a structured [`Envelope`].
//!
//! ```rust,no_run
//! use pgward_server::{Gateway, GatewayConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), pgward_protocol::GatewayError> {
//! let gateway = Gateway::connect(GatewayConfig::from_env()).await?;
//!
//! let begun = gateway
//!     .dispatch("transaction", "begin", json!({}))
//!     .await?;
//! let session_id = begun.result["session_id"].as_str().unwrap().to_string();
//!
//! gateway
//!     .dispatch(
//!         "query",
//!         "write",
//!         json!({
//!             "sql": "INSERT INTO audit_log(entry) VALUES ($1)",
//!             "params": ["deploy started"],
//!             "session_id": session_id,
//!         }),
//!     )
//!     .await?;
//!
//! gateway
//!     .dispatch("transaction", "commit", json!({"session_id": session_id}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
mod envelope;
pub mod handlers;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use pgward_protocol::{Envelope, GatewayResult};
use pgward_session::{
    CloseMode, ExecutorResolver, PoolExecutor, QueryExecutor, SessionManager,
    pool::PoolSettings,
};

pub use config::GatewayConfig;
pub use dispatch::Dispatcher;

/// The assembled gateway: pool, session registry, reaper, and dispatcher.
pub struct Gateway {
    dispatcher: Dispatcher,
    pool: Arc<dyn QueryExecutor>,
    sessions: Arc<SessionManager>,
    reaper: tokio::task::JoinHandle<()>,
}

impl Gateway {
    /// Connect to PostgreSQL and assemble the gateway.
    pub async fn connect(config: GatewayConfig) -> GatewayResult<Self> {
        let pool: Arc<dyn QueryExecutor> = Arc::new(
            PoolExecutor::connect(
                &config.database_url,
                PoolSettings {
                    min_connections: config.pool_min,
                    max_connections: config.pool_max,
                    acquire_timeout: config.acquire_timeout,
                },
            )
            .await?,
        );
        let sessions = SessionManager::new(
            Arc::clone(&pool),
            config.max_sessions,
            config.session_ttl,
        );
        let reaper = sessions.spawn_reaper();
        let resolver = ExecutorResolver::new(Arc::clone(&pool), Arc::clone(&sessions));

        info!(
            max_sessions = config.max_sessions,
            session_ttl_secs = config.session_ttl.as_secs(),
            "gateway ready"
        );
        Ok(Self {
            dispatcher: Dispatcher::new(resolver),
            pool,
            sessions,
            reaper,
        })
    }

    /// The single inbound operation: route a parsed request to its handler
    /// and return the session-aware response envelope.
    pub async fn dispatch(
        &self,
        tool: &str,
        action: &str,
        params: Value,
    ) -> GatewayResult<Envelope> {
        self.dispatcher.dispatch(tool, action, params).await
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Orderly shutdown: stop the reaper, roll back and destroy every live
    /// session, then drain the pool.
    pub async fn shutdown(self) {
        self.reaper.abort();
        self.sessions.shutdown().await;
        if let Err(err) = self.pool.close(CloseMode::Destroy).await {
            warn!("pool teardown failed: {err}");
        }
        info!("gateway shut down");
    }
}

/// Install a stderr-only tracing subscriber (`RUST_LOG` filtered).
///
/// Stdout belongs to the protocol transport on stdio deployments; a single
/// stray line there corrupts the stream, so logs must never go anywhere
/// but stderr.
pub fn init_stderr_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
