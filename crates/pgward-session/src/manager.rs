//! Transaction session registry
//!
//! A bounded map of live session executors keyed by opaque id, with a
//! sliding TTL enforced by a timer queue. All registry mutation happens in
//! short critical sections under one lock that is never held across an
//! await; connection work (acquire, rollback, teardown) happens outside it.
//!
//! Expiry runs on a dedicated reaper task draining a [`DelayQueue`]:
//! rescheduling a session's deadline is O(log n) and no per-session task
//! ever sleeps. A timer entry that pops after the session was refreshed or
//! closed observes the registry state and re-arms or no-ops instead of
//! reaping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::{Duration, Instant};

use futures::future::poll_fn;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, info, warn};
use uuid::Uuid;

use pgward_protocol::{GatewayError, GatewayResult};

use crate::executor::{CloseMode, ExecuteOptions, QueryExecutor};

struct SessionEntry {
    executor: Arc<dyn QueryExecutor>,
    last_active: Instant,
    timer_key: Key,
}

struct Registry {
    entries: HashMap<String, SessionEntry>,
    timers: DelayQueue<String>,
}

/// Read-only view of one live session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: String,
    pub idle: Duration,
    pub expires_in: Duration,
}

/// Bounded registry of dedicated-connection sessions with sliding TTL.
pub struct SessionManager {
    source: Arc<dyn QueryExecutor>,
    max_sessions: usize,
    ttl: Duration,
    registry: Mutex<Registry>,
}

impl SessionManager {
    /// `source` is the executor sessions are derived from (the shared pool
    /// in production, a stub in tests).
    pub fn new(source: Arc<dyn QueryExecutor>, max_sessions: usize, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            source,
            max_sessions,
            ttl,
            registry: Mutex::new(Registry {
                entries: HashMap::new(),
                timers: DelayQueue::new(),
            }),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new session: enforce the bound, pin a connection, register,
    /// arm the expiry timer. The bound is re-checked atomically with the
    /// insert; a `begin` that lost the race destroys its fresh connection.
    pub async fn begin(&self) -> GatewayResult<(String, Arc<dyn QueryExecutor>)> {
        if self.registry.lock().unwrap().entries.len() >= self.max_sessions {
            return Err(GatewayError::SessionLimitExceeded {
                limit: self.max_sessions,
            });
        }

        let executor = Arc::clone(&self.source).derive_session().await?;
        let id = Uuid::now_v7().to_string();

        let admitted = {
            let mut registry = self.registry.lock().unwrap();
            if registry.entries.len() >= self.max_sessions {
                false
            } else {
                let timer_key = registry.timers.insert(id.clone(), self.ttl);
                registry.entries.insert(
                    id.clone(),
                    SessionEntry {
                        executor: Arc::clone(&executor),
                        last_active: Instant::now(),
                        timer_key,
                    },
                );
                true
            }
        };

        if !admitted {
            if let Err(err) = executor.close(CloseMode::Destroy).await {
                debug!(session = %id, "discarding over-limit connection: {err}");
            }
            return Err(GatewayError::SessionLimitExceeded {
                limit: self.max_sessions,
            });
        }

        debug!(session = %id, "transaction session opened");
        Ok((id, executor))
    }

    /// Look up a session, refreshing its activity timestamp and rescheduling
    /// the expiry timer before the executor is handed out; a concurrent
    /// reaper pass cannot fire on a session that was just refreshed.
    pub fn get(&self, id: &str) -> GatewayResult<Arc<dyn QueryExecutor>> {
        let mut registry = self.registry.lock().unwrap();
        let Registry { entries, timers } = &mut *registry;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| GatewayError::UnknownSession(id.to_string()))?;
        entry.last_active = Instant::now();
        timers.try_remove(&entry.timer_key);
        entry.timer_key = timers.insert(id.to_string(), self.ttl);
        Ok(Arc::clone(&entry.executor))
    }

    /// Remove a session and destroy its connection. Idempotent; teardown
    /// errors are logged, never propagated; by the time close is called the
    /// caller has already committed or rolled back.
    pub async fn close(&self, id: &str, reason: &str) {
        let removed = {
            let mut registry = self.registry.lock().unwrap();
            let Registry { entries, timers } = &mut *registry;
            entries.remove(id).map(|entry| {
                timers.try_remove(&entry.timer_key);
                entry.executor
            })
        };
        let Some(executor) = removed else {
            return;
        };
        if let Err(err) = executor.close(CloseMode::Destroy).await {
            warn!(session = %id, reason, "session teardown failed: {err}");
        } else {
            info!(session = %id, reason, "session closed");
        }
    }

    /// Snapshot of all live sessions. Read-only: no TTL refresh.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let registry = self.registry.lock().unwrap();
        registry
            .entries
            .iter()
            .map(|(id, entry)| self.snapshot(id, entry))
            .collect()
    }

    /// Read-only view of one session, if live. No TTL refresh.
    pub fn peek(&self, id: &str) -> Option<SessionSnapshot> {
        let registry = self.registry.lock().unwrap();
        registry.entries.get(id).map(|entry| self.snapshot(id, entry))
    }

    pub fn session_count(&self) -> usize {
        self.registry.lock().unwrap().entries.len()
    }

    fn snapshot(&self, id: &str, entry: &SessionEntry) -> SessionSnapshot {
        let idle = entry.last_active.elapsed();
        SessionSnapshot {
            id: id.to_string(),
            idle,
            expires_in: self.ttl.saturating_sub(idle),
        }
    }

    /// Start the expiry reaper. One task serves the whole registry.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let due = manager.wait_expired().await;
                for id in due {
                    manager.reap(&id).await;
                }
            }
        })
    }

    /// Wait until at least one timer entry pops. The delay queue registers
    /// the task's waker on every poll, so inserts from `begin`/`get` wake
    /// the reaper even after the queue ran empty.
    async fn wait_expired(&self) -> Vec<String> {
        poll_fn(|cx| {
            let mut registry = self.registry.lock().unwrap();
            let mut due = Vec::new();
            while let Poll::Ready(Some(expired)) = registry.timers.poll_expired(cx) {
                due.push(expired.into_inner());
            }
            if due.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(due)
            }
        })
        .await
    }

    /// Handle one popped timer entry. The session may have been closed or
    /// refreshed between the pop and this lock; only a genuinely idle entry
    /// is reaped.
    async fn reap(&self, id: &str) {
        let executor = {
            let mut registry = self.registry.lock().unwrap();
            let Registry { entries, timers } = &mut *registry;
            match entries.get_mut(id) {
                None => None,
                Some(entry) => {
                    let idle = entry.last_active.elapsed();
                    if idle < self.ttl {
                        entry.timer_key = timers.insert(id.to_string(), self.ttl - idle);
                        None
                    } else {
                        entries.remove(id).map(|entry| entry.executor)
                    }
                }
            }
        };
        let Some(executor) = executor else {
            return;
        };

        info!(session = %id, "session expired; rolling back");
        // Best effort: the connection may already be broken.
        if let Err(err) = executor
            .execute("ROLLBACK", &[], &ExecuteOptions::default())
            .await
        {
            debug!(session = %id, "rollback on expiry failed: {err}");
        }
        if let Err(err) = executor.close(CloseMode::Destroy).await {
            debug!(session = %id, "teardown on expiry failed: {err}");
        }
    }

    /// Orderly shutdown: roll back and destroy every live session.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<dyn QueryExecutor>)> = {
            let mut registry = self.registry.lock().unwrap();
            let Registry { entries, timers } = &mut *registry;
            timers.clear();
            entries.drain().map(|(id, e)| (id, e.executor)).collect()
        };
        for (id, executor) in drained {
            if let Err(err) = executor
                .execute("ROLLBACK", &[], &ExecuteOptions::default())
                .await
            {
                debug!(session = %id, "rollback on shutdown failed: {err}");
            }
            if let Err(err) = executor.close(CloseMode::Destroy).await {
                debug!(session = %id, "teardown on shutdown failed: {err}");
            }
            info!(session = %id, "session closed on shutdown");
        }
    }
}
