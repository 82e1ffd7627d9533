//! TTL and capacity bounded session-to-thread cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beacon_common::SessionId;
use beacon_config::schema::SessionConfig;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{AssistantApi, EngineError};

use super::types::{SessionEntry, SessionLease};

pub struct SessionStore {
    api: Arc<dyn AssistantApi>,
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
    create_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn AssistantApi>, ttl: Duration, capacity: usize) -> Self {
        Self {
            api,
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(api: Arc<dyn AssistantApi>, settings: &SessionConfig) -> Self {
        Self::new(api, Duration::from_secs(settings.ttl_secs), settings.capacity)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve the thread for `session_id`, creating one on a miss.
    ///
    /// Without a session id a fresh thread is created under a new random
    /// id and is not cached. A hit refreshes the entry's expiry. A failed
    /// creation caches nothing.
    pub async fn get_or_create_thread(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<SessionLease, EngineError> {
        let Some(session_id) = session_id else {
            let session_id = SessionId::new();
            let handle = self.create_remote(&session_id).await?;
            info!(session = %session_id, thread = %handle.id, "created one-shot thread");
            let entry = Arc::new(SessionEntry::new(handle, self.ttl));
            return Ok(SessionLease::new(session_id, entry, false));
        };

        if let Some(entry) = self.live_entry(&session_id).await {
            entry.touch(self.ttl);
            return Ok(SessionLease::new(session_id, entry, true));
        }

        let create_guard = self.create_lock.lock().await;

        // Another caller may have created it while we waited.
        if let Some(entry) = self.live_entry(&session_id).await {
            entry.touch(self.ttl);
            return Ok(SessionLease::new(session_id, entry, true));
        }

        let handle = self.create_remote(&session_id).await?;
        info!(session = %session_id, thread = %handle.id, "created thread");
        let entry = Arc::new(SessionEntry::new(handle, self.ttl));

        let retired = {
            let mut entries = self.entries.write().await;
            let mut retired = Vec::new();
            if let Some(stale) = entries.remove(&session_id) {
                retired.push(stale);
            }
            while entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at())
                    .map(|(id, _)| id.clone());
                let Some(oldest) = oldest else { break };
                if let Some(evicted) = entries.remove(&oldest) {
                    debug!(session = %oldest, "evicting session at capacity");
                    retired.push(evicted);
                }
            }
            entries.insert(session_id.clone(), entry.clone());
            retired
        };
        drop(create_guard);

        for stale in retired {
            self.retire(stale).await;
        }
        Ok(SessionLease::new(session_id, entry, true))
    }

    /// Cached, unexpired session without creating or refreshing anything.
    pub async fn lookup(&self, session_id: &SessionId) -> Option<SessionLease> {
        self.live_entry(session_id)
            .await
            .map(|entry| SessionLease::new(session_id.clone(), entry, true))
    }

    /// Drop the mapping and delete the remote thread once any in-flight
    /// turn on it has finished. Returns whether the session was cached.
    pub async fn remove_thread(&self, session_id: &SessionId) -> bool {
        let entry = self.entries.write().await.remove(session_id);
        let Some(entry) = entry else {
            return false;
        };
        let _turn = entry.lock_turn().await;
        info!(session = %session_id, thread = %entry.thread_id(), "removing session");
        self.delete_remote(entry.thread_id()).await;
        true
    }

    /// Remove expired sessions and delete their threads. Sessions with a
    /// turn in flight are left for a later pass.
    pub async fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let reaped = {
            let mut entries = self.entries.write().await;
            let expired: Vec<SessionId> = entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();

            let mut reaped = Vec::new();
            for id in expired {
                let Some(guard) = entries.get(&id).and_then(|e| e.try_lock_turn()) else {
                    debug!(session = %id, "expired session busy, skipping");
                    continue;
                };
                if let Some(entry) = entries.remove(&id) {
                    reaped.push((id, entry, guard));
                }
            }
            reaped
        };

        for (id, entry, _guard) in &reaped {
            info!(session = %id, thread = %entry.thread_id(), "reaping expired session");
            self.delete_remote(entry.thread_id()).await;
        }
        reaped.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn live_entry(&self, session_id: &SessionId) -> Option<Arc<SessionEntry>> {
        let entries = self.entries.read().await;
        entries
            .get(session_id)
            .filter(|e| !e.is_expired(Instant::now()))
            .cloned()
    }

    async fn create_remote(&self, session_id: &SessionId) -> Result<crate::ThreadHandle, EngineError> {
        self.api
            .create_thread()
            .await
            .map_err(|e| EngineError::SessionUnavailable {
                session_id: session_id.to_string(),
                source: Box::new(e),
            })
    }

    /// Delete a thread whose mapping is gone. If a turn still holds it,
    /// deletion waits in the background until that turn ends.
    async fn retire(&self, entry: Arc<SessionEntry>) {
        if let Some(_turn) = entry.try_lock_turn() {
            self.delete_remote(entry.thread_id()).await;
            return;
        }

        let api = self.api.clone();
        tokio::spawn(async move {
            let _turn = entry.lock_turn().await;
            if let Err(e) = api.delete_thread(entry.thread_id()).await {
                warn!(thread = %entry.thread_id(), error = %e, "failed to delete retired thread");
            }
        });
    }

    async fn delete_remote(&self, thread_id: &str) {
        if let Err(e) = self.api.delete_thread(thread_id).await {
            warn!(thread = %thread_id, error = %e, "failed to delete thread");
        }
    }
}
