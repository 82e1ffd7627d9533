//! Session entries, leases, and the per-session turn guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use beacon_common::SessionId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::ThreadHandle;

/// Held for the whole of one turn; dropping it releases the session.
pub type TurnGuard = OwnedMutexGuard<()>;

/// One cached session: its thread plus expiry bookkeeping.
pub struct SessionEntry {
    thread_id: String,
    metadata: Mutex<HashMap<String, String>>,
    created_at: Instant,
    expires_at: Mutex<Instant>,
    turn_lock: Arc<AsyncMutex<()>>,
}

impl SessionEntry {
    pub(crate) fn new(handle: ThreadHandle, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            thread_id: handle.id,
            metadata: Mutex::new(handle.metadata),
            created_at: now,
            expires_at: Mutex::new(now + ttl),
            turn_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Snapshot of the thread handle, including current metadata.
    pub fn handle(&self) -> ThreadHandle {
        ThreadHandle {
            id: self.thread_id.clone(),
            metadata: lock(&self.metadata).clone(),
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        *lock(&self.expires_at)
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    pub(crate) fn touch(&self, ttl: Duration) {
        *lock(&self.expires_at) = Instant::now() + ttl;
    }

    pub(crate) fn set_private(&self, name: &str, value: &str) {
        lock(&self.metadata).insert(crate::private_key(name), value.to_string());
    }

    /// Whether a turn currently holds this session.
    pub fn is_busy(&self) -> bool {
        self.turn_lock.try_lock().is_err()
    }

    pub(crate) fn try_lock_turn(&self) -> Option<TurnGuard> {
        self.turn_lock.clone().try_lock_owned().ok()
    }

    pub(crate) async fn lock_turn(&self) -> TurnGuard {
        self.turn_lock.clone().lock_owned().await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A borrowed session for the duration of one turn or operation.
#[derive(Clone)]
pub struct SessionLease {
    session_id: SessionId,
    entry: Arc<SessionEntry>,
    cached: bool,
}

impl SessionLease {
    pub(crate) fn new(session_id: SessionId, entry: Arc<SessionEntry>, cached: bool) -> Self {
        Self {
            session_id,
            entry,
            cached,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn thread_id(&self) -> &str {
        self.entry.thread_id()
    }

    pub fn handle(&self) -> ThreadHandle {
        self.entry.handle()
    }

    /// False for one-shot threads created without a session id.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn entry(&self) -> &Arc<SessionEntry> {
        &self.entry
    }

    /// Wait until no other turn holds this session.
    pub async fn lock_turn(&self) -> TurnGuard {
        self.entry.lock_turn().await
    }

    pub(crate) fn set_private(&self, name: &str, value: &str) {
        self.entry.set_private(name, value);
    }
}
