use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IntakeError, Result};
use crate::schema::RecordType;
use crate::session::Session;

/// A session behind its per-user lock.
#[derive(Debug)]
pub struct SessionSlot {
    session: Session,
    /// Set once the slot has been removed from the registry. A task that was
    /// waiting on the lock must look the user up again.
    retired: bool,
}

type SessionCell = Arc<Mutex<SessionSlot>>;

/// Exclusive access to one user's session for the length of a turn.
///
/// Changes are made in place. Call [`SessionGuard::retire`] to have the
/// session removed when the guard is handed back to [`SessionStore::release`].
pub struct SessionGuard {
    cell: SessionCell,
    guard: OwnedMutexGuard<SessionSlot>,
}

impl SessionGuard {
    pub fn retire(&mut self) {
        self.guard.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.guard.retired
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.guard.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.guard.session
    }
}

/// Registry of live conversations, one per user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lock the user's session for one turn, creating it if absent.
    async fn acquire(&self, user_id: &str, now: DateTime<Utc>) -> Result<SessionGuard>;
    /// Hand a session back; retired sessions leave the registry.
    async fn release(&self, guard: SessionGuard) -> Result<()>;
    /// Copy of the user's session, waiting for any turn in progress.
    async fn get(&self, user_id: &str) -> Result<Option<Session>>;
    /// Remove sessions idle since before `cutoff`. Sessions locked by a turn
    /// in progress are skipped. Returns how many were removed.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    async fn len(&self) -> Result<usize>;
}

/// In-memory implementation of SessionStore
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, SessionCell>>,
    transcript_limit: usize,
}

impl InMemorySessionStore {
    pub fn new(transcript_limit: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            transcript_limit,
        }
    }

    fn cell(&self, user_id: &str, now: DateTime<Utc>) -> SessionCell {
        // The shard lock is released before the caller awaits the session lock.
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id = %user_id, "creating session");
                Arc::new(Mutex::new(SessionSlot {
                    session: Session::new(user_id, now, self.transcript_limit),
                    retired: false,
                }))
            })
            .clone()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(20)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, user_id: &str, now: DateTime<Utc>) -> Result<SessionGuard> {
        loop {
            let cell = self.cell(user_id, now);
            let guard = cell.clone().lock_owned().await;
            if !guard.retired {
                return Ok(SessionGuard { cell, guard });
            }
            drop(guard);
            self.sessions
                .remove_if(user_id, |_, current| Arc::ptr_eq(current, &cell));
        }
    }

    async fn release(&self, guard: SessionGuard) -> Result<()> {
        if guard.is_retired() {
            let SessionGuard { cell, guard } = guard;
            let user_id = guard.session.user_id.clone();
            drop(guard);
            self.sessions
                .remove_if(&user_id, |_, current| Arc::ptr_eq(current, &cell));
            debug!(user_id = %user_id, "session removed");
        }
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<Session>> {
        let Some(cell) = self.sessions.get(user_id).map(|entry| entry.clone()) else {
            return Ok(None);
        };
        let slot = cell.lock().await;
        Ok((!slot.retired).then(|| slot.session.clone()))
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut swept = 0;
        self.sessions.retain(|user_id, cell| {
            let Ok(mut slot) = cell.try_lock() else {
                debug!(user_id = %user_id, "session busy, skipping sweep");
                return true;
            };
            if slot.session.is_idle_since(cutoff) {
                slot.retired = true;
                swept += 1;
                return false;
            }
            true
        });
        if swept > 0 {
            info!(swept, remaining = self.sessions.len(), "swept idle sessions");
        }
        Ok(swept)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.sessions.len())
    }
}

/// A record accepted by a [`RecordStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record_id: String,
    pub user_id: String,
    pub record_type: RecordType,
    pub fields: Map<String, Value>,
    pub stored_at: DateTime<Utc>,
}

/// Durable destination for finished records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a record and return its id.
    async fn persist(
        &self,
        record_type: RecordType,
        fields: Map<String, Value>,
        user_id: &str,
    ) -> Result<String>;

    /// Most recent records first. Stores without read access return nothing.
    async fn list(&self, _user_id: &str) -> Result<Vec<StoredRecord>> {
        Ok(Vec::new())
    }
}

/// In-memory implementation of RecordStore
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Arc<DashMap<String, Vec<StoredRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn persist(
        &self,
        record_type: RecordType,
        fields: Map<String, Value>,
        user_id: &str,
    ) -> Result<String> {
        if user_id.is_empty() {
            return Err(IntakeError::Persistence("missing user id".to_string()));
        }
        let record = StoredRecord {
            record_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            record_type,
            fields,
            stored_at: Utc::now(),
        };
        let record_id = record.record_id.clone();
        self.records
            .entry(user_id.to_string())
            .or_default()
            .push(record);
        Ok(record_id)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredRecord>> {
        Ok(self
            .records
            .get(user_id)
            .map(|records| records.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConversationState;
    use chrono::Duration;

    #[tokio::test]
    async fn test_acquire_creates_and_reuses_session() {
        let store = InMemorySessionStore::default();
        let now = Utc::now();

        let guard = store.acquire("alice", now).await.unwrap();
        let session_id = guard.session_id.clone();
        store.release(guard).await.unwrap();

        let guard = store.acquire("alice", now).await.unwrap();
        assert_eq!(guard.session_id, session_id);
        store.release(guard).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retired_session_is_removed_on_release() {
        let store = InMemorySessionStore::default();
        let mut guard = store.acquire("alice", Utc::now()).await.unwrap();
        let first = guard.session_id.clone();
        guard.retire();
        store.release(guard).await.unwrap();

        assert!(store.get("alice").await.unwrap().is_none());
        let guard = store.acquire("alice", Utc::now()).await.unwrap();
        assert_ne!(guard.session_id, first);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle_unlocked_sessions() {
        let store = InMemorySessionStore::default();
        let old = Utc::now() - Duration::hours(30);

        for user in ["idle", "busy"] {
            let guard = store.acquire(user, old).await.unwrap();
            store.release(guard).await.unwrap();
        }
        let fresh = store.acquire("fresh", Utc::now()).await.unwrap();
        store.release(fresh).await.unwrap();

        // "busy" is mid-turn.
        let busy = store.acquire("busy", Utc::now()).await.unwrap();

        let swept = store
            .sweep_expired(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(swept, 1);
        assert!(store.get("idle").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());

        drop(busy);
        assert!(store.get("busy").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_waiter_on_swept_session_gets_a_fresh_one() {
        let store = Arc::new(InMemorySessionStore::default());
        let old = Utc::now() - Duration::hours(30);

        let mut guard = store.acquire("alice", old).await.unwrap();
        guard.transition(ConversationState::Greeting);
        let stale_id = guard.session_id.clone();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let guard = store.acquire("alice", Utc::now()).await.unwrap();
                (guard.session_id.clone(), guard.state())
            })
        };
        tokio::task::yield_now().await;

        // Simulate the sweep claiming the session as the turn ends.
        guard.retire();
        store.release(guard).await.unwrap();

        let (session_id, state) = waiter.await.unwrap();
        assert_ne!(session_id, stale_id);
        assert_eq!(state, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_second_turn_waits_for_the_same_session() {
        let store = Arc::new(InMemorySessionStore::default());
        let guard = store.acquire("alice", Utc::now()).await.unwrap();
        let session_id = guard.session_id.clone();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let guard = store.acquire("alice", Utc::now()).await.unwrap();
                let session_id = guard.session_id.clone();
                store.release(guard).await.unwrap();
                session_id
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(store.len().await.unwrap(), 1);

        store.release(guard).await.unwrap();
        assert_eq!(waiter.await.unwrap(), session_id);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_store_lists_newest_first() {
        let store = InMemoryRecordStore::new();
        let first = store
            .persist(RecordType::Symptom, Map::new(), "alice")
            .await
            .unwrap();
        let second = store
            .persist(RecordType::Treatment, Map::new(), "alice")
            .await
            .unwrap();

        let records = store.list("alice").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_id, second);
        assert_eq!(records[1].record_id, first);
        assert!(store.list("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_store_rejects_missing_user() {
        let store = InMemoryRecordStore::new();
        let err = store
            .persist(RecordType::Symptom, Map::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Persistence(_)));
    }
}
