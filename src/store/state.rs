//! Durable session state: the open-session slot and the bounded history log.

use crate::core::session::{Session, SyncStatus};
use crate::store::backend::{FileBackend, KeyValueBackend, StoreError};
use crate::store::lock::{LockError, StateLock};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Key namespace shared by every record the tracker persists.
pub const STORE_NAMESPACE: &str = "geofence_session";

/// Maximum number of finalized sessions retained in history.
pub const HISTORY_CAP: usize = 100;

/// Typed view over a [`KeyValueBackend`].
///
/// The tracker is the only writer. Readers (stats, history display) may share
/// a clone and read concurrently; each read is a full snapshot.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn KeyValueBackend>,
    namespace: String,
    history_cap: usize,
}

impl StateStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self::with_namespace(backend, STORE_NAMESPACE)
    }

    /// Open the file store in `dir` for writing.
    ///
    /// Fails with [`LockError::Held`] while another process owns `dir`. Keep
    /// the returned lock alive for as long as a tracker writes to the store.
    pub fn open_exclusive(dir: &Path) -> Result<(Self, StateLock), LockError> {
        let lock = StateLock::acquire(dir)?;
        Ok((Self::new(Arc::new(FileBackend::new(dir))), lock))
    }

    pub fn with_namespace(backend: Arc<dyn KeyValueBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            history_cap: HISTORY_CAP,
        }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    fn active_key(&self) -> String {
        format!("{}.active_session", self.namespace)
    }

    fn history_key(&self) -> String {
        format!("{}.history", self.namespace)
    }

    /// Read the open-session slot.
    pub fn load_active(&self) -> Result<Option<Session>, StoreError> {
        match self.backend.get(&self.active_key())? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Replace the open-session slot.
    pub fn save_active(&self, session: &Session) -> Result<(), StoreError> {
        let value = serde_json::to_value(session)?;
        self.backend.set(&self.active_key(), value)
    }

    pub fn clear_active(&self) -> Result<(), StoreError> {
        self.backend.remove(&self.active_key())
    }

    /// Finalized sessions, most recent first.
    pub fn history(&self) -> Result<Vec<Session>, StoreError> {
        match self.backend.get(&self.history_key())? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Insert at the front of history, evicting the oldest entries past the cap.
    ///
    /// Returns the evicted sessions.
    pub fn append_history(&self, session: Session) -> Result<Vec<Session>, StoreError> {
        let mut history = self.history()?;
        history.insert(0, session);

        let evicted = if history.len() > self.history_cap {
            history.split_off(self.history_cap)
        } else {
            Vec::new()
        };

        self.write_history(&history)?;
        Ok(evicted)
    }

    /// Update the sync flag of a history entry. Returns `false` if the entry
    /// is no longer in history.
    pub fn set_sync_status(&self, id: Uuid, status: SyncStatus) -> Result<bool, StoreError> {
        let mut history = self.history()?;
        let Some(entry) = history.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if entry.sync_status == status {
            return Ok(true);
        }
        entry.sync_status = status;
        self.write_history(&history)?;
        Ok(true)
    }

    /// Sessions in history that have not reached the sink yet.
    pub fn pending_sync(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .history()?
            .into_iter()
            .filter(|s| s.sync_status == SyncStatus::Pending)
            .collect())
    }

    fn write_history(&self, history: &[Session]) -> Result<(), StoreError> {
        let value = serde_json::to_value(history)?;
        self.backend.set(&self.history_key(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::TrackableRegion;
    use crate::store::backend::{FileBackend, MemoryBackend};
    use chrono::{Duration, Utc};

    fn memory_store() -> StateStore {
        StateStore::new(Arc::new(MemoryBackend::new()))
    }

    fn finished(index: i64) -> Session {
        let region = TrackableRegion::new(format!("r{index}"), format!("R{index}"), "gym", 0.0, 0.0);
        let start = Utc::now() + Duration::hours(index);
        let mut session = Session::open(&region, start);
        session.end = Some(start + Duration::minutes(30));
        session
    }

    #[test]
    fn test_active_slot_roundtrip() {
        let store = memory_store();
        assert!(store.load_active().unwrap().is_none());

        let region = TrackableRegion::new("court_1", "Court", "basketball", 0.0, 0.0);
        let session = Session::open(&region, Utc::now());
        store.save_active(&session).unwrap();
        assert_eq!(store.load_active().unwrap(), Some(session));

        store.clear_active().unwrap();
        assert!(store.load_active().unwrap().is_none());
    }

    #[test]
    fn test_history_is_most_recent_first() {
        let store = memory_store();
        let first = finished(0);
        let second = finished(1);
        store.append_history(first.clone()).unwrap();
        store.append_history(second.clone()).unwrap();

        let history = store.history().unwrap();
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
    }

    #[test]
    fn test_history_evicts_oldest_past_cap() {
        let store = memory_store();
        let sessions: Vec<Session> = (0..=HISTORY_CAP as i64).map(finished).collect();

        let mut evicted = Vec::new();
        for session in &sessions {
            evicted.extend(store.append_history(session.clone()).unwrap());
        }

        let history = store.history().unwrap();
        assert_eq!(history.len(), HISTORY_CAP);
        assert!(history.iter().all(|s| s.id != sessions[0].id));
        assert_eq!(history.last().map(|s| s.id), Some(sessions[1].id));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, sessions[0].id);
    }

    #[test]
    fn test_set_sync_status() {
        let store = memory_store();
        let session = finished(0);
        store.append_history(session.clone()).unwrap();
        assert_eq!(store.pending_sync().unwrap().len(), 1);

        assert!(store.set_sync_status(session.id, SyncStatus::Synced).unwrap());
        assert!(store.pending_sync().unwrap().is_empty());
        assert!(!store.set_sync_status(Uuid::new_v4(), SyncStatus::Synced).unwrap());
    }

    #[test]
    fn test_state_survives_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let session = finished(0);

        {
            let store = StateStore::new(Arc::new(FileBackend::new(dir.path())));
            store.save_active(&session).unwrap();
            store.append_history(session.clone()).unwrap();
        }

        let store = StateStore::new(Arc::new(FileBackend::new(dir.path())));
        assert_eq!(store.load_active().unwrap(), Some(session.clone()));
        assert_eq!(store.history().unwrap(), vec![session]);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let backend: Arc<dyn KeyValueBackend> = Arc::new(MemoryBackend::new());
        let a = StateStore::with_namespace(backend.clone(), "a");
        let b = StateStore::with_namespace(backend, "b");

        a.append_history(finished(0)).unwrap();
        assert_eq!(a.history().unwrap().len(), 1);
        assert!(b.history().unwrap().is_empty());
    }
}
