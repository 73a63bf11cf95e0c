//! Entry store with whole-snapshot persistence.
//!
//! The store is the only shared mutable resource. Every mutation goes
//! through [`EntryStore::update`], which applies a closure to the entry
//! under the store's write lock and then rewrites the full snapshot.
//! Snapshots are written to a temp file and renamed into place while an
//! advisory lock is held on `<snapshot>.lock`. A failed write leaves the
//! in-memory state as it was before the call.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{Entry, EntryId, NewEntry};

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur in the entry store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence task failed: {0}")]
    Task(String),
}

/// In-place mutation applied to a stored entry
pub type EntryMutation = Box<dyn FnOnce(&mut Entry) + Send>;

/// Storage boundary used by the pipeline, search and analytics
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Create an entry, assigning its id
    async fn create(&self, new: NewEntry) -> Result<Entry, StoreError>;

    async fn get(&self, id: EntryId) -> Result<Option<Entry>, StoreError>;

    /// Apply `mutation` atomically and return the updated entry
    async fn update(&self, id: EntryId, mutation: EntryMutation) -> Result<Entry, StoreError>;

    /// Remove an entry and return it
    async fn delete(&self, id: EntryId) -> Result<Entry, StoreError>;

    /// Entries with `from <= timestamp < to`, ordered by timestamp
    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Entry>, StoreError>;

    /// All entries, ordered by timestamp
    async fn list_all(&self) -> Result<Vec<Entry>, StoreError>;
}

/// On-disk snapshot layout
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<Entry>,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<EntryId, Entry>,
    last_id: EntryId,
}

impl StoreState {
    /// Millisecond timestamp, bumped past the last issued id
    fn next_id(&mut self, now: DateTime<Utc>) -> EntryId {
        let candidate = now.timestamp_millis().max(0) as EntryId;
        let id = candidate.max(self.last_id + 1);
        self.last_id = id;
        id
    }

    fn sorted(&self, keep: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.entries.values().filter(|e| keep(e)).cloned().collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        entries
    }
}

/// In-memory entry store persisted as a full JSON snapshot on every write
pub struct SnapshotStore {
    /// Snapshot path; `None` keeps everything in memory
    path: Option<PathBuf>,

    state: RwLock<StoreState>,
}

impl SnapshotStore {
    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Open a snapshot file, loading existing entries if present
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let mut state = StoreState::default();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            if !content.trim().is_empty() {
                let snapshot: Snapshot = serde_json::from_str(&content)?;
                for entry in snapshot.entries {
                    state.last_id = state.last_id.max(entry.id);
                    state.entries.insert(entry.id, entry);
                }
            }
            info!(path = %path.display(), entries = state.entries.len(), "Loaded entry snapshot");
        } else if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the full snapshot; called with the write lock held
    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: state.entries.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        tokio::task::spawn_blocking(move || write_snapshot(&path, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        debug!(entries = state.entries.len(), "Persisted entry snapshot");
        Ok(())
    }
}

/// Atomically replace the snapshot file under an exclusive file lock
fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let lock_path = path.with_extension("json.lock");
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    lock.lock_exclusive()?;

    let tmp_path = path.with_extension("json.tmp");
    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();

    lock.unlock()?;
    Ok(result?)
}

#[async_trait]
impl EntryStore for SnapshotStore {
    async fn create(&self, new: NewEntry) -> Result<Entry, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let id = state.next_id(now);
        let entry = Entry::from_new(id, new, now);

        state.entries.insert(id, entry.clone());
        if let Err(e) = self.persist(&state).await {
            state.entries.remove(&id);
            return Err(e);
        }

        Ok(entry)
    }

    async fn get(&self, id: EntryId) -> Result<Option<Entry>, StoreError> {
        Ok(self.state.read().await.entries.get(&id).cloned())
    }

    async fn update(&self, id: EntryId, mutation: EntryMutation) -> Result<Entry, StoreError> {
        let mut state = self.state.write().await;
        let current = state.entries.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut updated = current.clone();
        mutation(&mut updated);
        // The id is the map key and must never change.
        updated.id = id;

        let previous = state.entries.insert(id, updated.clone());
        if let Err(e) = self.persist(&state).await {
            if let Some(previous) = previous {
                state.entries.insert(id, previous);
            }
            return Err(e);
        }

        Ok(updated)
    }

    async fn delete(&self, id: EntryId) -> Result<Entry, StoreError> {
        let mut state = self.state.write().await;
        let removed = state.entries.remove(&id).ok_or(StoreError::NotFound(id))?;

        if let Err(e) = self.persist(&state).await {
            state.entries.insert(id, removed);
            return Err(e);
        }
        Ok(removed)
    }

    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Entry>, StoreError> {
        let state = self.state.read().await;
        Ok(state.sorted(|e| e.timestamp >= from && e.timestamp < to))
    }

    async fn list_all(&self) -> Result<Vec<Entry>, StoreError> {
        Ok(self.state.read().await.sorted(|_| true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let store = SnapshotStore::in_memory();
        let mut last = 0;
        for i in 0..20 {
            let entry = store.create(NewEntry::text(format!("note {}", i))).await.unwrap();
            assert!(entry.id > last);
            last = entry.id;
        }
    }

    #[tokio::test]
    async fn test_update_unknown_entry() {
        let store = SnapshotStore::in_memory();
        let err = store
            .update(42, Box::new(|e| e.processed = true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_list_between_is_half_open_and_sorted() {
        let store = SnapshotStore::in_memory();
        let base = Utc::now() - Duration::days(3);

        store.create(NewEntry::text("late").at(base + Duration::hours(2))).await.unwrap();
        store.create(NewEntry::text("early").at(base)).await.unwrap();
        store.create(NewEntry::text("outside").at(base + Duration::hours(5))).await.unwrap();

        let listed = store
            .list_between(base, base + Duration::hours(5))
            .await
            .unwrap();
        let texts: Vec<_> = listed.iter().map(|e| e.transcript.clone().unwrap()).collect();
        assert_eq!(texts, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_mutation_cannot_change_id() {
        let store = SnapshotStore::in_memory();
        let entry = store.create(NewEntry::text("x")).await.unwrap();
        let updated = store
            .update(entry.id, Box::new(|e| e.id = 7))
            .await
            .unwrap();
        assert_eq!(updated.id, entry.id);
    }
}
