//! Convergence store
//!
//! The durable source of truth for "what currently exists". Records are read
//! once when the store is opened and flushed to disk after every change.
//! Writers for one logical id are serialized through a per-id lock, while
//! distinct ids can be worked on concurrently.

use crate::error::Result;
use crate::state::{ConvergenceRecord, StateLock, StateManager, StateSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct ConvergenceStore {
    /// `None` keeps the store purely in memory
    manager: Option<StateManager>,
    snapshot: Mutex<StateSnapshot>,
    slots: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConvergenceStore {
    /// Open the store backed by the project's state file
    pub async fn open(manager: StateManager) -> Result<Self> {
        let snapshot = manager.load().await?;
        Ok(Self {
            manager: Some(manager),
            snapshot: Mutex::new(snapshot),
            slots: StdMutex::new(HashMap::new()),
        })
    }

    /// Take the project's state lock, then read the state file
    ///
    /// Records are only read while the lock is held, so a run never works
    /// from a snapshot another run has already changed.
    pub async fn open_exclusive(manager: StateManager) -> Result<(Self, StateLock)> {
        let lock = manager.acquire_lock().await?;
        let store = Self::open(manager).await?;
        Ok((store, lock))
    }

    pub fn in_memory() -> Self {
        Self::from_snapshot(StateSnapshot::new())
    }

    /// In-memory store seeded with existing records
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            manager: None,
            snapshot: Mutex::new(snapshot),
            slots: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, logical_id: &str) -> Option<ConvergenceRecord> {
        self.snapshot.lock().await.get_record(logical_id).cloned()
    }

    /// All records, ordered by logical id
    pub async fn records(&self) -> Vec<ConvergenceRecord> {
        self.snapshot.lock().await.records.values().cloned().collect()
    }

    pub async fn logical_ids(&self) -> Vec<String> {
        self.snapshot.lock().await.records.keys().cloned().collect()
    }

    /// Salt for secret inputs, stable for the lifetime of the state file
    pub async fn fingerprint_salt(&self) -> String {
        self.snapshot.lock().await.fingerprint_salt.clone()
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Take the single-writer lock for a logical id
    pub async fn lock(self: &Arc<Self>, logical_id: &str) -> RecordLock {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots
                .entry(logical_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = slot.lock_owned().await;
        RecordLock {
            store: Arc::clone(self),
            logical_id: logical_id.to_string(),
            _guard: guard,
        }
    }

    async fn write(&self, record: ConvergenceRecord) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        tracing::debug!(
            logical_id = %record.logical_id,
            identity = %record.provider_identity,
            "Committing convergence record"
        );
        snapshot.set_record(record);
        self.flush(&snapshot).await
    }

    async fn delete(&self, logical_id: &str) -> Result<Option<ConvergenceRecord>> {
        let mut snapshot = self.snapshot.lock().await;
        let removed = snapshot.remove_record(logical_id);
        if removed.is_some() {
            tracing::debug!(logical_id = %logical_id, "Removed convergence record");
            self.flush(&snapshot).await?;
        }
        Ok(removed)
    }

    async fn flush(&self, snapshot: &StateSnapshot) -> Result<()> {
        match &self.manager {
            Some(manager) => manager.save(snapshot).await,
            None => Ok(()),
        }
    }
}

/// Exclusive access to one logical id's record
pub struct RecordLock {
    store: Arc<ConvergenceStore>,
    logical_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl RecordLock {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub async fn current(&self) -> Option<ConvergenceRecord> {
        self.store.get(&self.logical_id).await
    }

    /// Persist the record for this id
    pub async fn commit(&self, mut record: ConvergenceRecord) -> Result<()> {
        record.logical_id = self.logical_id.clone();
        self.store.write(record).await
    }

    pub async fn remove(&self) -> Result<Option<ConvergenceRecord>> {
        self.store.delete(&self.logical_id).await
    }
}
