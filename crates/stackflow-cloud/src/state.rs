//! Persistence for the convergence state
//!
//! Manages the `.stackflow/state.json` file which records every live resource
//! by logical id, together with the provider identity and the fingerprint of
//! the inputs it was last applied with.

use crate::error::{CloudError, Result};
use crate::provider::Attributes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".stackflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are treated as stale
const STALE_LOCK_HOURS: i64 = 1;

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by logical id
    pub records: BTreeMap<String, ConvergenceRecord>,

    /// Mixed into secret inputs before they are fingerprinted
    #[serde(default = "new_fingerprint_salt")]
    pub fingerprint_salt: String,
}

fn new_fingerprint_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            records: BTreeMap::new(),
            fingerprint_salt: new_fingerprint_salt(),
        }
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a record
    pub fn set_record(&mut self, record: ConvergenceRecord) {
        self.records.insert(record.logical_id.clone(), record);
        self.updated_at = Utc::now();
    }

    /// Remove a record
    pub fn remove_record(&mut self, logical_id: &str) -> Option<ConvergenceRecord> {
        let result = self.records.remove(logical_id);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_record(&self, logical_id: &str) -> Option<&ConvergenceRecord> {
        self.records.get(logical_id)
    }
}

/// Last known state of one live resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    /// Declaration-time name of the resource
    pub logical_id: String,

    /// Resource kind the record was created with
    pub kind: String,

    /// Provider-specific resource ID
    pub provider_identity: String,

    /// Hash of desired state and resolved inputs at the last apply
    pub input_fingerprint: String,

    pub last_applied_at: DateTime<Utc>,

    /// Attributes returned by the provider at the last create/update
    #[serde(default)]
    pub attributes: Attributes,

    /// Logical ids this resource depended on at the last apply
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Earlier resources of this logical id kept alive until their consumers move off
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<RetiredResource>,
}

/// A replaced resource that has not been deleted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredResource {
    pub provider_identity: String,
    pub kind: String,
}

impl ConvergenceRecord {
    pub fn new(
        logical_id: impl Into<String>,
        kind: impl Into<String>,
        provider_identity: impl Into<String>,
        input_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind: kind.into(),
            provider_identity: provider_identity.into(),
            input_fingerprint: input_fingerprint.into(),
            last_applied_at: Utc::now(),
            attributes: Attributes::new(),
            dependencies: Vec::new(),
            retired: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_retired(mut self, retired: Vec<RetiredResource>) -> Self {
        self.retired = retired;
        self
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// State manager for reading/writing state files
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    /// Get the state directory path
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StateSnapshot> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateSnapshot = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} records", state.records.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &StateSnapshot) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved state with {} records", state.records.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    ///
    /// The lock file is created with `create_new`, so two processes can never
    /// both hold it. A lock older than one hour is replaced once.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    tracing::debug!("Acquired state lock");
                    return Ok(StateLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    self.check_existing_lock(&lock_path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::LockError(
            "State lock was taken by another process".to_string(),
        ))
    }

    /// Fails while the existing lock is held; removes it when stale
    async fn check_existing_lock(&self, lock_path: &Path) -> Result<()> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            // released in the meantime
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        // an empty or partial file belongs to a process that is still writing it
        let Ok(lock_info) = serde_json::from_str::<LockInfo>(&content) else {
            return Err(CloudError::LockError(
                "State lock is being acquired by another process".to_string(),
            ));
        };

        let age = Utc::now().signed_duration_since(lock_info.acquired_at);
        if age.num_hours() < STALE_LOCK_HOURS {
            return Err(CloudError::LockError(format!(
                "State is locked by {} (pid {}) since {}",
                lock_info.holder, lock_info.pid, lock_info.acquired_at
            )));
        }

        tracing::warn!("Removing stale lock from {}", lock_info.holder);
        match fs::remove_file(lock_path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateSnapshot::new();
        let mut attributes = Attributes::new();
        attributes.insert("endpoint".to_string(), serde_json::json!("db.internal:27017"));
        state.set_record(
            ConvergenceRecord::new("database", "docdb-cluster", "docdb-cluster-1", "abc123")
                .with_attributes(attributes)
                .with_dependencies(vec!["network".to_string()]),
        );

        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.records.len(), 1);
        let record = loaded.get_record("database").unwrap();
        assert_eq!(record.provider_identity, "docdb-cluster-1");
        assert_eq!(record.dependencies, vec!["network".to_string()]);
        assert_eq!(
            record.get_attribute::<String>("endpoint"),
            Some("db.internal:27017".to_string())
        );
    }

    #[tokio::test]
    async fn test_fingerprint_salt_is_per_state_file() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = StateSnapshot::new();
        assert_eq!(state.fingerprint_salt.len(), 32);
        assert_ne!(state.fingerprint_salt, StateSnapshot::new().fingerprint_salt);

        manager.save(&state).await.unwrap();
        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.fingerprint_salt, state.fingerprint_salt);
    }

    #[test]
    fn test_state_without_salt_gets_one() {
        let json = r#"{"version": 1, "updated_at": "2026-01-01T00:00:00Z", "records": {}}"#;
        let state: StateSnapshot = serde_json::from_str(json).unwrap();
        assert!(!state.fingerprint_salt.is_empty());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.records.is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateSnapshot::new();
        state.set_record(ConvergenceRecord::new("network", "vpc", "vpc-1", "f1"));
        manager.save(&state).await.unwrap();

        state.remove_record("network");
        manager.save(&state).await.unwrap();

        let backup = std::fs::read_to_string(manager.state_dir().join(STATE_BACKUP)).unwrap();
        assert!(backup.contains("vpc-1"));
        assert!(manager.load().await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateSnapshot::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        let second = manager.acquire_lock().await;
        assert!(matches!(second, Err(CloudError::LockError(_))));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!manager.state_dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_concurrent_lock_has_single_winner() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let contenders: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire_lock().await })
            })
            .collect();
        let mut held = Vec::new();
        for contender in contenders {
            if let Ok(lock) = contender.await.unwrap() {
                held.push(lock);
            }
        }
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn test_partially_written_lock_counts_as_held() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(manager.state_dir()).unwrap();
        std::fs::write(manager.state_dir().join(LOCK_FILE), "").unwrap();

        let result = manager.acquire_lock().await;
        assert!(matches!(result, Err(CloudError::LockError(_))));
        assert!(manager.state_dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(manager.state_dir()).unwrap();

        let stale = LockInfo {
            holder: "old-host".to_string(),
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(
            manager.state_dir().join(LOCK_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(manager.acquire_lock().await.is_ok());
    }
}
