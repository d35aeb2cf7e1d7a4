//! State management for provisioned resources
//!
//! A [`StateRecord`] remembers what was last applied for a resource: the
//! resolved inputs sent to the provider and the outputs it returned. Records
//! are what make re-applies idempotent and what destroy and orphan pruning
//! work from.
//!
//! The file-backed store keeps everything in `.strata/state.json`.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strata_core::{Properties, ResourceKind};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".strata";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// What was last applied for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub id: String,

    pub kind: ResourceKind,

    /// Inputs as resolved when the resource was last applied
    pub inputs: Properties,

    /// Outputs the provider returned
    pub outputs: Properties,

    /// Ids of the resources this one referenced
    #[serde(default)]
    pub dependencies: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn new(
        id: impl Into<String>,
        kind: ResourceKind,
        inputs: Properties,
        outputs: Properties,
        dependencies: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            inputs,
            outputs,
            dependencies,
            created_at: now,
            updated_at: now,
        }
    }

    /// The same record after a successful update, keeping `created_at`.
    pub fn updated(
        mut self,
        inputs: Properties,
        outputs: Properties,
        dependencies: Vec<String>,
    ) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self.dependencies = dependencies;
        self.updated_at = Utc::now();
        self
    }
}

/// Persistence seam for state records
///
/// The engine only ever writes a record after the provider call it describes
/// has succeeded, and removes it after a successful delete.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<StateRecord>>;

    async fn put(&self, record: StateRecord) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<Option<StateRecord>>;

    /// All records, ordered by id
    async fn list(&self) -> Result<Vec<StateRecord>>;
}

/// Global state containing every record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by resource id
    pub resources: BTreeMap<String, StateRecord>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record
    pub fn set_resource(&mut self, record: StateRecord) {
        self.resources.insert(record.id.clone(), record);
        self.updated_at = Utc::now();
    }

    /// Remove a record
    pub fn remove_resource(&mut self, id: &str) -> Option<StateRecord> {
        let result = self.resources.remove(id);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, id: &str) -> Option<&StateRecord> {
        self.resources.get(id)
    }
}

/// In-memory store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<GlobalState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = StateRecord>) -> Self {
        let mut state = GlobalState::new();
        for record in records {
            state.set_resource(record);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> GlobalState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, id: &str) -> Result<Option<StateRecord>> {
        Ok(self.state.read().await.get_resource(id).cloned())
    }

    async fn put(&self, record: StateRecord) -> Result<()> {
        self.state.write().await.set_resource(record);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<Option<StateRecord>> {
        Ok(self.state.write().await.remove_resource(id))
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        Ok(self.state.read().await.resources.values().cloned().collect())
    }
}

/// Store backed by `.strata/state.json`; every change is saved immediately.
pub struct FileStateStore {
    manager: StateManager,
    state: Mutex<GlobalState>,
}

impl FileStateStore {
    pub async fn open(project_root: impl AsRef<Path>) -> Result<Self> {
        let manager = StateManager::new(project_root);
        let state = manager.load().await?;
        Ok(Self {
            manager,
            state: Mutex::new(state),
        })
    }

    pub fn manager(&self) -> &StateManager {
        &self.manager
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, id: &str) -> Result<Option<StateRecord>> {
        Ok(self.state.lock().await.get_resource(id).cloned())
    }

    async fn put(&self, record: StateRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.set_resource(record);
        self.manager.save(&state).await
    }

    async fn remove(&self, id: &str) -> Result<Option<StateRecord>> {
        let mut state = self.state.lock().await;
        let removed = state.remove_resource(id);
        if removed.is_some() {
            self.manager.save(&state).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        Ok(self.state.lock().await.resources.values().cloned().collect())
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

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    ///
    /// The new state is written next to `state.json` and renamed over it,
    /// so a failed write leaves the previous file in place.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.state_dir().join(STATE_TEMP);

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    ///
    /// A lock older than one hour is considered stale and replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
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
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: &str) -> StateRecord {
        let mut inputs = Properties::new();
        inputs.insert("cidr_block".into(), json!("10.0.0.0/16"));
        let mut outputs = Properties::new();
        outputs.insert("id".into(), json!(format!("{id}-0001")));
        StateRecord::new(id, ResourceKind::Network, inputs, outputs, vec![])
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.set_resource(record("login-vpc"));
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(
            loaded.get_resource("login-vpc").unwrap().outputs["id"],
            json!("login-vpc-0001")
        );
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut first = GlobalState::new();
        first.set_resource(record("a"));
        manager.save(&first).await.unwrap();
        let mut second = GlobalState::new();
        second.set_resource(record("b"));
        manager.save(&second).await.unwrap();

        let saved = manager.load().await.unwrap();
        assert!(saved.resources.contains_key("b"));
        assert!(!saved.resources.contains_key("a"));

        let backup = std::fs::read_to_string(manager.state_dir().join(STATE_BACKUP)).unwrap();
        let backup: GlobalState = serde_json::from_str(&backup).unwrap();
        assert!(backup.resources.contains_key("a"));
        assert!(!manager.state_dir().join(STATE_TEMP).exists());
    }

    #[tokio::test]
    async fn test_newer_state_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = GlobalState {
            version: STATE_VERSION + 1,
            ..GlobalState::new()
        };
        manager.save(&state).await.unwrap();

        assert!(matches!(manager.load().await, Err(CloudError::StateError(_))));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!manager.state_dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_file_store_persists_every_change() {
        let temp_dir = tempdir().unwrap();

        let store = FileStateStore::open(temp_dir.path()).await.unwrap();
        store.put(record("login-vpc")).await.unwrap();
        store.put(record("eks-sg")).await.unwrap();
        store.remove("login-vpc").await.unwrap();

        let reopened = FileStateStore::open(temp_dir.path()).await.unwrap();
        let ids: Vec<_> = reopened
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["eks-sg"]);
    }

    #[tokio::test]
    async fn test_updated_record_keeps_creation_time() {
        let original = record("login-vpc");
        let created_at = original.created_at;

        let updated = original.updated(Properties::new(), Properties::new(), vec!["x".into()]);
        assert_eq!(updated.created_at, created_at);
        assert!(updated.updated_at >= created_at);
        assert_eq!(updated.dependencies, vec!["x"]);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStateStore::with_records([record("b"), record("a")]);

        assert!(store.get("a").await.unwrap().is_some());
        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.remove("a").await.unwrap().is_some());
        assert!(store.remove("a").await.unwrap().is_none());
        assert_eq!(store.snapshot().await.resources.len(), 1);
    }
}
