//! Persistent unit state
//!
//! Everything the agent must remember across restarts lives in one redb
//! database, split into buckets:
//!
//! - `operationState` - the current [`State`]
//! - `resolved` - the operator's [`ResolvedMode`] for a failed hook
//! - `relations` - remote units currently joined to each relation
//! - `hookHistory` - recent [`HookRecord`]s, oldest first
//!
//! Values are JSON so the database stays inspectable with generic tools.

use crate::state::State;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::RwLock;
use steward_core::{Error, Result};
use tracing::debug;

/// Bucket holding the operation state
pub const OPERATION_STATE_BUCKET: &str = "operationState";
/// Bucket holding the resolution marker
pub const RESOLVED_BUCKET: &str = "resolved";
/// Bucket holding relation membership
pub const RELATIONS_BUCKET: &str = "relations";
/// Bucket holding hook history
pub const HOOK_HISTORY_BUCKET: &str = "hookHistory";

const STATE_KEY: &[u8] = b"state";
const RESOLVED_KEY: &[u8] = b"mode";

/// Number of hook records kept
pub const HOOK_HISTORY_LIMIT: usize = 64;

/// Key-value storage split into named buckets
pub trait PersistentState: Send + Sync {
    /// Get a value from a bucket
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a value in a bucket
    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key from a bucket
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()>;

    /// Iterate over all key-value pairs in a bucket in key order
    fn for_each<F>(&self, bucket: &str, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>;
}

/// Persistent state backed by redb
pub struct RedbPersistentState {
    db: Database,
}

type Table = TableDefinition<'static, &'static [u8], &'static [u8]>;

impl RedbPersistentState {
    /// Create or open the database at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)
            .map_err(|e| Error::State(format!("Failed to open database: {e}")))?;
        debug!(path = %path.display(), "Opened state database");
        Ok(Self { db })
    }

    fn table(bucket: &str) -> Result<Table> {
        match bucket {
            OPERATION_STATE_BUCKET => Ok(TableDefinition::new(OPERATION_STATE_BUCKET)),
            RESOLVED_BUCKET => Ok(TableDefinition::new(RESOLVED_BUCKET)),
            RELATIONS_BUCKET => Ok(TableDefinition::new(RELATIONS_BUCKET)),
            HOOK_HISTORY_BUCKET => Ok(TableDefinition::new(HOOK_HISTORY_BUCKET)),
            other => Err(Error::State(format!("Unknown bucket: {other}"))),
        }
    }

    fn write<F>(&self, bucket: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> Result<()>,
    {
        let table_def = Self::table(bucket)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            f(&mut table)?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table_def = Self::table(bucket)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let table = match read_txn.open_table(table_def) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(Error::State(format!("Failed to open table: {e}"))),
        };

        let value = table
            .get(key)
            .map_err(|e| Error::State(format!("Failed to get value: {e}")))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(bucket, |table| {
            table
                .insert(key, value)
                .map_err(|e| Error::State(format!("Failed to insert value: {e}")))?;
            Ok(())
        })
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        self.write(bucket, |table| {
            table
                .remove(key)
                .map_err(|e| Error::State(format!("Failed to remove value: {e}")))?;
            Ok(())
        })
    }

    fn for_each<F>(&self, bucket: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let table_def = Self::table(bucket)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let table = match read_txn.open_table(table_def) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(Error::State(format!("Failed to open table: {e}"))),
        };

        let iter = table
            .iter()
            .map_err(|e| Error::State(format!("Failed to iterate table: {e}")))?;
        for item in iter {
            let (key, value) =
                item.map_err(|e| Error::State(format!("Failed to read item: {e}")))?;
            f(key.value(), value.value())?;
        }
        Ok(())
    }
}

type Buckets = HashMap<String, std::collections::BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory persistent state for tests and dry runs
#[derive(Default)]
pub struct MockPersistentState {
    data: RwLock<Buckets>,
}

impl MockPersistentState {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Error {
        Error::State("In-memory state lock poisoned".to_string())
    }
}

impl PersistentState for MockPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data.get(bucket).and_then(|b| b.get(key).cloned()))
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        data.entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        if let Some(bucket_data) = data.get_mut(bucket) {
            bucket_data.remove(key);
        }
        Ok(())
    }

    fn for_each<F>(&self, bucket: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        if let Some(bucket_data) = data.get(bucket) {
            for (k, v) in bucket_data {
                f(k, v)?;
            }
        }
        Ok(())
    }
}

/// How the operator resolved a failed hook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedMode {
    /// Not resolved
    #[default]
    None,
    /// Run the failed hook again
    RetryHooks,
    /// Skip the failed hook and commit it
    NoHooks,
}

impl fmt::Display for ResolvedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolvedMode::None => "none",
            ResolvedMode::RetryHooks => "retry-hooks",
            ResolvedMode::NoHooks => "no-hooks",
        })
    }
}

/// Final outcome of a hook run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookOutcome {
    /// Ran to completion, including reboot requests
    Completed,
    /// Ran and failed
    Failed,
}

impl fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookOutcome::Completed => "completed",
            HookOutcome::Failed => "failed",
        })
    }
}

/// One entry of hook history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRecord {
    pub hook_name: String,
    /// Id of the invocation context
    pub context_id: String,
    pub outcome: HookOutcome,
    /// Unix seconds
    pub at: i64,
}

/// Typed access to the unit's buckets
pub struct StateStore<P: PersistentState> {
    db: P,
}

impl<P: PersistentState> StateStore<P> {
    /// Wrap a backend
    pub fn new(db: P) -> Self {
        Self { db }
    }

    /// Load the operation state, blank if none was ever saved
    pub fn load_state(&self) -> Result<State> {
        Ok(self
            .read(OPERATION_STATE_BUCKET, STATE_KEY)?
            .unwrap_or_default())
    }

    /// Replace the operation state
    pub fn save_state(&self, state: &State) -> Result<()> {
        debug!(%state, "Persisting operation state");
        self.write(OPERATION_STATE_BUCKET, STATE_KEY, state)
    }

    /// Current resolution marker
    pub fn resolved_mode(&self) -> Result<ResolvedMode> {
        Ok(self.read(RESOLVED_BUCKET, RESOLVED_KEY)?.unwrap_or_default())
    }

    /// Set the resolution marker; `None` clears it
    pub fn set_resolved_mode(&self, mode: ResolvedMode) -> Result<()> {
        match mode {
            ResolvedMode::None => self.db.delete(RESOLVED_BUCKET, RESOLVED_KEY),
            mode => self.write(RESOLVED_BUCKET, RESOLVED_KEY, &mode),
        }
    }

    /// Remote units joined to `relation_id`, sorted
    pub fn relation_members(&self, relation_id: i64) -> Result<Vec<String>> {
        Ok(self
            .read(RELATIONS_BUCKET, &relation_id.to_be_bytes())?
            .unwrap_or_default())
    }

    /// Record that `unit` joined `relation_id`
    pub fn add_relation_member(&self, relation_id: i64, unit: &str) -> Result<()> {
        let mut members = self.relation_members(relation_id)?;
        if let Err(pos) = members.binary_search_by(|m| m.as_str().cmp(unit)) {
            members.insert(pos, unit.to_string());
        }
        self.write(RELATIONS_BUCKET, &relation_id.to_be_bytes(), &members)
    }

    /// Record that `unit` departed `relation_id`
    pub fn remove_relation_member(&self, relation_id: i64, unit: &str) -> Result<()> {
        let mut members = self.relation_members(relation_id)?;
        members.retain(|m| m != unit);
        self.write(RELATIONS_BUCKET, &relation_id.to_be_bytes(), &members)
    }

    /// Drop everything known about `relation_id`
    pub fn forget_relation(&self, relation_id: i64) -> Result<()> {
        self.db.delete(RELATIONS_BUCKET, &relation_id.to_be_bytes())
    }

    /// Membership of every known relation, by relation id
    pub fn relations(&self) -> Result<indexmap::IndexMap<i64, Vec<String>>> {
        let mut relations = indexmap::IndexMap::new();
        self.db.for_each(RELATIONS_BUCKET, |key, value| {
            let id = decode_id(key)?;
            relations.insert(id, decode(value)?);
            Ok(())
        })?;
        Ok(relations)
    }

    /// Append to the hook history, dropping the oldest records past the limit
    pub fn record_hook(&self, record: &HookRecord) -> Result<()> {
        let mut keys = Vec::new();
        self.db.for_each(HOOK_HISTORY_BUCKET, |key, _| {
            keys.push(decode_seq(key)?);
            Ok(())
        })?;

        let next = keys.last().map_or(0, |seq| seq + 1);
        self.write(HOOK_HISTORY_BUCKET, &next.to_be_bytes(), record)?;

        let excess = (keys.len() + 1).saturating_sub(HOOK_HISTORY_LIMIT);
        for seq in keys.iter().take(excess) {
            self.db.delete(HOOK_HISTORY_BUCKET, &seq.to_be_bytes())?;
        }
        Ok(())
    }

    /// Hook history, oldest first
    pub fn hook_history(&self) -> Result<Vec<HookRecord>> {
        let mut records = Vec::new();
        self.db.for_each(HOOK_HISTORY_BUCKET, |_, value| {
            records.push(decode(value)?);
            Ok(())
        })?;
        Ok(records)
    }

    fn read<T: DeserializeOwned>(&self, bucket: &str, key: &[u8]) -> Result<Option<T>> {
        self.db.get(bucket, key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn write<T: Serialize>(&self, bucket: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::State(format!("Failed to encode {bucket} value: {e}")))?;
        self.db.set(bucket, key, &bytes)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::State(format!("Corrupt stored value: {e}")))
}

fn decode_id(key: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::State("Corrupt relation key".to_string()))?;
    Ok(i64::from_be_bytes(bytes))
}

fn decode_seq(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::State("Corrupt history key".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}
