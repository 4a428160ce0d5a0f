//! In-memory storage with optional JSON file persistence.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::{Storage, StorageError, StoredCoValue};
use crate::header::CoValueHeader;
use crate::id::CoID;
use crate::transaction::Transaction;

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

fn is_v0(v: &u8) -> bool {
    *v == 0
}

fn validate_persistence_version<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

#[derive(Serialize, Deserialize)]
struct SerializableStorage {
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    #[serde(default)]
    values: BTreeMap<CoID, StoredCoValue>,
}

/// Storage kept in a map, for tests, embedding hosts and anything that
/// snapshots the whole state to one file.
#[derive(Debug, Default)]
pub struct InMemory {
    values: RwLock<BTreeMap<CoID, StoredCoValue>>,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> SerializableStorage {
        SerializableStorage {
            version: PERSISTENCE_VERSION,
            values: self
                .values
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Write the whole state to `path` as JSON.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|source| StorageError::SerializationFailed { source })?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|source| StorageError::FileIo { source })?;
        debug!(path = %path.as_ref().display(), "Saved storage snapshot");
        Ok(())
    }

    /// Read state previously written by [`save_to_file`](Self::save_to_file).
    ///
    /// A missing file yields empty storage.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => {
                let stored: SerializableStorage = serde_json::from_str(&json)
                    .map_err(|source| StorageError::DeserializationFailed { source })?;
                Ok(Self {
                    values: RwLock::new(stored.values),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(StorageError::FileIo { source }),
        }
    }
}

impl Storage for InMemory {
    fn put_header(&self, id: &CoID, header: &CoValueHeader) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        match values.get(id) {
            Some(existing) if &existing.header == header => Ok(()),
            Some(_) => Err(StorageError::HeaderCollision { id: id.clone() }),
            None => {
                values.insert(id.clone(), StoredCoValue::new(header.clone()));
                Ok(())
            }
        }
    }

    fn append(&self, id: &CoID, tx: &Transaction) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let stored = values
            .get_mut(id)
            .ok_or_else(|| StorageError::HeaderMissing { id: id.clone() })?;
        let log = stored.sessions.entry(tx.session_id.clone()).or_default();
        if !log.iter().any(|held| held.tx_index == tx.tx_index) {
            log.push(tx.clone());
        }
        Ok(())
    }

    fn load(&self, id: &CoID) -> Result<Option<StoredCoValue>, StorageError> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn ids(&self) -> Result<Vec<CoID>, StorageError> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}
