//! Persisted intent: one record per selector.

use core::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use crate::classify::ModificationKind;
use crate::error::PatchError;

/// Key under which the ordered record list is stored.
pub const STORE_KEY: &str = "modifications";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    pub selector: String,
    pub kind: ModificationKind,
    /// For `Style` a `property:value` pair, otherwise the raw content.
    pub value: String,
    /// Milliseconds since the UNIX epoch of the last write.
    pub applied_at: u64,
}

/// An asynchronous key-value persistence primitive.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Values for those of `keys` that are present.
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Map<String, Value>, Error>> + Send;

    /// Write the given entries, leaving other keys untouched.
    fn set(&self, items: Map<String, Value>) -> impl Future<Output = Result<(), Error>> + Send;
}

fn select_keys(map: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| map.get(*key).map(|value| ((*key).to_owned(), value.clone())))
        .collect()
}

/// In-process store. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, Error> {
        let map = self.inner.lock().await;
        Ok(select_keys(&map, keys))
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), Error> {
        self.inner.lock().await.extend(items);
        Ok(())
    }
}

/// A JSON file on disk. Every write replaces the file through a temporary
/// sibling and a rename, so readers never see a partial file.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_map(&self) -> Result<Map<String, Value>, Error> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not a JSON object", self.path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(Error::new(err).context(format!("reading {}", self.path.display()))),
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(map)?;
        let temp = self.temp_path();
        fs::write(&temp, bytes)
            .await
            .with_context(|| format!("writing {}", temp.display()))?;
        fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, Error> {
        let _guard = self.lock.lock().await;
        let map = self.read_map().await?;
        Ok(select_keys(&map, keys))
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.extend(items);
        self.write_map(&map).await
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn persistence(err: Error) -> PatchError {
    log::warn!(target: "patcher::store", "persistence failure: {err:#}");
    PatchError::PersistenceFailure(format!("{err:#}"))
}

/// Owner of the record list. Clones share one lock, so read-modify-write
/// cycles from every page and the control surface are serialized.
#[derive(Clone, Debug)]
pub struct ModificationStore<S: KeyValueStore> {
    backend: S,
    lock: Arc<Mutex<()>>,
}

impl<S: KeyValueStore> ModificationStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    async fn read_all(&self) -> Result<Vec<Modification>, PatchError> {
        let mut map = self.backend.get(&[STORE_KEY]).await.map_err(persistence)?;
        let Some(raw) = map.remove(STORE_KEY) else {
            return Ok(Vec::new());
        };
        if raw.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(raw)
            .map_err(|err| persistence(Error::new(err).context("decoding stored modifications")))
    }

    async fn write_all(&self, records: &[Modification]) -> Result<(), PatchError> {
        let encoded = serde_json::to_value(records).map_err(|err| persistence(err.into()))?;
        let mut items = Map::new();
        items.insert(STORE_KEY.to_owned(), encoded);
        self.backend.set(items).await.map_err(persistence)
    }

    /// Records in insertion order.
    pub async fn list(&self) -> Result<Vec<Modification>, PatchError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    pub async fn get(&self, selector: &str) -> Result<Option<Modification>, PatchError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|record| record.selector == selector))
    }

    /// Replace the record for `selector` in place, or append a new one.
    pub async fn upsert(
        &self,
        selector: &str,
        kind: ModificationKind,
        value: &str,
    ) -> Result<Modification, PatchError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let record = Modification {
            selector: selector.to_owned(),
            kind,
            value: value.to_owned(),
            applied_at: now_millis(),
        };
        match records.iter_mut().find(|existing| existing.selector == selector) {
            Some(existing) => existing.clone_from(&record),
            None => records.push(record.clone()),
        }
        self.write_all(&records).await?;
        log::debug!(target: "patcher::store", "upserted {selector:?} ({} records)", records.len());
        Ok(record)
    }

    /// Delete the record for `selector`. Returns whether one existed.
    pub async fn remove(&self, selector: &str) -> Result<bool, PatchError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|record| record.selector != selector);
        if records.len() == before {
            return Ok(false);
        }
        self.write_all(&records).await?;
        Ok(true)
    }

    /// Delete the record at a display position.
    pub async fn remove_at(&self, index: usize) -> Result<Option<Modification>, PatchError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        if index >= records.len() {
            return Ok(None);
        }
        let removed = records.remove(index);
        self.write_all(&records).await?;
        Ok(Some(removed))
    }

    pub async fn clear(&self) -> Result<(), PatchError> {
        let _guard = self.lock.lock().await;
        self.write_all(&[]).await
    }
}
