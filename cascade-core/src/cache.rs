//! Remembered selections.
//!
//! A [`CacheStore`] is a flat string map that outlives chains. The
//! [`CachePolicy`] decides which key a level uses and when it is written:
//! only explicit user choices are recorded, and a remembered value is only
//! ever applied after it shows up in freshly fetched options.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{Level, SelectionMode};

/// Persisted key/value store for remembered selections.
///
/// Writes are last-writer-wins and best-effort.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn entries(&self) -> BTreeMap<String, String>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn entries(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

/// JSON file store, the CLI's stand-in for browser local storage.
///
/// The whole map is held in memory and the file is rewritten on every
/// change. IO problems are logged and otherwise ignored: losing a
/// remembered selection never fails a form.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileCacheStore {
    /// Open `path`, starting empty if it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read cache file");
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.persist(&entries);
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = self.write_file(entries) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write cache file");
        }
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(entries).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn entries(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

/// Cache access for one chain
#[derive(Clone)]
pub struct CachePolicy {
    store: Arc<dyn CacheStore>,
    mode: SelectionMode,
}

impl CachePolicy {
    pub fn new(store: Arc<dyn CacheStore>, mode: SelectionMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Key `level` is remembered under in this chain, if it is cached at all
    pub fn scope_key(&self, level: &Level) -> Option<String> {
        level.cache.scope_key(self.mode)
    }

    /// Remembered value, unvalidated
    pub fn lookup(&self, level: &Level) -> Option<String> {
        let key = self.scope_key(level)?;
        self.store.get(&key)
    }

    pub fn record(&self, level: &Level, value: &str) {
        if let Some(key) = self.scope_key(level) {
            tracing::debug!(level = %level.id, key = %key, value, "remembering selection");
            self.store.set(&key, value);
        }
    }
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("mode", &self.mode)
            .field("entries", &self.store.entries().len())
            .finish()
    }
}
