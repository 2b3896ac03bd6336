//! Key-normalized memoization, optionally persisted as JSON.
//!
//! A [`Cache`] lives for one run. Entries never expire, and concurrent writers
//! racing on the same key simply overwrite each other with equivalent data.
//! [`CacheStore`] loads the caches a run needs from disk and writes them back at the end.

mod store;

pub use store::CacheStore;

use crate::Result;
use core::fmt::{Display, Formatter};
use ohno::IntoAppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

const LOG_TARGET: &str = "     cache";

/// A cache key; always stored lower-cased.
///
/// Keys are built from request URLs, so two requests for the same resource that
/// differ only in casing share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self(key.to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct Cache<V> {
    entries: Mutex<HashMap<CacheKey, V>>,
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> Cache<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.lock().expect("lock poisoned").get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        let _ = self.entries.lock().expect("lock poisoned").insert(key, value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Serialize + DeserializeOwned> Cache<V> {
    /// Load a cache previously written with [`save`](Self::save).
    ///
    /// A missing or unreadable file yields an empty cache.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Starting with an empty cache, could not open '{}': {e:#}", path.display());
                return Self::new();
            }
        };

        match serde_json::from_reader::<_, HashMap<String, V>>(BufReader::new(file)) {
            Ok(entries) => {
                log::debug!(target: LOG_TARGET, "Loaded {} cache entries from '{}'", entries.len(), path.display());
                Self {
                    entries: Mutex::new(entries.into_iter().map(|(k, v)| (CacheKey::new(&k), v)).collect()),
                }
            }
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Ignoring corrupt cache file '{}': {e:#}", path.display());
                Self::new()
            }
        }
    }

    /// Write every entry to `path` as a JSON object with keys in sorted order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot: BTreeMap<String, V> = self
            .entries
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;
        }

        let file = File::create(path).into_app_err_with(|| format!("creating cache file '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &snapshot).into_app_err_with(|| format!("writing cache file '{}'", path.display()))?;
        writer.flush().into_app_err_with(|| format!("flushing cache file '{}'", path.display()))?;

        log::debug!(target: LOG_TARGET, "Saved {} cache entries to '{}'", snapshot.len(), path.display());
        Ok(())
    }
}
