use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::fingerprint::fingerprint;
use crate::config::CacheConfig;
use crate::error::CacheError;

/// What is persisted per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub category: String,
    pub inserted_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub value: Value,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.inserted_at);
        age.num_milliseconds() >= i64::try_from(self.ttl_ms).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub hit_rate: f64,
    pub size_bytes: u64,
    pub categories: BTreeMap<String, usize>,
}

/// Disk-backed key/value store with per-entry TTL.
///
/// Layout is `<dir>/<category>/<fingerprint>.json`. Every write goes to a
/// temporary file in the same directory and is renamed into place, so a
/// concurrent reader sees either the old entry or the new one.
pub struct CacheStore {
    dir: PathBuf,
    default_ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            default_ttl,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// A store that never hits and never writes.
    pub fn disabled() -> Self {
        let mut store = Self::new(PathBuf::new(), Duration::ZERO);
        store.enabled = false;
        store
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Cache disabled");
            return Self::disabled();
        }
        let dir = config.get_dir();
        debug!("Cache directory: {}", dir.display());
        Self::new(dir, config.ttl())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entry_path(&self, category: &str, key: &str) -> PathBuf {
        self.dir.join(category).join(format!("{}.json", key))
    }

    /// Live value for `(category, input)`, or None on miss, expiry or error.
    pub fn get<T: DeserializeOwned>(&self, category: &str, input: &Value) -> Option<T> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match self.try_get(category, input) {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", category, e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn try_get<T: DeserializeOwned>(
        &self,
        category: &str,
        input: &Value,
    ) -> Result<Option<T>, CacheError> {
        let key = fingerprint(category, input);
        let path = self.entry_path(category, &key);
        let Some(entry) = read_entry(&path)? else {
            return Ok(None);
        };
        if entry.is_expired() {
            debug!("Cache entry expired: {}/{}", category, key);
            remove_quietly(&path);
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(entry.value)?))
    }

    /// Store `value` under `(category, input)`. Errors are logged, never returned.
    pub fn set<T: Serialize>(&self, category: &str, input: &Value, value: &T, ttl: Duration) {
        if !self.enabled {
            return;
        }
        match self.try_set(category, input, value, ttl) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!("Cache write failed for {}, continuing without it: {}", category, e),
        }
    }

    fn try_set<T: Serialize>(
        &self,
        category: &str,
        input: &Value,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = fingerprint(category, input);
        let entry = CacheEntry {
            key: key.clone(),
            category: category.to_string(),
            inserted_at: Utc::now(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            value: serde_json::to_value(value)?,
        };
        let category_dir = self.dir.join(category);
        fs::create_dir_all(&category_dir).map_err(|e| io_err(&category_dir, e))?;

        let bytes = serde_json::to_vec(&entry)?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&category_dir).map_err(|e| io_err(&category_dir, e))?;
        tmp.write_all(&bytes).map_err(|e| io_err(tmp.path(), e))?;
        let path = self.entry_path(category, &key);
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;
        debug!("Cached {}/{} ({} bytes)", category, key, bytes.len());
        Ok(())
    }

    /// Remove the entry for `(category, input)`. Returns whether one existed.
    pub fn invalidate(&self, category: &str, input: &Value) -> bool {
        if !self.enabled {
            return false;
        }
        let path = self.entry_path(category, &fingerprint(category, input));
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to invalidate {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for path in self.entry_files() {
            match read_entry(&path) {
                Ok(Some(entry)) if entry.is_expired_at(now) => {
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Unreadable entries can never hit; drop them too
                    warn!("Removing unreadable cache entry {}: {}", path.display(), e);
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            info!("Removed {} expired cache entries", removed);
        }
        removed
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        info!("Cleared {} cache entries", removed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let mut stats = CacheStats {
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            ..Default::default()
        };
        for path in self.entry_files() {
            stats.entries += 1;
            stats.size_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if let Some(category) = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
            {
                *stats.categories.entry(category.to_string()).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Every `<category>/<key>.json` file currently on disk.
    fn entry_files(&self) -> Vec<PathBuf> {
        if !self.enabled {
            return Vec::new();
        }
        let Ok(categories) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files = Vec::new();
        for category in categories.flatten() {
            let category_path = category.path();
            if !category_path.is_dir() {
                continue;
            }
            let Ok(entries) = fs::read_dir(&category_path) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            debug!("Could not evict {}: {}", path.display(), e);
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}
