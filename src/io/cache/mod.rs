//! Result cache keyed by (repository, commit).
//!
//! Entries carry an absolute expiry and are dropped lazily when read after it.
//! Writes replace the whole entry at once, so readers see either the previous
//! value or the new one and concurrent writers resolve as last write wins.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::config::{CacheBackend, CacheConfig};
use crate::core::errors::{PulseError, Result, ResultExt};
use crate::core::file_utils::{read_json_optional, write_json_atomic};
use crate::core::model::CacheKey;
use crate::core::pipeline::AnalysisResult;

/// A cached result with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Arc<AnalysisResult>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: Arc<AnalysisResult>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key,
            value,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// The unexpired value for `key`, if any.
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<AnalysisResult>>>;

    async fn put(&self, key: &CacheKey, value: Arc<AnalysisResult>, ttl: Duration) -> Result<()>;

    /// Remove every expired entry, returning how many were dropped.
    async fn sweep_expired(&self) -> Result<usize>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<AnalysisResult>>> {
        let entry = match self.entries.get(key) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };
        if entry.is_expired() {
            self.entries
                .remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
            debug!("Dropped expired cache entry for {}", key);
            return Ok(None);
        }
        Ok(Some(Arc::clone(&entry.value)))
    }

    async fn put(&self, key: &CacheKey, value: Arc<AnalysisResult>, ttl: Duration) -> Result<()> {
        let entry = Arc::new(CacheEntry::new(key.clone(), value, ttl));
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// One JSON file per key under a directory, named by the key digest.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            PulseError::io(
                format!("Failed to create cache directory: {}", directory.display()),
                e,
            )
        })?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(format!("{}.json", key.digest()))
    }

    fn read_entry(path: &Path, key: &CacheKey) -> Result<Option<Arc<AnalysisResult>>> {
        let Some(entry) = read_json_optional::<CacheEntry>(path)
            .map_err(|e| PulseError::cache_key(format!("unreadable entry: {e}"), key.to_string()))?
        else {
            return Ok(None);
        };
        if entry.key != *key {
            return Err(PulseError::cache_key(
                format!("entry belongs to {}", entry.key),
                key.to_string(),
            ));
        }
        if entry.is_expired() {
            if let Err(e) = fs::remove_file(path) {
                debug!("Could not remove expired entry {}: {}", path.display(), e);
            }
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn sweep(directory: &Path) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        let entries = fs::read_dir(directory).map_err(|e| {
            PulseError::io(format!("Failed to list cache: {}", directory.display()), e)
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json_optional::<CacheEntry>(&path) {
                Ok(Some(cached)) if !cached.is_expired_at(now) => {}
                Ok(None) => {}
                Ok(Some(_)) | Err(_) => {
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl AnalysisCache for FileCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<AnalysisResult>>> {
        let path = self.entry_path(key);
        let key = key.clone();
        tokio::task::spawn_blocking(move || Self::read_entry(&path, &key)).await?
    }

    async fn put(&self, key: &CacheKey, value: Arc<AnalysisResult>, ttl: Duration) -> Result<()> {
        let path = self.entry_path(key);
        let entry = CacheEntry::new(key.clone(), value, ttl);
        tokio::task::spawn_blocking(move || write_json_atomic(&path, &entry))
            .await?
            .with_context(|| format!("Failed to write cache entry for {key}"))?;
        debug!("Cached {}", key);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let directory = self.directory.clone();
        let removed = tokio::task::spawn_blocking(move || Self::sweep(&directory)).await??;
        if removed > 0 {
            info!("Swept {} expired cache entries", removed);
        }
        Ok(removed)
    }
}

/// Build the backend selected in configuration.
pub fn cache_from_config(config: &CacheConfig) -> Result<Arc<dyn AnalysisCache>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Disk => {
            let cache = FileCache::new(&config.directory).map_err(|e| {
                warn!("Disk cache unavailable: {}", e);
                e
            })?;
            Ok(Arc::new(cache))
        }
    }
}
