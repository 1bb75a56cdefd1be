// src/storage/seen.rs

//! Persistent set of listing keys that were already announced.
//!
//! The set lives in memory and is flushed to a single JSON file holding a
//! compact array of keys. Writes are throttled: an unforced [`DedupCache::save`]
//! only touches the file once `write_threshold` new keys have accumulated.
//! Persistence problems are logged and never reach the caller.
//!
//! Every [`DedupCache::reset`] starts a new generation. A save that began in
//! an older generation drops its temp file instead of renaming it, so a reset
//! racing an in-flight write cannot bring the cleared keys back.
//!
//! ```text
//! ["Degewo:1400-12345","InBerlinWohnen:WBM-0815"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::CacheConfig;

/// Accepted on-disk shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum Persisted {
    Bare(Vec<String>),
    Wrapped {
        #[serde(default)]
        seen_ids: Vec<String>,
    },
}

impl Persisted {
    fn into_ids(self) -> Vec<String> {
        match self {
            Persisted::Bare(ids) | Persisted::Wrapped { seen_ids: ids } => ids,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    ids: HashSet<String>,
    modified: bool,
    pending: usize,
    generation: u64,
}

/// Seen-id set with throttled file persistence.
#[derive(Debug)]
pub struct DedupCache {
    path: PathBuf,
    write_threshold: usize,
    state: Mutex<CacheState>,
    // serializes the rename in `save` against the delete in `reset`
    file_lock: tokio::sync::Mutex<()>,
}

impl DedupCache {
    pub fn new(path: impl Into<PathBuf>, write_threshold: usize) -> Self {
        Self {
            path: path.into(),
            write_threshold: write_threshold.max(1),
            state: Mutex::new(CacheState::default()),
            file_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.path, config.write_threshold)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory set with the persisted one.
    ///
    /// A missing or unreadable file yields an empty set. Returns the number
    /// of keys loaded.
    pub async fn load(&self) -> usize {
        let ids = match self.read_ids().await {
            Ok(Some(ids)) => {
                log::info!("Loaded {} seen ids from {:?}", ids.len(), self.path);
                ids
            }
            Ok(None) => {
                log::info!("No seen-id cache at {:?}, starting fresh", self.path);
                Vec::new()
            }
            Err(e) => {
                log::error!("Failed to load seen-id cache {:?}: {}", self.path, e);
                Vec::new()
            }
        };

        self.with_state(|s| {
            s.ids = ids.into_iter().collect();
            s.modified = false;
            s.pending = 0;
            s.ids.len()
        })
    }

    /// Persist the set if it changed and `force` is set or enough keys are pending.
    ///
    /// Returns whether the file was written.
    pub async fn save(&self, force: bool) -> bool {
        let snapshot = self.with_state(|s| {
            if !s.modified || (!force && s.pending < self.write_threshold) {
                return None;
            }
            let mut ids: Vec<String> = s.ids.iter().cloned().collect();
            ids.sort();
            Some((ids, s.pending, s.generation))
        });
        let Some((ids, pending, generation)) = snapshot else {
            return false;
        };

        match self.write_ids(&ids, generation).await {
            Ok(true) => {
                log::info!("Saved {} seen ids to {:?}", ids.len(), self.path);
                self.with_state(|s| {
                    if s.generation == generation {
                        s.pending = s.pending.saturating_sub(pending);
                        s.modified = s.pending > 0;
                    }
                });
                true
            }
            Ok(false) => {
                log::debug!("Cache reset during save, discarded stale write to {:?}", self.path);
                false
            }
            Err(e) => {
                log::error!("Failed to save seen-id cache {:?}: {}", self.path, e);
                false
            }
        }
    }

    /// Forget every key and delete the persisted file.
    pub async fn reset(&self) {
        self.with_state(|s| {
            *s = CacheState {
                generation: s.generation + 1,
                ..CacheState::default()
            }
        });
        let _file = self.file_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => log::info!("Cleared seen-id cache {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Failed to delete seen-id cache {:?}: {}", self.path, e),
        }
    }

    pub fn is_seen(&self, key: &str) -> bool {
        self.with_state(|s| s.ids.contains(key))
    }

    /// Record a key. Returns `true` if it was new.
    pub fn mark_seen(&self, key: impl Into<String>) -> bool {
        let key = key.into();
        self.with_state(|s| Self::insert(s, key))
    }

    /// Record several keys. Returns how many were new.
    pub fn mark_many_seen<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.with_state(|s| keys.into_iter().filter(|k| Self::insert(s, k.clone())).count())
    }

    pub fn len(&self) -> usize {
        self.with_state(|s| s.ids.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(state: &mut CacheState, key: String) -> bool {
        let fresh = state.ids.insert(key);
        if fresh {
            state.modified = true;
            state.pending += 1;
        }
        fresh
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CacheState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Read the persisted keys, returning None if the file doesn't exist.
    async fn read_ids(&self) -> Result<Option<Vec<String>>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };
        let persisted: Persisted = serde_json::from_slice(&bytes)?;
        Ok(Some(persisted.into_ids()))
    }

    /// Write compact JSON atomically (write to temp, then rename).
    ///
    /// Returns `false` without touching the target when `generation` is no
    /// longer current.
    async fn write_ids(&self, ids: &[String], generation: u64) -> Result<bool> {
        let bytes = serde_json::to_vec(ids)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        let _file = self.file_lock.lock().await;
        if self.with_state(|s| s.generation) != generation {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                log::warn!("Failed to remove stale temp file {:?}: {}", tmp, e);
            }
            return Ok(false);
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(true)
    }
}
