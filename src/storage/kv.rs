//! In-process credential cache.
//!
//! A single named map of string values with optional per-key expiry, measured
//! against the injected clock. Expired keys are dropped lazily on read and in
//! bulk by `sweep()`, which the server runs on an interval. The whole map can be
//! snapshotted to disk with bincode and reloaded at startup.

use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::AppResult;

/// Key-value store with per-key expiry holding serialized session state.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    /// Overwrite `key`; the entry disappears after `ttl_secs`.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;
    /// Overwrite `key` only while it is still live. Returns whether it was written.
    async fn set_if_present(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<bool>;
    /// Returns whether the key was present.
    async fn delete(&self, key: &str) -> AppResult<bool>;
}

pub type SharedCache = Arc<dyn CredentialCache>;

// Keeps `now + ttl` far from DateTime overflow.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct SnapEntry { key: String, value: String, expires_at_ms: Option<i64> }

#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, entries: Vec<SnapEntry> }

#[derive(Clone)]
pub struct KvStore {
    map: Arc<parking_lot::RwLock<StdHashMap<String, Entry>>>,
    clock: SharedClock,
    snapshot_path: Option<PathBuf>,
}

impl KvStore {
    pub fn new(clock: SharedClock) -> Self {
        Self { map: Arc::new(parking_lot::RwLock::new(StdHashMap::new())), clock, snapshot_path: None }
    }

    /// Store that snapshots to `path` on `save_snapshot()`.
    pub fn with_snapshot(clock: SharedClock, path: impl Into<PathBuf>) -> Self {
        let mut s = Self::new(clock);
        s.snapshot_path = Some(path.into());
        s
    }

    pub fn snapshot_path(&self) -> Option<&Path> { self.snapshot_path.as_deref() }

    /// Set a key with optional TTL.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| self.clock.now() + d);
        let ent = Entry { value: value.into(), expires_at };
        self.map.write().insert(key.into(), ent);
    }

    /// Get a key. If expired, removes it and returns None.
    pub fn get_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        {
            let r = self.map.read();
            match r.get(key) {
                None => return None,
                Some(ent) if ent.expires_at.map(|exp| now < exp).unwrap_or(true) => return Some(ent.value.clone()),
                Some(_) => {}
            }
        }
        let mut w = self.map.write();
        // Re-check under the write lock; a concurrent set may have refreshed it.
        if let Some(ent) = w.get(key) {
            if ent.expires_at.map(|exp| now < exp).unwrap_or(true) { return Some(ent.value.clone()); }
        }
        w.remove(key);
        None
    }

    /// Replace a live key; a missing or expired key is left absent.
    pub fn replace_value(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        let mut w = self.map.write();
        match w.get_mut(key) {
            Some(ent) if ent.expires_at.map(|exp| now < exp).unwrap_or(true) => {
                ent.value = value.into();
                ent.expires_at = ttl.map(|d| now + d);
                true
            }
            Some(_) => { w.remove(key); false }
            None => false,
        }
    }

    pub fn delete_value(&self, key: &str) -> bool { self.map.write().remove(key).is_some() }
    pub fn clear(&self) { self.map.write().clear(); }
    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
    /// Return a snapshot of all keys in this store
    pub fn keys(&self) -> Vec<String> { self.map.read().keys().cloned().collect() }

    /// Remove expired keys. Returns number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|_, v| v.expires_at.map(|exp| now < exp).unwrap_or(true));
        before - w.len()
    }

    /// Write all live entries to the snapshot path (tmp file then rename).
    pub fn save_snapshot(&self) -> anyhow::Result<usize> {
        let Some(path) = self.snapshot_path.as_ref() else { return Ok(0); };
        let now = self.clock.now();
        let entries: Vec<SnapEntry> = self.map.read().iter()
            .filter(|(_, v)| v.expires_at.map(|exp| now < exp).unwrap_or(true))
            .map(|(k, v)| SnapEntry { key: k.clone(), value: v.value.clone(), expires_at_ms: v.expires_at.map(|e| e.timestamp_millis()) })
            .collect();
        let n = entries.len();
        let snap = Snapshot { version: 1, created_ms: now.timestamp_millis(), entries };
        let bytes = bincode::serialize(&snap)?;
        if let Some(dir) = path.parent() { std::fs::create_dir_all(dir)?; }
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, path)?;
        Ok(n)
    }

    /// Load snapshot from disk into memory, skipping entries that expired meanwhile.
    pub fn load_snapshot(&self) -> anyhow::Result<usize> {
        let Some(path) = self.snapshot_path.as_ref() else { return Ok(0); };
        if !path.exists() { return Ok(0); }
        let bytes = std::fs::read(path)?;
        let snap: Snapshot = bincode::deserialize(&bytes)?;
        let now = self.clock.now();
        let mut w = self.map.write();
        w.clear();
        for e in snap.entries.into_iter() {
            let expires_at = match e.expires_at_ms {
                Some(ms) => match Utc.timestamp_millis_opt(ms).single() {
                    Some(t) if t > now => Some(t),
                    _ => continue,
                },
                None => None,
            };
            w.insert(e.key, Entry { value: e.value, expires_at });
        }
        Ok(w.len())
    }
}

#[async_trait]
impl CredentialCache for KvStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> { Ok(self.get_value(key)) }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let secs = ttl_secs.min(MAX_TTL_SECS) as i64;
        self.set_value(key, value, Some(Duration::seconds(secs)));
        Ok(())
    }

    async fn set_if_present(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<bool> {
        let secs = ttl_secs.min(MAX_TTL_SECS) as i64;
        Ok(self.replace_value(key, value, Some(Duration::seconds(secs))))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> { Ok(self.delete_value(key)) }
}
