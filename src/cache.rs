#![forbid(unsafe_code)]

//! Key/value stores with a time-to-live for resolved feed items.
//!
//! Stores never decide freshness on their own clock: callers pass `now`, which
//! keeps expiry deterministic under test.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::fsutil::{read_json, write_json_atomic};
use crate::uploads::FeedItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub items: Vec<FeedItem>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub trait CacheStore: Send + Sync {
    /// Returns the stored items if the entry exists and has not expired.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<FeedItem>>;

    /// Replaces whatever was stored under `key`.
    fn put(&self, key: &str, items: &[FeedItem], expires_at: DateTime<Utc>) -> Result<()>;
}

/// Process-local store; entries vanish with the process.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<FeedItem>> {
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.items.clone())
    }

    fn put(&self, key: &str, items: &[FeedItem], expires_at: DateTime<Utc>) -> Result<()> {
        self.entries.write().insert(
            key.to_owned(),
            CacheEntry {
                items: items.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }
}

/// One JSON document per key under a directory, so cached feeds survive
/// restarts of the server and are shared with the render CLI.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }

    /// Deletes expired documents. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let Ok(listing) = fs::read_dir(&self.dir) else {
            return Ok(0);
        };
        let mut removed = 0;
        for dir_entry in listing {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let stale = read_json::<CacheEntry>(&path).is_none_or(|entry| !entry.is_live(now));
            if stale {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<FeedItem>> {
        read_json::<CacheEntry>(&self.entry_path(key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.items)
    }

    fn put(&self, key: &str, items: &[FeedItem], expires_at: DateTime<Utc>) -> Result<()> {
        let entry = CacheEntry {
            items: items.to_vec(),
            expires_at,
        };
        write_json_atomic(&self.entry_path(key), &entry)
    }
}
