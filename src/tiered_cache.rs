//! Two-tier edge cache with L1 (memory) and L2 (disk) storage
//!
//! This module provides the cache that sits in front of the backing store:
//! - L1 Cache: In-memory HashMap for fast access to hot objects
//! - L2 Cache: Disk-based storage that survives restarts
//!
//! Features:
//! - Promotion of L2 hits into L1
//! - Asynchronous write-behind to L2 so stores never wait on disk
//! - LRU eviction for L1 when the memory budget is reached
//! - Checksummed L2 entries; corrupt or foreign files count as misses
//! - Periodic L2 sweep removing expired, corrupt and half-written files

use crate::cache::EdgeCache;
use crate::error::{EdgeError, Result};
use crate::models::{CacheKey, CachedObject};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bytes before the payload in an L2 file: expiry (u64 LE) + crc32 (u32 LE)
const L2_HEADER_LEN: usize = 12;

/// Time between background sweeps of the L2 directory
const L2_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Message for async disk write operations
#[derive(Debug)]
enum DiskWriteMessage {
    Write {
        key: String,
        entry: CachedObject,
        expires_at: SystemTime,
    },
    /// Sweep the L2 directory now and report how many files were removed
    Sweep(oneshot::Sender<u64>),
    Shutdown,
}

/// L1 cache entry with its LRU timestamp
#[derive(Clone)]
struct L1Entry {
    entry: CachedObject,
    expires_at: SystemTime,
    last_accessed: SystemTime,
}

/// What is serialized into an L2 file
#[derive(Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    entry: CachedObject,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct TieredCacheStats {
    pub l1_entries: usize,
    pub l1_bytes: usize,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub disk_writes: u64,
    pub disk_errors: u64,
    pub corrupt_entries: u64,
    /// L2 files removed by sweeps (expired, corrupt or left half-written)
    pub swept_files: u64,
}

/// Two-tier cache with memory (L1) and disk (L2) storage
pub struct TieredCache {
    // L1: In-memory cache
    l1_storage: Arc<RwLock<HashMap<String, L1Entry>>>,
    l1_max_size_bytes: usize,
    l1_current_size: Arc<RwLock<usize>>,

    // L2: Disk cache
    l2_base_path: PathBuf,
    l2_enabled: bool,

    ttl: Duration,

    stats: Arc<RwLock<TieredCacheStats>>,

    disk_writer_tx: Option<mpsc::UnboundedSender<DiskWriteMessage>>,
    disk_writer: Mutex<Option<JoinHandle<()>>>,
}

impl TieredCache {
    /// Create a new two-tier cache
    ///
    /// Falls back to a memory-only cache if the L2 directory cannot be created.
    /// Must be called from within a tokio runtime (the disk writer is spawned).
    ///
    /// # Arguments
    /// * `ttl` - Time-to-live for cached objects
    /// * `l1_max_size_bytes` - Maximum L1 (memory) cache size
    /// * `l2_base_path` - Base directory for L2 (disk) cache
    pub async fn new(
        ttl: Duration,
        l1_max_size_bytes: usize,
        l2_base_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let l2_base_path = l2_base_path.as_ref().to_path_buf();

        if let Err(e) = fs::create_dir_all(&l2_base_path).await {
            warn!("Failed to create L2 cache directory {:?}: {}", l2_base_path, e);
            return Ok(Self::memory_only(ttl, l1_max_size_bytes));
        }

        info!(
            "Initializing two-tier cache: L1={}MB, L2={:?}",
            l1_max_size_bytes / 1024 / 1024,
            l2_base_path
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(TieredCacheStats::default()));
        let writer_path = l2_base_path.clone();
        let writer_stats = stats.clone();

        let disk_writer = tokio::spawn(async move {
            Self::disk_writer_task(rx, writer_path, writer_stats).await;
        });

        Ok(TieredCache {
            l1_storage: Arc::new(RwLock::new(HashMap::new())),
            l1_max_size_bytes,
            l1_current_size: Arc::new(RwLock::new(0)),
            l2_base_path,
            l2_enabled: true,
            ttl,
            stats,
            disk_writer_tx: Some(tx),
            disk_writer: Mutex::new(Some(disk_writer)),
        })
    }

    /// Create a memory-only cache (L2 disabled)
    pub fn memory_only(ttl: Duration, l1_max_size_bytes: usize) -> Self {
        info!("Creating memory-only edge cache");

        TieredCache {
            l1_storage: Arc::new(RwLock::new(HashMap::new())),
            l1_max_size_bytes,
            l1_current_size: Arc::new(RwLock::new(0)),
            l2_base_path: PathBuf::new(),
            l2_enabled: false,
            ttl,
            stats: Arc::new(RwLock::new(TieredCacheStats::default())),
            disk_writer_tx: None,
            disk_writer: Mutex::new(None),
        }
    }

    pub fn is_l2_enabled(&self) -> bool {
        self.l2_enabled
    }

    /// Sweep the L2 directory now; returns the number of files removed
    pub async fn sweep_l2(&self) -> u64 {
        let Some(tx) = &self.disk_writer_tx else {
            return 0;
        };
        let (reply, done) = oneshot::channel();
        if tx.send(DiskWriteMessage::Sweep(reply)).is_err() {
            return 0;
        }
        done.await.unwrap_or(0)
    }

    /// Stop the disk writer after it has written everything already queued
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.disk_writer_tx {
            let _ = tx.send(DiskWriteMessage::Shutdown);
        }

        let writer = self
            .disk_writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("Disk writer task ended abnormally: {}", e);
            }
        }
    }

    fn record<F: FnOnce(&mut TieredCacheStats)>(&self, f: F) {
        f(&mut self.stats.write().unwrap_or_else(|e| e.into_inner()));
    }

    /// Look up in L1, dropping the entry if it has expired
    fn lookup_l1(&self, key: &str, now: SystemTime) -> Option<CachedObject> {
        let mut storage = self.l1_storage.write().unwrap_or_else(|e| e.into_inner());
        let entry = storage.get_mut(key)?;

        if entry.expires_at > now {
            entry.last_accessed = now;
            return Some(entry.entry.clone());
        }

        if let Some(removed) = storage.remove(key) {
            let mut size = self.l1_current_size.write().unwrap_or_else(|e| e.into_inner());
            *size = size.saturating_sub(removed.entry.weight());
            debug!("Dropped expired L1 entry: {}", key);
        }
        None
    }

    /// Store in L1 cache with LRU eviction
    fn store_l1(&self, key: &str, entry: CachedObject, expires_at: SystemTime) {
        let data_size = entry.weight();
        let now = SystemTime::now();

        let mut storage = self.l1_storage.write().unwrap_or_else(|e| e.into_inner());
        let mut current_size = self.l1_current_size.write().unwrap_or_else(|e| e.into_inner());

        if let Some(old_entry) = storage.remove(key) {
            *current_size = current_size.saturating_sub(old_entry.entry.weight());
        }

        while *current_size + data_size > self.l1_max_size_bytes && !storage.is_empty() {
            let lru_key = storage
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());

            let Some(lru_key) = lru_key else {
                break;
            };
            if let Some(removed) = storage.remove(&lru_key) {
                *current_size = current_size.saturating_sub(removed.entry.weight());
                debug!("Evicted LRU entry from L1: {}", lru_key);
            }
        }

        storage.insert(
            key.to_string(),
            L1Entry {
                entry,
                expires_at,
                last_accessed: now,
            },
        );
        *current_size += data_size;

        debug!("Stored in L1: {} ({} bytes)", key, data_size);
    }

    /// Lookup in L2 disk cache
    async fn lookup_l2(&self, key: &str) -> Result<Option<(CachedObject, SystemTime)>> {
        let file_path = Self::l2_file_path(&self.l2_base_path, key);

        let data = match fs::read(&file_path).await {
            Ok(data) => data,
            Err(_) => return Ok(None),
        };

        match decode_l2_entry(&data, key) {
            Some((entry, expires_at)) if expires_at > SystemTime::now() => {
                Ok(Some((entry, expires_at)))
            }
            Some(_) => {
                let _ = fs::remove_file(&file_path).await;
                debug!("Dropped expired L2 entry: {}", key);
                Ok(None)
            }
            None => {
                warn!("Discarding unreadable L2 entry {}", file_path.display());
                self.record(|s| s.corrupt_entries += 1);
                let _ = fs::remove_file(&file_path).await;
                Ok(None)
            }
        }
    }

    /// Async disk writer task
    ///
    /// Owns every mutation of the L2 directory: writes, and sweeps at
    /// startup, every [`L2_SWEEP_INTERVAL`] and on request.
    async fn disk_writer_task(
        mut rx: mpsc::UnboundedReceiver<DiskWriteMessage>,
        base_path: PathBuf,
        stats: Arc<RwLock<TieredCacheStats>>,
    ) {
        info!("Disk writer task started");
        // The first tick completes immediately, so the startup sweep runs
        // before any queued message.
        let mut sweep_timer = tokio::time::interval(L2_SWEEP_INTERVAL);

        loop {
            tokio::select! {
                biased;

                _ = sweep_timer.tick() => {
                    Self::sweep_l2_dir(&base_path, &stats).await;
                }
                msg = rx.recv() => match msg {
                    Some(DiskWriteMessage::Write {
                        key,
                        entry,
                        expires_at,
                    }) => {
                        let result = Self::write_to_disk(&base_path, &key, entry, expires_at).await;
                        let mut stats = stats.write().unwrap_or_else(|e| e.into_inner());
                        match result {
                            Ok(()) => stats.disk_writes += 1,
                            Err(e) => {
                                error!("Failed to write to L2 cache: {}", e);
                                stats.disk_errors += 1;
                            }
                        }
                    }
                    Some(DiskWriteMessage::Sweep(reply)) => {
                        let removed = Self::sweep_l2_dir(&base_path, &stats).await;
                        let _ = reply.send(removed);
                    }
                    Some(DiskWriteMessage::Shutdown) | None => {
                        info!("Disk writer task shutting down");
                        break;
                    }
                },
            }
        }
    }

    /// Remove expired frames, corrupt frames and leftover temporary files
    ///
    /// Only called from the disk writer task, so no write is in flight and
    /// any `.tmp` file is from an interrupted earlier run.
    async fn sweep_l2_dir(base_path: &Path, stats: &RwLock<TieredCacheStats>) -> u64 {
        let now = SystemTime::now();
        let mut removed = 0u64;
        let mut corrupt = 0u64;

        for file in list_l2_files(base_path).await {
            let stale = match file.extension().and_then(|e| e.to_str()) {
                Some("tmp") => true,
                Some("entry") => match fs::read(&file).await {
                    Ok(data) => match frame_expiry(&data) {
                        Some(expires_at) => expires_at <= now,
                        None => {
                            corrupt += 1;
                            true
                        }
                    },
                    Err(_) => false,
                },
                _ => false,
            };

            if stale {
                match fs::remove_file(&file).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove stale L2 file {}: {}", file.display(), e),
                }
            }
        }

        if removed > 0 {
            info!("L2 sweep removed {} files ({} corrupt)", removed, corrupt);
        }
        let mut stats = stats.write().unwrap_or_else(|e| e.into_inner());
        stats.swept_files += removed;
        stats.corrupt_entries += corrupt;
        removed
    }

    /// Write an entry to disk
    async fn write_to_disk(
        base_path: &Path,
        key: &str,
        entry: CachedObject,
        expires_at: SystemTime,
    ) -> Result<()> {
        let file_path = Self::l2_file_path(base_path, key);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                EdgeError::CacheError(format!("Failed to create cache directory: {}", e))
            })?;
        }

        let frame = encode_l2_entry(key, entry, expires_at)?;

        // Write to a temporary name first so readers never see a torn file.
        let tmp_path = file_path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
            EdgeError::CacheError(format!("Failed to create cache file: {}", e))
        })?;
        file.write_all(&frame)
            .await
            .map_err(|e| EdgeError::CacheError(format!("Failed to write data: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| EdgeError::CacheError(format!("Failed to sync file: {}", e)))?;
        fs::rename(&tmp_path, &file_path)
            .await
            .map_err(|e| EdgeError::CacheError(format!("Failed to publish cache file: {}", e)))?;

        debug!("Wrote to L2: {} ({} bytes)", key, frame.len());
        Ok(())
    }

    /// L2 file path for a key: two levels of hash-derived directories
    fn l2_file_path(base_path: &Path, key: &str) -> PathBuf {
        let hash = xxhash_rust::xxh3::xxh3_64(key.as_bytes());

        let dir1 = format!("{:02x}", (hash >> 8) & 0xFF);
        let dir2 = format!("{:02x}", hash & 0xFF);

        base_path
            .join(dir1)
            .join(dir2)
            .join(format!("{:016x}.entry", hash))
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> TieredCacheStats {
        let mut stats = self.stats.read().unwrap_or_else(|e| e.into_inner()).clone();

        let storage = self.l1_storage.read().unwrap_or_else(|e| e.into_inner());
        stats.l1_entries = storage.len();
        stats.l1_bytes = *self.l1_current_size.read().unwrap_or_else(|e| e.into_inner());

        stats
    }
}

/// Frame an entry for disk: expiry, crc32 of the payload, bincode payload
fn encode_l2_entry(key: &str, entry: CachedObject, expires_at: SystemTime) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&DiskEntry {
        key: key.to_string(),
        entry,
    })
    .map_err(|e| EdgeError::CacheError(format!("Failed to encode cache entry: {}", e)))?;

    let expires_at_secs = expires_at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut frame = Vec::with_capacity(L2_HEADER_LEN + payload.len());
    frame.extend_from_slice(&expires_at_secs.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Split a frame into its expiry and checksum-verified payload
fn split_frame(data: &[u8]) -> Option<(SystemTime, &[u8])> {
    if data.len() < L2_HEADER_LEN {
        return None;
    }

    let expires_at_secs = u64::from_le_bytes(data[0..8].try_into().ok()?);
    let checksum = u32::from_le_bytes(data[8..12].try_into().ok()?);
    let payload = &data[L2_HEADER_LEN..];

    if crc32fast::hash(payload) != checksum {
        return None;
    }
    Some((UNIX_EPOCH + Duration::from_secs(expires_at_secs), payload))
}

/// Expiry of an intact frame, whatever key it holds
fn frame_expiry(data: &[u8]) -> Option<SystemTime> {
    split_frame(data).map(|(expires_at, _)| expires_at)
}

/// Decode an L2 frame; `None` if it is truncated, corrupt or belongs to another key
fn decode_l2_entry(data: &[u8], key: &str) -> Option<(CachedObject, SystemTime)> {
    let (expires_at, payload) = split_frame(data)?;

    let disk_entry: DiskEntry = bincode::deserialize(payload).ok()?;
    if disk_entry.key != key {
        return None;
    }
    Some((disk_entry.entry, expires_at))
}

/// Every file two directory levels below `base_path`
async fn list_l2_files(base_path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut dirs = vec![(base_path.to_path_buf(), 0u8)];

    while let Some((dir, depth)) = dirs.pop() {
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() && depth < 2 {
                dirs.push((entry.path(), depth + 1));
            } else if file_type.is_file() && depth == 2 {
                files.push(entry.path());
            }
        }
    }
    files
}

#[async_trait]
impl EdgeCache for TieredCache {
    /// Lookup an object (checks L1 then L2)
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedObject>> {
        let key = key.as_str();
        let now = SystemTime::now();

        if let Some(entry) = self.lookup_l1(key, now) {
            self.record(|s| s.l1_hits += 1);
            debug!("L1 cache hit: {}", key);
            return Ok(Some(entry));
        }

        if self.l2_enabled {
            if let Some((entry, expires_at)) = self.lookup_l2(key).await? {
                self.store_l1(key, entry.clone(), expires_at);
                self.record(|s| s.l2_hits += 1);
                debug!("L2 cache hit (promoted to L1): {}", key);
                return Ok(Some(entry));
            }
        }

        self.record(|s| s.misses += 1);
        debug!("Cache miss: {}", key);
        Ok(None)
    }

    /// Store an object in the cache (L1 + async L2)
    async fn store(&self, key: &CacheKey, entry: CachedObject) -> Result<()> {
        if entry.weight() > self.l1_max_size_bytes {
            return Err(EdgeError::CacheError(format!(
                "entry of {} bytes exceeds L1 capacity of {} bytes",
                entry.weight(),
                self.l1_max_size_bytes
            )));
        }

        let key = key.as_str();
        let expires_at = SystemTime::now() + self.ttl;

        self.store_l1(key, entry.clone(), expires_at);

        if self.l2_enabled {
            if let Some(tx) = &self.disk_writer_tx {
                let _ = tx.send(DiskWriteMessage::Write {
                    key: key.to_string(),
                    entry,
                    expires_at,
                });
            }
        }

        Ok(())
    }
}

impl Drop for TieredCache {
    fn drop(&mut self) {
        if let Some(tx) = &self.disk_writer_tx {
            let _ = tx.send(DiskWriteMessage::Shutdown);
        }

        debug!("TieredCache dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectMetadata;
    use bytes::Bytes;

    fn entry(fill: u8, len: usize) -> CachedObject {
        CachedObject::new(
            ObjectMetadata::new(len as u64, "\"e\"").with_content_type("application/wasm"),
            Bytes::from(vec![fill; len]),
        )
    }

    fn key(path: &str) -> CacheKey {
        CacheKey::new(path, None, true)
    }

    #[tokio::test]
    async fn test_l1_cache() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let cache = TieredCache::new(Duration::from_secs(60), 1024 * 1024, temp_dir.path())
            .await
            .unwrap();

        let data = entry(1, 1000);
        cache.store(&key("/file"), data.clone()).await.unwrap();

        let result = cache.lookup(&key("/file")).await.unwrap();
        assert_eq!(result, Some(data));

        let stats = cache.get_stats();
        assert_eq!(stats.l1_hits, 1);
        assert_eq!(stats.l1_entries, 1);
        assert_eq!(stats.l1_bytes, 1000);
    }

    #[tokio::test]
    async fn test_l2_persistence() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let data = entry(2, 1000);

        {
            let cache = TieredCache::new(Duration::from_secs(60), 1024 * 1024, temp_dir.path())
                .await
                .unwrap();
            cache.store(&key("/file2"), data.clone()).await.unwrap();

            // Wait for async write
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(cache.get_stats().disk_writes, 1);
        }

        // New instance simulates a restart
        let cache2 = TieredCache::new(Duration::from_secs(60), 1024 * 1024, temp_dir.path())
            .await
            .unwrap();

        let result = cache2.lookup(&key("/file2")).await.unwrap();
        assert_eq!(result, Some(data));

        let stats = cache2.get_stats();
        assert_eq!(stats.l2_hits, 1);
        assert_eq!(stats.l1_entries, 1);
    }

    #[tokio::test]
    async fn test_expiration() {
        let cache = TieredCache::memory_only(Duration::from_millis(50), 1024 * 1024);
        cache.store(&key("/short"), entry(3, 10)).await.unwrap();
        assert!(cache.lookup(&key("/short")).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.lookup(&key("/short")).await.unwrap().is_none());
        assert_eq!(cache.get_stats().l1_bytes, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = TieredCache::memory_only(Duration::from_secs(60), 1024);

        cache.store(&key("/a"), entry(1, 512)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.store(&key("/b"), entry(2, 512)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.store(&key("/c"), entry(3, 512)).await.unwrap();

        assert!(cache.lookup(&key("/a")).await.unwrap().is_none());
        assert!(cache.lookup(&key("/b")).await.unwrap().is_some());
        assert!(cache.lookup(&key("/c")).await.unwrap().is_some());
        assert_eq!(cache.get_stats().l1_bytes, 1024);
    }

    #[tokio::test]
    async fn test_oversized_entry_rejected() {
        let cache = TieredCache::memory_only(Duration::from_secs(60), 100);
        let result = cache.store(&key("/big"), entry(1, 101)).await;
        assert!(matches!(result, Err(EdgeError::CacheError(_))));
        assert_eq!(cache.get_stats().l1_entries, 0);
    }

    #[test]
    fn test_l2_frame_round_trip_and_corruption() {
        let data = entry(9, 64);
        let expires = SystemTime::now() + Duration::from_secs(60);
        let mut frame = encode_l2_entry("GET /x", data.clone(), expires).unwrap();

        let (decoded, _) = decode_l2_entry(&frame, "GET /x").unwrap();
        assert_eq!(decoded, data);

        // Another key hashing to the same file is not returned
        assert!(decode_l2_entry(&frame, "GET /y").is_none());

        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(decode_l2_entry(&frame, "GET /x").is_none());
        assert!(decode_l2_entry(&frame[..4], "GET /x").is_none());
    }
}
