//! Backing object store interface and local backends
//!
//! The edge proxy only depends on the [`ObjectStore`] trait. Two local
//! backends live here: an in-process map and a directory on disk. The remote
//! HTTP backend is in [`crate::origin_store`].

use crate::error::{EdgeError, Result};
use crate::models::{ByteRange, ObjectKey, ObjectMetadata, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Read access to the durable blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, optionally restricted to a byte interval.
    ///
    /// With a range, only that interval is read and `body` holds exactly
    /// `range.size()` bytes; `metadata.size` still reports the total size.
    /// Returns `Ok(None)` when the key is absent.
    async fn get(&self, key: &ObjectKey, range: Option<ByteRange>) -> Result<Option<StoredObject>>;

    /// Fetch metadata only, without transferring the body
    async fn head(&self, key: &ObjectKey) -> Result<Option<ObjectMetadata>>;
}

/// Quoted entity tag derived from content bytes
pub fn content_etag(data: &[u8]) -> String {
    format!("\"{:016x}\"", xxhash_rust::xxh3::xxh3_64(data))
}

fn check_range(range: &ByteRange, size: u64) -> Result<()> {
    if range.end >= size {
        return Err(EdgeError::UnsatisfiableRange(format!(
            "range {}-{} exceeds object size {}",
            range.start, range.end, size
        )));
    }
    Ok(())
}

struct MemoryObject {
    body: Bytes,
    metadata: ObjectMetadata,
}

/// In-process object store, used for tests and demos
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, MemoryObject>>,
    gets: AtomicU64,
    heads: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object and return its entity tag
    pub fn put(&self, key: &str, body: impl Into<Bytes>) -> String {
        self.put_with_metadata(key, body, None, None)
    }

    /// Seed an object with store-side content-type and cache-control metadata
    pub fn put_with_metadata(
        &self,
        key: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
        cache_control: Option<&str>,
    ) -> String {
        let body = body.into();
        let etag = content_etag(&body);
        let metadata = ObjectMetadata {
            size: Some(body.len() as u64),
            etag: Some(etag.clone()),
            content_type: content_type.map(str::to_string),
            cache_control: cache_control.map(str::to_string),
        };

        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), MemoryObject { body, metadata });
        etag
    }

    /// Simulate an outage: every call fails with `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of `get` calls served so far
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of `head` calls served so far
    pub fn head_count(&self) -> u64 {
        self.heads.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(EdgeError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &ObjectKey, range: Option<ByteRange>) -> Result<Option<StoredObject>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let Some(object) = objects.get(key.as_str()) else {
            return Ok(None);
        };

        let body = match range {
            Some(range) => {
                check_range(&range, object.body.len() as u64)?;
                object.body.slice(range.start as usize..=range.end as usize)
            }
            None => object.body.clone(),
        };

        Ok(Some(StoredObject::new(object.metadata.clone(), body)))
    }

    async fn head(&self, key: &ObjectKey) -> Result<Option<ObjectMetadata>> {
        self.heads.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects.get(key.as_str()).map(|o| o.metadata.clone()))
    }
}

/// Object store backed by a directory tree
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FsObjectStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Map a key onto the root directory; keys escaping the root resolve to nothing
    fn resolve_path(&self, key: &ObjectKey) -> Option<PathBuf> {
        let relative = Path::new(key.as_str());
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            debug!("Rejecting key outside store root: {}", key);
            return None;
        }
        Some(self.root.join(relative))
    }

    async fn file_metadata(&self, path: &Path) -> Result<Option<ObjectMetadata>> {
        let meta = match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EdgeError::StoreUnavailable(format!(
                    "Failed to stat {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mtime_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let fingerprint = format!("{}:{}", meta.len(), mtime_nanos);

        Ok(Some(ObjectMetadata {
            size: Some(meta.len()),
            etag: Some(content_etag(fingerprint.as_bytes())),
            content_type: None,
            cache_control: None,
        }))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &ObjectKey, range: Option<ByteRange>) -> Result<Option<StoredObject>> {
        let Some(path) = self.resolve_path(key) else {
            return Ok(None);
        };
        let Some(metadata) = self.file_metadata(&path).await? else {
            return Ok(None);
        };

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EdgeError::StoreUnavailable(format!(
                    "Failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let body = match range {
            Some(range) => {
                check_range(&range, metadata.size.unwrap_or_default())?;
                file.seek(SeekFrom::Start(range.start)).await?;
                let mut buf = vec![0u8; range.size() as usize];
                file.read_exact(&mut buf).await?;
                buf
            }
            None => {
                let mut buf = Vec::with_capacity(metadata.size.unwrap_or_default() as usize);
                file.read_to_end(&mut buf).await?;
                buf
            }
        };

        debug!("Read {} bytes from {}", body.len(), path.display());
        Ok(Some(StoredObject::new(metadata, Bytes::from(body))))
    }

    async fn head(&self, key: &ObjectKey) -> Result<Option<ObjectMetadata>> {
        let Some(path) = self.resolve_path(key) else {
            return Ok(None);
        };
        self.file_metadata(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ObjectKey {
        ObjectKey::from_path(s, "index.html")
    }

    #[tokio::test]
    async fn test_memory_store_get_and_head() {
        let store = MemoryObjectStore::new();
        let etag = store.put("a.txt", Bytes::from_static(b"hello world"));

        let object = store.get(&key("a.txt"), None).await.unwrap().unwrap();
        assert_eq!(object.body, Bytes::from_static(b"hello world"));
        assert_eq!(object.metadata.etag.as_deref(), Some(etag.as_str()));
        assert_eq!(object.metadata.size, Some(11));

        let meta = store.head(&key("a.txt")).await.unwrap().unwrap();
        assert_eq!(meta.size, Some(11));
        assert_eq!(store.get_count(), 1);
        assert_eq!(store.head_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_ranged_read() {
        let store = MemoryObjectStore::new();
        store.put("a.txt", Bytes::from_static(b"hello world"));

        let range = ByteRange::new(6, 10).unwrap();
        let object = store.get(&key("a.txt"), Some(range)).await.unwrap().unwrap();
        assert_eq!(object.body, Bytes::from_static(b"world"));
        assert_eq!(object.metadata.size, Some(11));

        let beyond = ByteRange::new(6, 11).unwrap();
        assert!(store.get(&key("a.txt"), Some(beyond)).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_absent_and_unavailable() {
        let store = MemoryObjectStore::new();
        assert!(store.get(&key("missing"), None).await.unwrap().is_none());

        store.set_unavailable(true);
        let err = store.head(&key("missing")).await.unwrap_err();
        assert!(matches!(err, EdgeError::StoreUnavailable(_)));
    }

    #[test]
    fn test_content_etag_is_quoted_and_stable() {
        let a = content_etag(b"abc");
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_eq!(a, content_etag(b"abc"));
        assert_ne!(a, content_etag(b"abd"));
    }

    #[tokio::test]
    async fn test_fs_store_reads_files_and_ranges() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("Build")).await.unwrap();
        tokio::fs::write(dir.path().join("Build/game.data"), vec![7u8; 1000])
            .await
            .unwrap();

        let store = FsObjectStore::new(dir.path());
        let object = store.get(&key("/Build/game.data"), None).await.unwrap().unwrap();
        assert_eq!(object.body.len(), 1000);
        assert!(object.metadata.etag.is_some());

        let range = ByteRange::new(900, 999).unwrap();
        let partial = store
            .get(&key("/Build/game.data"), Some(range))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(partial.body.len(), 100);
        assert_eq!(partial.metadata.size, Some(1000));

        let meta = store.head(&key("/Build/game.data")).await.unwrap().unwrap();
        assert_eq!(meta.etag, object.metadata.etag);
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
        let store = FsObjectStore::new(dir.path().join("sub"));

        assert!(store.get(&key("/../secret"), None).await.unwrap().is_none());
        assert!(store.head(&key("/missing.txt")).await.unwrap().is_none());

        let parent = FsObjectStore::new(dir.path());
        assert!(parent.head(&key("/sub")).await.unwrap().is_none());
    }
}
