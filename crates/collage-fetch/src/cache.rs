//! Source cache: a shared key-value store consulted before upstream.
//!
//! Each fetch task reads and writes only the entry for its own
//! identifier. Concurrency safety of the store itself is the backend's
//! responsibility.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::FetchError;

/// Raw source bytes plus the `Cache-Control` value they were served
/// with, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBytes {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Advertised `Cache-Control` header value.
    pub cache_control: Option<String>,
}

impl SourceBytes {
    /// Bytes without any cache metadata.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            cache_control: None,
        }
    }

    /// Attach a `Cache-Control` value.
    #[must_use]
    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }
}

/// Cache storage trait.
#[async_trait]
pub trait SourceCache: Send + Sync {
    /// Look up `id`. A miss is `Ok(None)`.
    async fn get(&self, id: &str) -> Result<Option<SourceBytes>, FetchError>;

    /// Store `entry` under `id`, replacing any previous entry.
    async fn put(&self, id: &str, entry: &SourceBytes) -> Result<(), FetchError>;
}

/// In-process cache backed by a map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, SourceBytes>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |e| e.len())
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SourceCache for MemoryCache {
    async fn get(&self, id: &str) -> Result<Option<SourceBytes>, FetchError> {
        let entries = self.entries.read().map_err(|e| FetchError::Cache {
            id: id.to_string(),
            message: format!("cache lock poisoned: {e}"),
        })?;
        Ok(entries.get(id).cloned())
    }

    async fn put(&self, id: &str, entry: &SourceBytes) -> Result<(), FetchError> {
        let mut entries = self.entries.write().map_err(|e| FetchError::Cache {
            id: id.to_string(),
            message: format!("cache lock poisoned: {e}"),
        })?;
        entries.insert(id.to_string(), entry.clone());
        Ok(())
    }
}

/// Content-addressed cache on the local filesystem.
///
/// Identifiers are hashed with SipHash-1-3 into `<root>/<hex>.bin` for
/// the bytes and `<root>/<hex>.meta` for the `Cache-Control` value.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    /// Cache rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex key for `id`.
    #[must_use]
    pub fn key(id: &str) -> String {
        use std::hash::Hasher;

        let mut hasher = siphasher::sip::SipHasher13::new();
        hasher.write(id.as_bytes());
        format!("{:016x}", hasher.finish())
    }

    fn paths(&self, id: &str) -> (PathBuf, PathBuf) {
        let key = Self::key(id);
        (
            self.root.join(format!("{key}.bin")),
            self.root.join(format!("{key}.meta")),
        )
    }
}

fn cache_error(id: &str, e: &std::io::Error) -> FetchError {
    FetchError::Cache {
        id: id.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl SourceCache for FsCache {
    async fn get(&self, id: &str) -> Result<Option<SourceBytes>, FetchError> {
        let (data_path, meta_path) = self.paths(id);
        let bytes = match tokio::fs::read(&data_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error(id, &e)),
        };
        let cache_control = match tokio::fs::read_to_string(&meta_path).await {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(cache_error(id, &e)),
        };
        Ok(Some(SourceBytes {
            bytes,
            cache_control,
        }))
    }

    async fn put(&self, id: &str, entry: &SourceBytes) -> Result<(), FetchError> {
        let (data_path, meta_path) = self.paths(id);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| cache_error(id, &e))?;
        tokio::fs::write(&data_path, &entry.bytes)
            .await
            .map_err(|e| cache_error(id, &e))?;
        match &entry.cache_control {
            Some(value) => tokio::fs::write(&meta_path, value)
                .await
                .map_err(|e| cache_error(id, &e))?,
            None => match tokio::fs::remove_file(&meta_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(cache_error(id, &e)),
            },
        }
        Ok(())
    }
}
