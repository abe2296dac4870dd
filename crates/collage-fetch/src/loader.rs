//! Upstream retrieval of sources the cache does not have.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CACHE_CONTROL;

use crate::cache::SourceBytes;
use crate::error::FetchError;

/// Upstream retrieval trait.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Retrieve the raw bytes of `id`.
    async fn load(&self, id: &str) -> Result<SourceBytes, FetchError>;
}

/// Loads sources from files under a root directory.
///
/// Identifiers are relative paths; absolute paths and `..` components
/// are rejected so a request cannot escape the root.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Loader rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if id.is_empty() || escapes {
            return Err(FetchError::InvalidIdentifier {
                id: id.to_string(),
                reason: "must be a relative path inside the source root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SourceLoader for FsLoader {
    async fn load(&self, id: &str) -> Result<SourceBytes, FetchError> {
        let path = self.resolve(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(SourceBytes::new(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(id.to_string()))
            }
            Err(source) => Err(FetchError::Io {
                id: id.to_string(),
                source,
            }),
        }
    }
}

/// Loads sources over HTTP(S). Identifiers are absolute URLs.
#[derive(Debug, Clone, Default)]
pub struct HttpLoader {
    client: Client,
}

impl HttpLoader {
    /// Loader using `client`.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceLoader for HttpLoader {
    async fn load(&self, id: &str) -> Result<SourceBytes, FetchError> {
        let http_error = |source| FetchError::Http {
            id: id.to_string(),
            source,
        };

        let response = self.client.get(id).send().await.map_err(http_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }

        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(http_error)?;

        Ok(SourceBytes {
            bytes: bytes.to_vec(),
            cache_control,
        })
    }
}

/// Routes `http://` and `https://` identifiers to an [`HttpLoader`] and
/// everything else to an [`FsLoader`].
#[derive(Debug, Clone)]
pub struct SchemeLoader {
    http: HttpLoader,
    fs: FsLoader,
}

impl SchemeLoader {
    /// Combine the two loaders.
    #[must_use]
    pub const fn new(http: HttpLoader, fs: FsLoader) -> Self {
        Self { http, fs }
    }

    /// Whether `id` is served by the HTTP loader.
    #[must_use]
    pub fn is_remote(id: &str) -> bool {
        let lower = id.get(..8).unwrap_or(id).to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

#[async_trait]
impl SourceLoader for SchemeLoader {
    async fn load(&self, id: &str) -> Result<SourceBytes, FetchError> {
        if Self::is_remote(id) {
            self.http.load(id).await
        } else {
            self.fs.load(id).await
        }
    }
}
