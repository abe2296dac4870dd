//! Retrieval of a single source: cache first, upstream on a miss.

use std::sync::Arc;
use std::time::Duration;

use collage_pipeline::RgbaImage;
use tracing::{debug, error, instrument, warn};

use crate::cache::{SourceBytes, SourceCache};
use crate::error::FetchError;
use crate::loader::SourceLoader;
use crate::max_age::parse_max_age;

/// A source that was retrieved and decoded.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    /// Raw encoded bytes as retrieved.
    pub bytes: Vec<u8>,
    /// Decoded image.
    pub image: RgbaImage,
    /// Lifetime advertised for this source, if any.
    pub max_age: Option<Duration>,
    /// Whether the bytes came from the cache.
    pub from_cache: bool,
}

/// Terminal state of one fetch task.
#[derive(Debug)]
pub enum FetchState {
    /// Retrieved and decoded.
    Fetched(FetchedSource),
    /// Retrieval, caching or decoding failed.
    Failed(FetchError),
}

/// One requested source and what became of it.
///
/// `index` is the source's position in the request and therefore its
/// slice position in the output, regardless of when its task finished.
#[derive(Debug)]
pub struct SourceSlot {
    /// Slice position.
    pub index: usize,
    /// Source identifier.
    pub id: String,
    /// Fetch outcome.
    pub state: FetchState,
}

impl SourceSlot {
    /// The fetched source, if retrieval succeeded.
    #[must_use]
    pub const fn fetched(&self) -> Option<&FetchedSource> {
        match &self.state {
            FetchState::Fetched(source) => Some(source),
            FetchState::Failed(_) => None,
        }
    }

    /// The failure, if retrieval failed.
    #[must_use]
    pub const fn error(&self) -> Option<&FetchError> {
        match &self.state {
            FetchState::Fetched(_) => None,
            FetchState::Failed(e) => Some(e),
        }
    }

    /// Returns `true` if retrieval succeeded.
    #[must_use]
    pub const fn is_fetched(&self) -> bool {
        matches!(self.state, FetchState::Fetched(_))
    }
}

/// Retrieves and decodes one source at a time.
///
/// Cheap to clone; the cache and loader are shared.
#[derive(Clone)]
pub struct SourceFetcher {
    cache: Arc<dyn SourceCache>,
    loader: Arc<dyn SourceLoader>,
}

impl SourceFetcher {
    /// Create a fetcher over a shared cache and loader.
    pub fn new(cache: Arc<dyn SourceCache>, loader: Arc<dyn SourceLoader>) -> Self {
        Self { cache, loader }
    }

    /// Fetch `id` for slice `index`. Never fails; failures are recorded
    /// in the returned slot.
    #[instrument(name = "source_fetch", skip(self, id), fields(source = %id))]
    pub async fn fetch(&self, index: usize, id: &str) -> SourceSlot {
        let state = match self.retrieve(id).await {
            Ok(source) => {
                debug!(
                    bytes = source.bytes.len(),
                    width = source.image.width(),
                    height = source.image.height(),
                    from_cache = source.from_cache,
                    max_age = ?source.max_age,
                    "source fetched"
                );
                FetchState::Fetched(source)
            }
            Err(e) => {
                error!(error = %e, "source fetch failed");
                FetchState::Failed(e)
            }
        };
        SourceSlot {
            index,
            id: id.to_string(),
            state,
        }
    }

    async fn retrieve(&self, id: &str) -> Result<FetchedSource, FetchError> {
        if let Some(entry) = self.cache.get(id).await? {
            return decode(id, entry, true).await;
        }

        let entry = self.loader.load(id).await?;
        let fetched = decode(id, entry, false).await?;

        let write_back = SourceBytes {
            bytes: fetched.bytes.clone(),
            cache_control: None,
        };
        let write_back = match fetched.max_age {
            Some(age) => write_back.with_cache_control(format!("max-age={}", age.as_secs())),
            None => write_back,
        };
        if let Err(e) = self.cache.put(id, &write_back).await {
            warn!(error = %e, "could not store source in cache");
            return Err(e);
        }
        Ok(fetched)
    }
}

/// Decode on the blocking pool; image decoding is CPU-bound.
async fn decode(
    id: &str,
    entry: SourceBytes,
    from_cache: bool,
) -> Result<FetchedSource, FetchError> {
    let max_age = entry.cache_control.as_deref().and_then(parse_max_age);
    let SourceBytes { bytes, .. } = entry;

    let joined = tokio::task::spawn_blocking(move || {
        let decoded = collage_pipeline::codec::decode(&bytes);
        (bytes, decoded)
    })
    .await
    .map_err(|e| FetchError::Task {
        id: id.to_string(),
        message: e.to_string(),
    })?;

    match joined {
        (bytes, Ok(image)) => Ok(FetchedSource {
            bytes,
            image,
            max_age,
            from_cache,
        }),
        (_, Err(source)) => Err(FetchError::Decode {
            id: id.to_string(),
            source,
        }),
    }
}
