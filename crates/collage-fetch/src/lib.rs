//! collage-fetch: Concurrent, cache-first retrieval of collage sources.
//!
//! Every source of a request is fetched on its own task. Each task
//! consults a [`SourceCache`] first, falls back to a [`SourceLoader`]
//! on a miss, decodes the bytes and writes them back to the cache. The
//! [`FetchOrchestrator`] joins all tasks without cancelling siblings and
//! reports per-source outcomes in request order together with the
//! effective cache lifetime.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod max_age;
pub mod orchestrator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{FsCache, MemoryCache, SourceBytes, SourceCache};
pub use error::FetchError;
pub use fetcher::{FetchState, FetchedSource, SourceFetcher, SourceSlot};
pub use loader::{FsLoader, HttpLoader, SchemeLoader, SourceLoader};
pub use max_age::{effective_max_age, parse_max_age};
pub use orchestrator::{FetchOrchestrator, FetchReport, validate_count};
