//! Error types for source retrieval.

use collage_pipeline::PipelineError;

/// Errors that can occur while retrieving one source, or while
/// validating a batch before any retrieval starts.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The batch has zero sources or more than the allowed maximum.
    #[error("expected between 1 and {max} sources, got {count}")]
    InvalidSourceCount {
        /// Number of sources requested.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// The source does not exist upstream.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The identifier cannot be mapped to a location.
    #[error("invalid source identifier {id:?}: {reason}")]
    InvalidIdentifier {
        /// The identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reading from or writing to the cache failed.
    #[error("cache error for {id}: {message}")]
    Cache {
        /// Source identifier.
        id: String,
        /// Backend message.
        message: String,
    },

    /// Filesystem retrieval failed.
    #[error("io error for {id}: {source}")]
    Io {
        /// Source identifier.
        id: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// HTTP transport failed.
    #[error("http error for {id}: {source}")]
    Http {
        /// Source identifier.
        id: String,
        /// Underlying error.
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {status} for {id}")]
    Status {
        /// Source identifier.
        id: String,
        /// HTTP status code.
        status: u16,
    },

    /// The retrieved bytes are not a usable image.
    #[error("failed to decode {id}: {source}")]
    Decode {
        /// Source identifier.
        id: String,
        /// Underlying error.
        source: PipelineError,
    },

    /// The fetch task panicked or was aborted.
    #[error("fetch task for {id} did not complete: {message}")]
    Task {
        /// Source identifier.
        id: String,
        /// Join error description.
        message: String,
    },
}
