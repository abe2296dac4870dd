//! Why a request fell back instead of producing a collage.

use std::fmt;

use collage_fetch::FetchError;
use collage_pipeline::PipelineError;

/// Pipeline stage a request reached before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Source count check.
    Validate,
    /// Concurrent retrieval.
    Fetch,
    /// Per-slice detection, cropping and sizing.
    Plan,
    /// Canvas assembly and encoding.
    Compose,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Fetch => "fetch",
            Self::Plan => "plan",
            Self::Compose => "compose",
        };
        f.write_str(name)
    }
}

/// One source that could not be retrieved.
#[derive(Debug)]
pub struct SourceFailure {
    /// Slice position.
    pub index: usize,
    /// Source identifier.
    pub id: String,
    /// What went wrong.
    pub error: FetchError,
}

/// What failed inside one slice's planning task.
#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    /// Detection, cropping or sizing failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The planning task panicked or was cancelled.
    #[error("planning task failed: {0}")]
    Task(String),
}

/// Errors that end a request in fallback.
///
/// None of these reach the caller as a partial image: every variant
/// means no collage was produced.
#[derive(Debug, thiserror::Error)]
pub enum CollageError {
    /// Zero sources, or more than the maximum. Nothing was fetched.
    #[error("expected between 1 and {max} sources, got {count}")]
    InvalidSourceCount {
        /// Number of sources requested.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// At least one source could not be retrieved or decoded.
    #[error("{} of {total} sources failed to fetch", .failures.len())]
    FetchFailure {
        /// Every failed source, in request order.
        failures: Vec<SourceFailure>,
        /// Number of sources requested.
        total: usize,
    },

    /// The batch could not be fetched at all, before any per-source
    /// result existed.
    #[error("fetch aborted: {0}")]
    FetchAborted(#[source] FetchError),

    /// A slice could not be planned or rendered.
    #[error("slice {index} ({id}) failed: {source}")]
    PlanFailure {
        /// Slice position.
        index: usize,
        /// Source identifier.
        id: String,
        /// Underlying failure.
        source: SliceError,
    },

    /// The canvas could not be assembled or encoded.
    #[error("composition failed: {0}")]
    ComposeFailure(#[source] PipelineError),
}

impl CollageError {
    /// The stage that raised this error.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::InvalidSourceCount { .. } => Stage::Validate,
            Self::FetchFailure { .. } | Self::FetchAborted(_) => Stage::Fetch,
            Self::PlanFailure { .. } => Stage::Plan,
            Self::ComposeFailure(_) => Stage::Compose,
        }
    }
}

impl From<FetchError> for CollageError {
    /// Batch-level fetch errors. A count rejected by the fetcher keeps
    /// its own count and limit.
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::InvalidSourceCount { count, max } => {
                Self::InvalidSourceCount { count, max }
            }
            other => Self::FetchAborted(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stage_of_each_kind() {
        let invalid = CollageError::InvalidSourceCount { count: 5, max: 4 };
        assert_eq!(invalid.stage(), Stage::Validate);
        assert_eq!(invalid.to_string(), "expected between 1 and 4 sources, got 5");

        let fetch = CollageError::FetchFailure {
            failures: vec![SourceFailure {
                index: 1,
                id: "b".to_string(),
                error: FetchError::NotFound("b".to_string()),
            }],
            total: 4,
        };
        assert_eq!(fetch.stage(), Stage::Fetch);
        assert_eq!(fetch.to_string(), "1 of 4 sources failed to fetch");

        let plan = CollageError::PlanFailure {
            index: 0,
            id: "a".to_string(),
            source: SliceError::Task("cancelled".to_string()),
        };
        assert_eq!(plan.stage(), Stage::Plan);

        let compose = CollageError::ComposeFailure(PipelineError::EmptyInput);
        assert_eq!(compose.stage(), Stage::Compose);
    }

    #[test]
    fn batch_fetch_errors_keep_their_cause() {
        let rejected = CollageError::from(FetchError::InvalidSourceCount { count: 7, max: 4 });
        assert!(matches!(
            rejected,
            CollageError::InvalidSourceCount { count: 7, max: 4 }
        ));

        let aborted = CollageError::from(FetchError::NotFound("a".to_string()));
        assert_eq!(aborted.stage(), Stage::Fetch);
        assert_eq!(aborted.to_string(), "fetch aborted: source not found: a");
        let cause = std::error::Error::source(&aborted).unwrap();
        assert_eq!(cause.to_string(), "source not found: a");
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Fetch.to_string(), "fetch");
        assert_eq!(Stage::Compose.to_string(), "compose");
    }
}
