//! collage: All-or-nothing horizontal collages.
//!
//! A [`Collage`] takes a [`CollageRequest`] of one to four sources,
//! fetches them concurrently, crops each around its detected features
//! and pastes the slices side by side. If anything goes wrong at any
//! stage, no partial image is produced: the outcome is a
//! [`CollageOutcome::Fallback`] and the caller serves its own default
//! image instead.
//!
//! The stages are available individually in [`pipeline`] for callers
//! that want to inspect intermediate results.

pub mod error;
pub mod pipeline;
pub mod request;

use std::sync::Arc;

use collage_fetch::FetchOrchestrator;
use collage_pipeline::{CollageConfig, FeatureDetector, PipelineError};
use tracing::{instrument, warn};

pub use error::{CollageError, SliceError, SourceFailure, Stage};
pub use pipeline::{CollageResult, PlannedSlice};
pub use request::{CollageRequest, SOURCE_SEPARATOR, parse_sources};

/// What a request produced.
#[derive(Debug)]
pub enum CollageOutcome {
    /// A complete collage.
    Composed(CollageResult),
    /// Nothing was produced; the caller should use its fallback image.
    Fallback(CollageError),
}

impl CollageOutcome {
    /// Returns `true` if the caller should serve its fallback image.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// The composed collage, if any.
    #[must_use]
    pub const fn composed(&self) -> Option<&CollageResult> {
        match self {
            Self::Composed(result) => Some(result),
            Self::Fallback(_) => None,
        }
    }

    /// Convert into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`CollageError`] that caused the fallback.
    pub fn into_result(self) -> Result<CollageResult, CollageError> {
        match self {
            Self::Composed(result) => Ok(result),
            Self::Fallback(error) => Err(error),
        }
    }
}

/// The collage service: a fetcher, a feature detector and a
/// configuration shared across requests.
#[derive(Clone)]
pub struct Collage {
    orchestrator: FetchOrchestrator,
    detector: Arc<dyn FeatureDetector>,
    config: Arc<CollageConfig>,
    annotate: bool,
}

impl Collage {
    /// Create a service.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(
        orchestrator: FetchOrchestrator,
        detector: Arc<dyn FeatureDetector>,
        config: CollageConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            orchestrator,
            detector,
            config: Arc::new(config),
            annotate: false,
        })
    }

    /// Also render a debug annotation for every slice.
    #[must_use]
    pub const fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// The configuration every request runs with.
    #[must_use]
    pub fn config(&self) -> &CollageConfig {
        &self.config
    }

    /// Run a request to completion.
    ///
    /// Never fails: errors become [`CollageOutcome::Fallback`] and are
    /// logged.
    #[instrument(
        name = "collage",
        skip(self, request),
        fields(sources = request.sources.len(), width = request.width, height = request.height)
    )]
    pub async fn run(&self, request: CollageRequest) -> CollageOutcome {
        match self.try_run(request).await {
            Ok(result) => CollageOutcome::Composed(result),
            Err(error) => {
                warn!(stage = %error.stage(), error = %error, "collage falling back");
                CollageOutcome::Fallback(error)
            }
        }
    }

    /// Run a request, returning the first error instead of a fallback.
    ///
    /// # Errors
    ///
    /// Returns the [`CollageError`] of the stage that stopped the
    /// request.
    pub async fn try_run(&self, request: CollageRequest) -> Result<CollageResult, CollageError> {
        pipeline::Init::new(request, Arc::clone(&self.config))
            .validate()?
            .fetch(&self.orchestrator)
            .await?
            .plan(Arc::clone(&self.detector), self.annotate)
            .await?
            .compose()
    }
}
