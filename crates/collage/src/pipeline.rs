//! The request state machine, one type per stage.
//!
//! ```rust,ignore
//! let result = Init::new(request, config)
//!     .validate()?
//!     .fetch(&orchestrator)
//!     .await?
//!     .plan(detector, false)
//!     .await?
//!     .compose()?;
//! ```
//!
//! Each stage method consumes `self` and returns the next stage or the
//! error that ends the request. There is no way to reach composition
//! with a failed source: [`Validated::fetch`] only yields [`Fetched`]
//! when every slot succeeded, and [`Fetched::plan`] only yields
//! [`Planned`] when every slice rendered. Fetched bytes are dropped at
//! the fetch boundary; only decoded images move on.

use std::sync::Arc;
use std::time::Duration;

use collage_fetch::{FetchOrchestrator, FetchState};
use collage_pipeline::{
    CollageConfig, Dimensions, FeatureDetector, FeatureRegion, MAX_SOURCES, PipelineError,
    RgbaImage, SlicePlan, annotate, codec, divide,
};
use tracing::{debug, error, info};

use crate::error::{CollageError, SliceError, SourceFailure};
use crate::request::CollageRequest;

// ───────────────────────── Stage 0: Init ─────────────────────────────

/// A request that has not been checked yet.
#[must_use = "pipeline stages are consumed by advancing — call .validate() to continue"]
pub struct Init {
    request: CollageRequest,
    config: Arc<CollageConfig>,
}

impl Init {
    /// Start a request.
    pub const fn new(request: CollageRequest, config: Arc<CollageConfig>) -> Self {
        Self { request, config }
    }

    /// Check the source count against `[1, MAX_SOURCES]`.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::InvalidSourceCount`] outside that range.
    pub fn validate(self) -> Result<Validated, CollageError> {
        let count = self.request.sources.len();
        if count == 0 || count > MAX_SOURCES {
            return Err(CollageError::InvalidSourceCount {
                count,
                max: MAX_SOURCES,
            });
        }
        Ok(Validated {
            request: self.request,
            config: self.config,
        })
    }
}

// ───────────────────────── Stage 1: Validated ────────────────────────

/// A request with an acceptable number of sources.
#[must_use = "pipeline stages are consumed by advancing — call .fetch() to continue"]
pub struct Validated {
    request: CollageRequest,
    config: Arc<CollageConfig>,
}

impl Validated {
    /// The request being processed.
    #[must_use]
    pub const fn request(&self) -> &CollageRequest {
        &self.request
    }

    /// Fetch every source concurrently and wait for all of them.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::FetchFailure`] listing every source that
    /// failed. Sibling fetches are never cancelled, so the list is
    /// complete. A batch the fetcher refuses outright is reported
    /// through [`CollageError::from`].
    pub async fn fetch(self, orchestrator: &FetchOrchestrator) -> Result<Fetched, CollageError> {
        let total = self.request.sources.len();
        let report = orchestrator
            .fetch_all(&self.request.sources, self.request.default_max_age)
            .await?;

        let max_age = report.max_age;
        let mut sources = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for slot in report.slots {
            match slot.state {
                FetchState::Fetched(fetched) => sources.push(FetchedImage {
                    index: slot.index,
                    id: slot.id,
                    image: fetched.image,
                }),
                FetchState::Failed(error) => failures.push(SourceFailure {
                    index: slot.index,
                    id: slot.id,
                    error,
                }),
            }
        }
        if !failures.is_empty() {
            return Err(CollageError::FetchFailure { failures, total });
        }

        Ok(Fetched {
            canvas: self.request.canvas(),
            max_age,
            config: self.config,
            sources,
        })
    }
}

// ───────────────────────── Stage 2: Fetched ──────────────────────────

struct FetchedImage {
    index: usize,
    id: String,
    image: RgbaImage,
}

/// Every source retrieved and decoded, in request order.
#[must_use = "pipeline stages are consumed by advancing — call .plan() to continue"]
pub struct Fetched {
    canvas: Dimensions,
    max_age: Duration,
    config: Arc<CollageConfig>,
    sources: Vec<FetchedImage>,
}

impl Fetched {
    /// Effective cache lifetime of the request.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Plan and render every slice, one blocking task per slice.
    ///
    /// With `with_annotation` set, each slice also carries a debug
    /// rendering of its plan.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::PlanFailure`] for the first slice, in
    /// slice order, whose planning failed. Every failure is logged.
    pub async fn plan(
        self,
        detector: Arc<dyn FeatureDetector>,
        with_annotation: bool,
    ) -> Result<Planned, CollageError> {
        let parts = u32::try_from(self.sources.len()).unwrap_or(u32::MAX);
        let widths = divide(self.canvas.width, parts);
        debug!(widths = ?widths.widths(), "slice widths");

        let ids: Vec<(usize, String)> = self
            .sources
            .iter()
            .map(|s| (s.index, s.id.clone()))
            .collect();

        let handles: Vec<_> = self
            .sources
            .into_iter()
            .map(|source| {
                let detector = Arc::clone(&detector);
                let config = Arc::clone(&self.config);
                let slice_width = widths.width_of(source.index);
                let canvas_height = self.canvas.height;
                tokio::task::spawn_blocking(move || {
                    plan_slice(
                        source.index,
                        &source.image,
                        detector.as_ref(),
                        canvas_height,
                        slice_width,
                        &config,
                        with_annotation,
                    )
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let mut slices = Vec::with_capacity(joined.len());
        let mut first_failure = None;
        for ((index, id), result) in ids.into_iter().zip(joined) {
            let outcome = result
                .map_err(|e| SliceError::Task(e.to_string()))
                .and_then(|r| r.map_err(SliceError::from));
            match outcome {
                Ok(slice) => slices.push(slice.with_id(id)),
                Err(source) => {
                    error!(index, source = %id, error = %source, "slice planning failed");
                    first_failure.get_or_insert(CollageError::PlanFailure { index, id, source });
                }
            }
        }
        if let Some(failure) = first_failure {
            return Err(failure);
        }

        Ok(Planned {
            canvas: self.canvas,
            max_age: self.max_age,
            config: self.config,
            slices,
        })
    }
}

/// Detect, plan and render one slice, adding its annotation when asked.
fn plan_slice(
    index: usize,
    source: &RgbaImage,
    detector: &dyn FeatureDetector,
    canvas_height: u32,
    slice_width: u32,
    config: &CollageConfig,
    with_annotation: bool,
) -> Result<PlannedSlice, PipelineError> {
    let slice = collage_pipeline::process_slice(
        index,
        source,
        detector,
        canvas_height,
        slice_width,
        config,
    )?;
    let annotation = with_annotation.then(|| {
        annotate::annotate(source, &slice.regions, &slice.plan, config.resample_filter)
    });
    debug!(
        index,
        regions = slice.regions.len(),
        origin = ?slice.plan.focal_origin,
        identity = slice.plan.identity,
        "slice planned"
    );
    Ok(PlannedSlice {
        id: String::new(),
        plan: slice.plan,
        regions: slice.regions,
        rendered: slice.image,
        annotation,
    })
}

// ───────────────────────── Stage 3: Planned ──────────────────────────

/// One rendered slice and how it was derived.
#[derive(Debug, Clone)]
pub struct PlannedSlice {
    /// Source identifier.
    pub id: String,
    /// Crop and sizing decisions.
    pub plan: SlicePlan,
    /// Features the detector reported, in source coordinates.
    pub regions: Vec<FeatureRegion>,
    /// The slice, exactly `plan.target` in size.
    pub rendered: RgbaImage,
    /// Debug rendering of the plan, when requested.
    pub annotation: Option<RgbaImage>,
}

impl PlannedSlice {
    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

/// Every slice rendered, in slice order.
#[must_use = "pipeline stages are consumed by advancing — call .compose() to continue"]
pub struct Planned {
    canvas: Dimensions,
    max_age: Duration,
    config: Arc<CollageConfig>,
    slices: Vec<PlannedSlice>,
}

impl Planned {
    /// Rendered slices in slice order.
    #[must_use]
    pub fn slices(&self) -> &[PlannedSlice] {
        &self.slices
    }

    /// Paste every slice onto the canvas and encode it.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::ComposeFailure`] if a slice does not fit
    /// the canvas or encoding fails.
    pub fn compose(self) -> Result<CollageResult, CollageError> {
        let pairs: Vec<(SlicePlan, RgbaImage)> = self
            .slices
            .iter()
            .map(|s| (s.plan, s.rendered.clone()))
            .collect();
        let composition = collage_pipeline::compose(
            self.canvas.width,
            self.canvas.height,
            self.config.background,
            &pairs,
        )
        .map_err(CollageError::ComposeFailure)?;
        let bytes = codec::encode(&composition.canvas, self.config.output_format)
            .map_err(CollageError::ComposeFailure)?;

        info!(
            width = self.canvas.width,
            height = self.canvas.height,
            bytes = bytes.len(),
            max_age_secs = self.max_age.as_secs(),
            "collage composed"
        );

        Ok(CollageResult {
            image: composition.canvas,
            bytes,
            max_age: self.max_age,
            offsets: composition.offsets,
            slices: self.slices,
        })
    }
}

// ───────────────────────── Result ────────────────────────────────────

/// A composed collage.
#[derive(Debug, Clone)]
pub struct CollageResult {
    /// The canvas, exactly the requested size.
    pub image: RgbaImage,
    /// The canvas encoded in the configured format. Empty for a
    /// zero-area canvas.
    pub bytes: Vec<u8>,
    /// Shortest of the default lifetime and every source's advertised
    /// lifetime.
    pub max_age: Duration,
    /// Horizontal offset of each slice.
    pub offsets: Vec<u64>,
    /// Per-slice plans and renderings, in slice order.
    pub slices: Vec<PlannedSlice>,
}
