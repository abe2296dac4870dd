//! collage-pipeline: Pure slice planning and composition (sans-IO).
//!
//! Turns decoded source images into the vertical strips of a horizontal
//! collage and pastes them onto one canvas:
//! divide width -> detect features -> focal point -> fit/crop/size ->
//! compose.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! images and byte slices. Retrieval and caching live in
//! `collage-fetch`; sequencing and the failure policy live in
//! `collage`.

pub mod annotate;
pub mod codec;
pub mod compose;
pub mod crop;
pub mod detect;
pub mod divide;
pub mod focal;
pub mod resample;
pub mod types;

pub use compose::{Composition, compose};
pub use crop::{RenderedSlice, plan, process_slice, render};
pub use detect::{DetectError, FeatureDetector, FixedFeatures, NoFeatures};
pub use divide::{SliceWidths, divide};
pub use resample::ResampleFilter;
pub use types::{
    CollageConfig, CropWindow, Dimensions, FeatureRegion, FocalOrigin, FocalPoint, GrayImage,
    MAX_SOURCES, OutputFormat, PipelineError, Rgba, RgbaImage, SlicePlan,
};

#[cfg(feature = "seeta")]
pub use detect::SeetaFaceDetector;
