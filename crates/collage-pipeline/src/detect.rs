//! Feature detection capability.
//!
//! The crop planner treats detection as a black box: given a grayscale
//! copy of the decoded source it returns zero or more weighted boxes.
//! An empty result is legitimate and makes the planner fall back to
//! top-center alignment.
//!
//! Implementations must be shareable across threads. Any expensive
//! state (a loaded cascade model, say) is initialized once and then
//! only read; [`FeatureDetector::detect`] takes `&self`.

use crate::types::{FeatureRegion, GrayImage};

/// Errors a detector may report.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The detection model could not be loaded.
    #[error("failed to load detection model: {0}")]
    Model(String),

    /// The backend failed while scanning the image.
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// Pluggable feature detection backend.
pub trait FeatureDetector: Send + Sync {
    /// Detect features in `image`. Coordinates are in the pixel space of
    /// `image` itself.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError`] when the backend cannot run at all.
    /// Finding nothing is not an error.
    fn detect(&self, image: &GrayImage) -> Result<Vec<FeatureRegion>, DetectError>;
}

/// Detector that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeatures;

impl FeatureDetector for NoFeatures {
    fn detect(&self, _image: &GrayImage) -> Result<Vec<FeatureRegion>, DetectError> {
        Ok(Vec::new())
    }
}

/// Detector that returns the same regions for every image.
///
/// Regions lying partly outside an image are clipped to it, and regions
/// lying entirely outside are dropped, so one fixture can be shared by
/// sources of different sizes.
#[derive(Debug, Clone, Default)]
pub struct FixedFeatures {
    regions: Vec<FeatureRegion>,
}

impl FixedFeatures {
    /// Create a detector reporting `regions`.
    #[must_use]
    pub const fn new(regions: Vec<FeatureRegion>) -> Self {
        Self { regions }
    }
}

impl FeatureDetector for FixedFeatures {
    fn detect(&self, image: &GrayImage) -> Result<Vec<FeatureRegion>, DetectError> {
        let (w, h) = image.dimensions();
        Ok(self
            .regions
            .iter()
            .filter(|r| r.left < w && r.top < h)
            .map(|r| FeatureRegion {
                width: r.width.min(w - r.left),
                height: r.height.min(h - r.top),
                ..*r
            })
            .collect())
    }
}

/// Minimum side length of a face worth detecting in an image of
/// `width` by `height`: one fifteenth of the short side, never below
/// 20 pixels.
#[must_use]
pub fn min_feature_size(width: u32, height: u32) -> u32 {
    (width.min(height) / 15).max(20)
}

#[cfg(feature = "seeta")]
pub use seeta::SeetaFaceDetector;

#[cfg(feature = "seeta")]
mod seeta {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::collections::hash_map::Entry;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, LazyLock, Mutex, PoisonError};

    use rustface::{Detector, ImageData};
    use tracing::{debug, info};

    use super::{DetectError, FeatureDetector, min_feature_size};
    use crate::types::{FeatureRegion, GrayImage};

    /// Raw model bytes, read from disk once per path per process.
    static MODELS: LazyLock<Mutex<HashMap<PathBuf, Arc<[u8]>>>> =
        LazyLock::new(|| Mutex::new(HashMap::new()));

    thread_local! {
        /// The cascade keeps scratch buffers and needs `&mut` to scan,
        /// so every worker thread owns one per model path.
        static CASCADES: RefCell<HashMap<PathBuf, Box<dyn Detector>>> =
            RefCell::new(HashMap::new());
    }

    /// Face detector backed by the SeetaFace funnel-structured cascade.
    #[derive(Debug, Clone)]
    pub struct SeetaFaceDetector {
        model_path: PathBuf,
        score_threshold: f64,
    }

    impl SeetaFaceDetector {
        /// Default minimum classifier score for a window to count as a face.
        pub const DEFAULT_SCORE_THRESHOLD: f64 = 2.0;

        /// Create a detector for the model at `model_path`.
        ///
        /// The model is read eagerly so a bad path fails at startup
        /// rather than on the first request.
        ///
        /// # Errors
        ///
        /// Returns [`DetectError::Model`] if the file cannot be read.
        pub fn new(model_path: impl AsRef<Path>) -> Result<Self, DetectError> {
            let model_path = model_path.as_ref().to_path_buf();
            load_model(&model_path)?;
            Ok(Self {
                model_path,
                score_threshold: Self::DEFAULT_SCORE_THRESHOLD,
            })
        }

        /// Override the score threshold.
        #[must_use]
        pub const fn with_score_threshold(mut self, threshold: f64) -> Self {
            self.score_threshold = threshold;
            self
        }
    }

    fn load_model(path: &Path) -> Result<Arc<[u8]>, DetectError> {
        let mut models = MODELS.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = models.get(path) {
            return Ok(Arc::clone(model));
        }
        let bytes = std::fs::read(path)
            .map_err(|e| DetectError::Model(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), bytes = bytes.len(), "face model loaded");
        let model: Arc<[u8]> = Arc::from(bytes);
        models.insert(path.to_path_buf(), Arc::clone(&model));
        Ok(model)
    }

    impl FeatureDetector for SeetaFaceDetector {
        #[allow(clippy::cast_sign_loss)]
        fn detect(&self, image: &GrayImage) -> Result<Vec<FeatureRegion>, DetectError> {
            let (width, height) = image.dimensions();
            let model = load_model(&self.model_path)?;

            CASCADES.with(|cell| {
                let mut cascades = cell.borrow_mut();
                let cascade = match cascades.entry(self.model_path.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let model = rustface::read_model(&model[..])
                            .map_err(|e| DetectError::Model(e.to_string()))?;
                        entry.insert(rustface::create_detector_with_model(model))
                    }
                };

                cascade.set_min_face_size(min_feature_size(width, height));
                cascade.set_score_thresh(self.score_threshold);
                cascade.set_pyramid_scale_factor(0.8);
                cascade.set_slide_window_step(4, 4);

                let faces = cascade.detect(&ImageData::new(image.as_raw(), width, height));
                debug!(faces = faces.len(), width, height, "face scan finished");

                Ok(faces
                    .iter()
                    .filter_map(|face| {
                        let bbox = face.bbox();
                        let left = bbox.x().max(0) as u32;
                        let top = bbox.y().max(0) as u32;
                        (left < width && top < height).then(|| {
                            FeatureRegion::from_box(
                                left,
                                top,
                                bbox.width().min(width - left),
                                bbox.height().min(height - top),
                            )
                        })
                    })
                    .collect())
            })
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn no_features_finds_nothing() {
        let img = GrayImage::new(10, 10);
        assert!(NoFeatures.detect(&img).unwrap().is_empty());
    }

    #[test]
    fn fixed_features_clips_to_image() {
        let detector = FixedFeatures::new(vec![
            FeatureRegion::from_box(5, 5, 20, 20),
            FeatureRegion::from_box(50, 0, 5, 5),
        ]);
        let regions = detector.detect(&GrayImage::new(10, 10)).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].width, regions[0].height), (5, 5));
    }

    #[test]
    fn min_feature_size_floor_is_twenty() {
        assert_eq!(min_feature_size(100, 100), 20);
        assert_eq!(min_feature_size(900, 600), 40);
    }
}
