//! End-to-end runs of the collage pipeline against in-memory sources.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use collage::{Collage, CollageError, CollageRequest, Stage, parse_sources};
use collage_fetch::testing::{CountingLoader, png, solid_png};
use collage_fetch::{FetchError, FetchOrchestrator, MemoryCache, SourceFetcher};
use collage_pipeline::{
    CollageConfig, DetectError, FeatureDetector, FeatureRegion, FixedFeatures, FocalOrigin,
    GrayImage, NoFeatures,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const YELLOW: [u8; 4] = [255, 255, 0, 255];

struct BrokenDetector;

impl FeatureDetector for BrokenDetector {
    fn detect(&self, _image: &GrayImage) -> Result<Vec<FeatureRegion>, DetectError> {
        Err(DetectError::Backend("classifier unavailable".to_string()))
    }
}

fn collage_with(loader: Arc<CountingLoader>, detector: Arc<dyn FeatureDetector>) -> Collage {
    let fetcher = SourceFetcher::new(Arc::new(MemoryCache::new()), loader);
    Collage::new(
        FetchOrchestrator::new(fetcher),
        detector,
        CollageConfig::default(),
    )
    .unwrap()
}

fn request(sources: &str, width: u32, height: u32) -> CollageRequest {
    CollageRequest::new(
        parse_sources(sources),
        width,
        height,
        &CollageConfig::default(),
    )
}

#[tokio::test]
async fn five_sources_fall_back_without_fetching() {
    let loader = Arc::new(CountingLoader::new());
    let collage = collage_with(loader.clone(), Arc::new(NoFeatures));

    let outcome = collage.run(request("a|b|c|d|e", 300, 200)).await;

    let error = outcome.into_result().unwrap_err();
    assert!(matches!(
        error,
        CollageError::InvalidSourceCount { count: 5, max: 4 }
    ));
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn one_failed_fetch_falls_back_after_all_fetches_finish() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("a", png(40, 40), None)
            .with_source("b", png(40, 40), None)
            .with_source("d", png(40, 40), None)
            .with_failure("c")
            .with_delay("a", Duration::from_millis(50))
            .with_delay("b", Duration::from_millis(25)),
    );
    let collage = collage_with(loader.clone(), Arc::new(NoFeatures));

    let outcome = collage.run(request("a|b|c|d", 300, 200)).await;

    assert!(outcome.is_fallback());
    assert_eq!(loader.calls(), 4);
    assert_eq!(loader.finished().len(), 4);
    match outcome.into_result().unwrap_err() {
        CollageError::FetchFailure { failures, total } => {
            assert_eq!(total, 4);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].index, 2);
            assert_eq!(failures[0].id, "c");
            assert!(matches!(
                failures[0].error,
                FetchError::Status { status: 500, .. }
            ));
        }
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn every_failed_fetch_is_reported() {
    let loader = Arc::new(CountingLoader::new().with_source("ok", png(10, 10), None));
    let collage = collage_with(loader, Arc::new(NoFeatures));

    let error = collage
        .try_run(request("missing|ok|gone", 300, 200))
        .await
        .unwrap_err();
    match error {
        CollageError::FetchFailure { failures, .. } => {
            let ids: Vec<&str> = failures.iter().map(|f| f.id.as_str()).collect();
            assert_eq!(ids, vec!["missing", "gone"]);
        }
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn detector_failure_falls_back_at_planning() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("a", png(40, 40), None)
            .with_source("b", png(40, 40), None),
    );
    let collage = collage_with(loader, Arc::new(BrokenDetector));

    let error = collage
        .run(request("a|b", 300, 200))
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(error.stage(), Stage::Plan);
    assert!(matches!(error, CollageError::PlanFailure { index: 0, .. }));
}

#[tokio::test]
async fn slice_order_ignores_completion_order() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("red", solid_png(100, 100, RED), None)
            .with_source("green", solid_png(100, 100, GREEN), None)
            .with_source("blue", solid_png(100, 100, BLUE), None)
            .with_source("yellow", solid_png(100, 100, YELLOW), None)
            .with_delay("red", Duration::from_millis(60))
            .with_delay("green", Duration::from_millis(40))
            .with_delay("blue", Duration::from_millis(20)),
    );
    let collage = collage_with(loader.clone(), Arc::new(NoFeatures));

    let result = collage
        .run(request("red|green|blue|yellow", 400, 100))
        .await
        .into_result()
        .unwrap();

    assert_eq!(loader.finished(), vec!["yellow", "blue", "green", "red"]);
    assert_eq!(result.offsets, vec![0, 100, 200, 300]);
    let colors: Vec<[u8; 4]> = [50, 150, 250, 350]
        .iter()
        .map(|&x| result.image.get_pixel(x, 50).0)
        .collect();
    assert_eq!(colors, vec![RED, GREEN, BLUE, YELLOW]);
    let ids: Vec<&str> = result.slices.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["red", "green", "blue", "yellow"]);
}

#[tokio::test]
async fn odd_width_gives_remainder_to_last_slice() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("a", png(640, 480), None)
            .with_source("b", png(480, 640), None)
            .with_source("c", png(200, 200), None),
    );
    let collage = collage_with(loader, Arc::new(NoFeatures));

    let result = collage
        .run(request("a|b|c", 301, 200))
        .await
        .into_result()
        .unwrap();

    assert_eq!(result.image.dimensions(), (301, 200));
    assert_eq!(result.offsets, vec![0, 100, 200]);
    let widths: Vec<u32> = result.slices.iter().map(|s| s.plan.target.width).collect();
    assert_eq!(widths, vec![100, 100, 101]);
    assert_eq!(widths.iter().sum::<u32>(), 301);
}

#[tokio::test]
async fn single_source_without_features_uses_top_center() {
    let loader = Arc::new(CountingLoader::new().with_source("wide", png(900, 200), None));
    let collage = collage_with(loader, Arc::new(NoFeatures));

    let result = collage
        .run(request("wide", 300, 200))
        .await
        .into_result()
        .unwrap();

    let plan = result.slices[0].plan;
    assert_eq!(plan.focal_origin, FocalOrigin::TopCenter);
    assert_eq!(plan.crop.left, 300);
    assert_eq!(plan.crop.width(), 300);
    assert_eq!(result.image.dimensions(), (300, 200));
}

#[tokio::test]
async fn detected_features_move_the_crop_off_center() {
    let sources = "a|b";
    let loader = || {
        Arc::new(
            CountingLoader::new()
                .with_source("a", png(600, 200), None)
                .with_source("b", png(600, 200), None),
        )
    };

    let centered = collage_with(loader(), Arc::new(NoFeatures))
        .run(request(sources, 300, 200))
        .await
        .into_result()
        .unwrap();

    let faces = FixedFeatures::new(vec![
        FeatureRegion::from_box(20, 60, 40, 40),
        FeatureRegion::from_box(500, 60, 10, 10),
    ]);
    let weighted = collage_with(loader(), Arc::new(faces))
        .run(request(sources, 300, 200))
        .await
        .into_result()
        .unwrap();

    let naive_left = centered.slices[0].plan.crop.left;
    let weighted_left = weighted.slices[0].plan.crop.left;
    assert_eq!(naive_left, 225);
    assert_eq!(weighted.slices[0].plan.focal_origin, FocalOrigin::Features);
    assert!(weighted_left < naive_left);
    assert_eq!(weighted.slices[0].regions.len(), 2);
}

#[tokio::test]
async fn repeated_requests_are_byte_identical() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("a", solid_png(320, 240, RED), None)
            .with_source("b", solid_png(240, 320, BLUE), None),
    );
    let faces = FixedFeatures::new(vec![FeatureRegion::from_box(100, 50, 60, 60)]);
    let collage = collage_with(loader.clone(), Arc::new(faces));

    let first = collage
        .run(request("a|b", 250, 180))
        .await
        .into_result()
        .unwrap();
    let second = collage
        .run(request("a|b", 250, 180))
        .await
        .into_result()
        .unwrap();

    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.image, second.image);
    // Second run is served from the cache.
    assert_eq!(loader.calls(), 2);
}

#[tokio::test]
async fn zero_width_canvas_is_degenerate_not_an_error() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("a", png(40, 40), None)
            .with_source("b", png(40, 40), None),
    );
    let collage = collage_with(loader, Arc::new(NoFeatures));

    let result = collage
        .run(request("a|b", 0, 200))
        .await
        .into_result()
        .unwrap();

    assert_eq!(result.image.dimensions(), (0, 200));
    assert!(result.bytes.is_empty());
    assert_eq!(result.offsets, vec![0, 0]);
}

#[tokio::test]
async fn lifetime_is_shortest_advertised() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("a", png(40, 40), Some("public, max-age=3600"))
            .with_source("b", png(40, 40), Some("max-age=120, must-revalidate"))
            .with_source("c", png(40, 40), Some("max-age=oops")),
    );
    let collage = collage_with(loader, Arc::new(NoFeatures));

    let result = collage
        .run(request("a|b|c", 120, 40))
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.max_age, Duration::from_secs(120));
}

#[tokio::test]
async fn thin_source_still_fills_its_slice() {
    let loader = Arc::new(
        CountingLoader::new()
            .with_source("red", solid_png(100, 100, RED), None)
            .with_source("sliver", solid_png(2, 1000, BLUE), None),
    );
    let collage = collage_with(loader, Arc::new(NoFeatures));

    let result = collage
        .run(request("red|sliver", 300, 200))
        .await
        .into_result()
        .unwrap();

    let sliver = &result.slices[1];
    assert_eq!(sliver.plan.fitted.width, 1);
    assert!(!sliver.plan.crop.size().is_empty());
    let px = result.image.get_pixel(225, 100).0;
    assert!(px[2] > 200 && px[0] < 50, "expected blue, got {px:?}");
}
