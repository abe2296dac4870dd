//! collage: compose a horizontal collage from up to four images.
//!
//! Fetches every source concurrently (local files under `--source-root`
//! or `http(s)` URLs), crops each around its detected faces and writes
//! the slices side by side to `--output`.
//!
//! # Usage
//!
//! ```text
//! collage --width 600 --height 200 --output out.png 'a.jpg|b.jpg|https://example.com/c.png'
//! ```
//!
//! # Exit status
//!
//! - `0`: the collage was written.
//! - `2`: the request fell back; the `--fallback` image, if given, was
//!   copied to the output instead.
//! - `1`: any other error (bad arguments, unreadable config, I/O).
//!
//! The effective cache lifetime of the written image is printed to
//! stdout as `max-age=<seconds>`. Logs go to stderr and honor
//! `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use collage::{Collage, CollageOutcome, CollageRequest, CollageResult, parse_sources};
use collage_fetch::{
    FetchOrchestrator, FsCache, FsLoader, HttpLoader, MemoryCache, SchemeLoader, SourceCache,
    SourceFetcher,
};
use collage_pipeline::{
    CollageConfig, FeatureDetector, NoFeatures, OutputFormat, ResampleFilter, codec,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status when the request fell back.
const EXIT_FALLBACK: u8 = 2;

/// Compose a horizontal collage from up to four images.
///
/// Each source becomes one vertical slice, cropped around its detected
/// faces. If any source cannot be fetched or processed, no collage is
/// produced and the `--fallback` image is used instead.
#[derive(Parser, Debug)]
#[command(name = "collage", version)]
struct Cli {
    /// Source identifiers, left to right: paths relative to
    /// `--source-root` or http(s) URLs. An argument may itself be a
    /// pipe-delimited list.
    sources: Vec<String>,

    /// Canvas width in pixels.
    #[arg(long)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long)]
    height: u32,

    /// Where to write the collage.
    #[arg(short, long)]
    output: PathBuf,

    /// Image copied to the output when the request falls back.
    #[arg(long)]
    fallback: Option<PathBuf>,

    /// Directory that relative source paths are resolved against.
    #[arg(long, default_value = ".")]
    source_root: PathBuf,

    /// Persist fetched sources in this directory between runs.
    ///
    /// Without it, sources are cached in memory for this run only.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Default cache lifetime in seconds.
    #[arg(long)]
    max_age: Option<u64>,

    /// Resampling filter (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum)]
    filter: Option<Filter>,

    /// Write JPEG at this quality instead of PNG.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: Option<u8>,

    /// Write one debug image per slice into this directory, showing the
    /// detected regions, focal point and crop window.
    #[arg(long)]
    annotate: Option<PathBuf>,

    /// SeetaFace model file. Without it no faces are detected and every
    /// crop is aligned top-center.
    #[cfg(feature = "seeta")]
    #[arg(long)]
    model: Option<PathBuf>,

    /// Collage config as a JSON file.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Collage config as a JSON string.
    ///
    /// `--max-age`, `--filter` and `--jpeg-quality` still override the
    /// corresponding fields.
    #[arg(long)]
    config_json: Option<String>,
}

/// Resampling filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResampleFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// How a run ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Composed,
    FellBack,
}

impl From<Finish> for ExitCode {
    fn from(finish: Finish) -> Self {
        match finish {
            Finish::Composed => Self::SUCCESS,
            Finish::FellBack => Self::from(EXIT_FALLBACK),
        }
    }
}

/// Build a [`CollageConfig`] from CLI arguments.
///
/// Starts from `--config-json`, `--config` or the defaults, then applies
/// the individual flags on top.
fn config_from_cli(cli: &Cli) -> Result<CollageConfig> {
    let mut config: CollageConfig = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).context("parsing --config-json")?
    } else if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?
    } else {
        CollageConfig::default()
    };

    if let Some(secs) = cli.max_age {
        config.default_max_age_secs = secs;
    }
    if let Some(filter) = cli.filter {
        config.resample_filter = filter.into();
    }
    if let Some(quality) = cli.jpeg_quality {
        config.output_format = OutputFormat::Jpeg { quality };
    }
    config.validate()?;
    Ok(config)
}

/// Flatten positional arguments, splitting pipe-delimited lists.
fn sources_from_cli(cli: &Cli) -> Vec<String> {
    cli.sources.iter().flat_map(|s| parse_sources(s)).collect()
}

#[cfg(feature = "seeta")]
fn detector_from_cli(cli: &Cli) -> Result<Arc<dyn FeatureDetector>> {
    if let Some(ref model) = cli.model {
        let detector = collage_pipeline::SeetaFaceDetector::new(model)
            .with_context(|| format!("loading face model {}", model.display()))?;
        info!(model = %model.display(), "face detection enabled");
        return Ok(Arc::new(detector));
    }
    info!("no face model given; crops are aligned top-center");
    Ok(Arc::new(NoFeatures))
}

#[cfg(not(feature = "seeta"))]
#[allow(clippy::unnecessary_wraps)]
fn detector_from_cli(_cli: &Cli) -> Result<Arc<dyn FeatureDetector>> {
    info!("built without face detection; crops are aligned top-center");
    Ok(Arc::new(NoFeatures))
}

fn cache_from_cli(cli: &Cli) -> Arc<dyn SourceCache> {
    match cli.cache_dir {
        Some(ref dir) => Arc::new(FsCache::new(dir)),
        None => Arc::new(MemoryCache::new()),
    }
}

async fn run(cli: Cli) -> Result<Finish> {
    let config = config_from_cli(&cli)?;
    let request = CollageRequest::new(sources_from_cli(&cli), cli.width, cli.height, &config);

    let loader = SchemeLoader::new(HttpLoader::default(), FsLoader::new(&cli.source_root));
    let fetcher = SourceFetcher::new(cache_from_cli(&cli), Arc::new(loader));
    let collage = Collage::new(
        FetchOrchestrator::new(fetcher),
        detector_from_cli(&cli)?,
        config,
    )?
    .with_annotations(cli.annotate.is_some());

    match collage.run(request).await {
        CollageOutcome::Composed(result) => {
            write_result(&cli, &result).await?;
            println!("max-age={}", result.max_age.as_secs());
            Ok(Finish::Composed)
        }
        CollageOutcome::Fallback(error) => {
            eprintln!("No collage produced: {error}");
            serve_fallback(&cli).await?;
            Ok(Finish::FellBack)
        }
    }
}

async fn write_result(cli: &Cli, result: &CollageResult) -> Result<()> {
    tokio::fs::write(&cli.output, &result.bytes)
        .await
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!(
        path = %cli.output.display(),
        bytes = result.bytes.len(),
        "collage written"
    );

    let Some(ref dir) = cli.annotate else {
        return Ok(());
    };
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    for slice in &result.slices {
        let Some(ref annotation) = slice.annotation else {
            continue;
        };
        let path = dir.join(format!("slice-{}.png", slice.plan.index));
        let png = codec::encode(annotation, OutputFormat::Png)?;
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

async fn serve_fallback(cli: &Cli) -> Result<()> {
    let Some(ref fallback) = cli.fallback else {
        warn!("no --fallback image given; nothing written");
        return Ok(());
    };
    tokio::fs::copy(fallback, &cli.output)
        .await
        .with_context(|| {
            format!(
                "copying fallback {} to {}",
                fallback.display(),
                cli.output.display()
            )
        })?;
    info!(path = %cli.output.display(), "fallback image written");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(finish) => finish.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
