//! What a caller asks for.

use std::time::Duration;

use collage_pipeline::{CollageConfig, Dimensions};

/// Separator of the legacy single-string source encoding.
pub const SOURCE_SEPARATOR: char = '|';

/// One collage request.
///
/// Source identifiers are kept in request order; that order is the
/// left-to-right slice order of the output. Duplicates are allowed.
/// The source count is not checked here; the pipeline rejects counts
/// outside `[1, MAX_SOURCES]` before fetching anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollageRequest {
    /// Source identifiers, left to right.
    pub sources: Vec<String>,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Cache lifetime used when no source advertises a shorter one.
    pub default_max_age: Duration,
}

impl CollageRequest {
    /// A request whose default lifetime comes from `config`.
    #[must_use]
    pub fn new(sources: Vec<String>, width: u32, height: u32, config: &CollageConfig) -> Self {
        Self {
            sources,
            width,
            height,
            default_max_age: Duration::from_secs(config.default_max_age_secs),
        }
    }

    /// Override the default lifetime.
    #[must_use]
    pub const fn with_default_max_age(mut self, max_age: Duration) -> Self {
        self.default_max_age = max_age;
        self
    }

    /// Canvas size.
    #[must_use]
    pub const fn canvas(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Split a pipe-delimited source list.
///
/// An empty string yields no sources; empty segments between pipes are
/// kept as empty identifiers and fail at fetch time like any other
/// unknown source.
#[must_use]
pub fn parse_sources(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded.split(SOURCE_SEPARATOR).map(str::to_string).collect()
}
