//! Deterministic loader double for tests.
//!
//! Serves registered byte payloads, can delay individual sources to
//! permute completion order, can fail individual sources, and records
//! how many loads were attempted and in which order they finished.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use collage_pipeline::codec;
use collage_pipeline::{OutputFormat, Rgba, RgbaImage};

use crate::cache::SourceBytes;
use crate::error::FetchError;
use crate::loader::SourceLoader;

/// PNG bytes of a mid-gray `width × height` image.
#[must_use]
pub fn png(width: u32, height: u32) -> Vec<u8> {
    solid_png(width, height, [128, 128, 128, 255])
}

/// PNG bytes of a `width × height` image filled with `color`.
#[must_use]
pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    codec::encode(&img, OutputFormat::Png).unwrap_or_default()
}

/// In-memory [`SourceLoader`] that counts calls.
#[derive(Debug, Default)]
pub struct CountingLoader {
    sources: HashMap<String, SourceBytes>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    calls: AtomicUsize,
    finished: Mutex<Vec<String>>,
}

impl CountingLoader {
    /// A loader with nothing registered; every load is `NotFound`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `id`.
    #[must_use]
    pub fn with_source(mut self, id: &str, bytes: Vec<u8>, cache_control: Option<&str>) -> Self {
        let entry = SourceBytes {
            bytes,
            cache_control: cache_control.map(str::to_string),
        };
        self.sources.insert(id.to_string(), entry);
        self
    }

    /// Sleep for `delay` before answering for `id`.
    #[must_use]
    pub fn with_delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Answer `id` with an upstream 500.
    #[must_use]
    pub fn with_failure(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Number of loads attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identifiers in the order their loads finished.
    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SourceLoader for CountingLoader {
    async fn load(&self, id: &str) -> Result<SourceBytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(id.to_string());
        }

        if self.failing.contains(id) {
            return Err(FetchError::Status {
                id: id.to_string(),
                status: 500,
            });
        }
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }
}
