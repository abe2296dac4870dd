//! Concurrent retrieval of every source in a request.
//!
//! One task is spawned per source and all of them are joined before
//! anything is decided. A failing source does not cancel its siblings,
//! so every failure is reported. Results are ordered by request
//! position, never by completion.

use std::time::Duration;

use collage_pipeline::MAX_SOURCES;
use tracing::{info, instrument, warn};

use crate::error::FetchError;
use crate::fetcher::{FetchState, SourceFetcher, SourceSlot};
use crate::max_age::effective_max_age;

/// Outcome of fetching every source of a request.
#[derive(Debug)]
pub struct FetchReport {
    /// One slot per requested source, in request order.
    pub slots: Vec<SourceSlot>,
    /// `true` only if every slot was fetched.
    pub all_succeeded: bool,
    /// Shortest of the default lifetime and every fetched source's
    /// advertised lifetime.
    pub max_age: Duration,
}

impl FetchReport {
    /// Slots that failed, in request order.
    pub fn failures(&self) -> impl Iterator<Item = &SourceSlot> {
        self.slots.iter().filter(|s| !s.is_fetched())
    }
}

/// Check a source count against `[1, MAX_SOURCES]`.
///
/// # Errors
///
/// Returns [`FetchError::InvalidSourceCount`] outside that range.
pub const fn validate_count(count: usize) -> Result<(), FetchError> {
    if count == 0 || count > MAX_SOURCES {
        return Err(FetchError::InvalidSourceCount {
            count,
            max: MAX_SOURCES,
        });
    }
    Ok(())
}

/// Runs one [`SourceFetcher`] task per source.
#[derive(Clone)]
pub struct FetchOrchestrator {
    fetcher: SourceFetcher,
}

impl FetchOrchestrator {
    /// Orchestrate fetches through `fetcher`.
    #[must_use]
    pub const fn new(fetcher: SourceFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch every identifier concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidSourceCount`] before spawning any
    /// task if `ids` is empty or longer than [`MAX_SOURCES`]. Per-source
    /// failures are not errors; they are recorded in the report.
    #[instrument(name = "fetch_all", skip(self, ids), fields(count = ids.len()))]
    pub async fn fetch_all(
        &self,
        ids: &[String],
        default_max_age: Duration,
    ) -> Result<FetchReport, FetchError> {
        validate_count(ids.len())?;

        let handles: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let fetcher = self.fetcher.clone();
                let id = id.clone();
                tokio::spawn(async move { fetcher.fetch(index, &id).await })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let slots: Vec<SourceSlot> = joined
            .into_iter()
            .zip(ids)
            .enumerate()
            .map(|(index, (result, id))| {
                result.unwrap_or_else(|e| SourceSlot {
                    index,
                    id: id.clone(),
                    state: FetchState::Failed(FetchError::Task {
                        id: id.clone(),
                        message: e.to_string(),
                    }),
                })
            })
            .collect();

        let all_succeeded = slots.iter().all(SourceSlot::is_fetched);
        let max_age = effective_max_age(
            default_max_age,
            slots.iter().map(|s| s.fetched().and_then(|f| f.max_age)),
        );

        if all_succeeded {
            info!(max_age_secs = max_age.as_secs(), "all sources fetched");
        } else {
            let failed: Vec<&str> = slots
                .iter()
                .filter(|s| !s.is_fetched())
                .map(|s| s.id.as_str())
                .collect();
            warn!(?failed, "some sources failed");
        }

        Ok(FetchReport {
            slots,
            all_succeeded,
            max_age,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{MemoryCache, SourceBytes, SourceCache};
    use crate::testing::{CountingLoader, png};

    const DAY: Duration = Duration::from_secs(86_400);

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn orchestrator(loader: Arc<CountingLoader>) -> FetchOrchestrator {
        FetchOrchestrator::new(SourceFetcher::new(Arc::new(MemoryCache::new()), loader))
    }

    #[test]
    fn count_bounds() {
        assert!(validate_count(0).is_err());
        assert!(validate_count(1).is_ok());
        assert!(validate_count(4).is_ok());
        assert!(matches!(
            validate_count(5),
            Err(FetchError::InvalidSourceCount { count: 5, max: 4 })
        ));
    }

    #[tokio::test]
    async fn too_many_sources_spawns_nothing() {
        let loader = Arc::new(CountingLoader::new());
        let result = orchestrator(loader.clone())
            .fetch_all(&ids(&["a", "b", "c", "d", "e"]), DAY)
            .await;
        assert!(matches!(result, Err(FetchError::InvalidSourceCount { .. })));
        assert_eq!(loader.calls(), 0);
    }

    #[tokio::test]
    async fn zero_sources_spawns_nothing() {
        let loader = Arc::new(CountingLoader::new());
        let result = orchestrator(loader.clone()).fetch_all(&[], DAY).await;
        assert!(result.is_err());
        assert_eq!(loader.calls(), 0);
    }

    #[tokio::test]
    async fn order_follows_request_not_completion() {
        let loader = Arc::new(
            CountingLoader::new()
                .with_source("slow", png(3, 3), None)
                .with_source("mid", png(4, 4), None)
                .with_source("fast", png(5, 5), None)
                .with_delay("slow", Duration::from_millis(60))
                .with_delay("mid", Duration::from_millis(30)),
        );
        let report = orchestrator(loader.clone())
            .fetch_all(&ids(&["slow", "mid", "fast"]), DAY)
            .await
            .unwrap();

        assert!(report.all_succeeded);
        assert_eq!(loader.finished(), vec!["fast", "mid", "slow"]);
        let order: Vec<(usize, &str, u32)> = report
            .slots
            .iter()
            .map(|s| (s.index, s.id.as_str(), s.fetched().unwrap().image.width()))
            .collect();
        assert_eq!(order, vec![(0, "slow", 3), (1, "mid", 4), (2, "fast", 5)]);
    }

    #[tokio::test]
    async fn one_failure_does_not_cancel_siblings() {
        let loader = Arc::new(
            CountingLoader::new()
                .with_source("a", png(2, 2), None)
                .with_source("b", png(2, 2), None)
                .with_source("d", png(2, 2), None)
                .with_failure("c")
                .with_delay("a", Duration::from_millis(40))
                .with_delay("d", Duration::from_millis(40)),
        );
        let report = orchestrator(loader.clone())
            .fetch_all(&ids(&["a", "b", "c", "d"]), DAY)
            .await
            .unwrap();

        assert!(!report.all_succeeded);
        assert_eq!(loader.calls(), 4);
        assert_eq!(loader.finished().len(), 4);
        let states: Vec<bool> = report.slots.iter().map(SourceSlot::is_fetched).collect();
        assert_eq!(states, vec![true, true, false, true]);
        let failed: Vec<&str> = report.failures().map(|s| s.id.as_str()).collect();
        assert_eq!(failed, vec!["c"]);
    }

    #[tokio::test]
    async fn max_age_is_minimum_of_default_and_hints() {
        let loader = Arc::new(
            CountingLoader::new()
                .with_source("a", png(2, 2), Some("max-age=600"))
                .with_source("b", png(2, 2), Some("max-age=60"))
                .with_source("c", png(2, 2), None),
        );
        let report = orchestrator(loader)
            .fetch_all(&ids(&["a", "b", "c"]), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(report.max_age, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn max_age_defaults_without_hints() {
        let loader = Arc::new(CountingLoader::new().with_source("a", png(2, 2), None));
        let report = orchestrator(loader)
            .fetch_all(&ids(&["a"]), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(report.max_age, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn duplicate_identifiers_keep_separate_slots() {
        let cache = Arc::new(MemoryCache::new());
        cache.put("same", &SourceBytes::new(png(6, 2))).await.unwrap();
        let orchestrator = FetchOrchestrator::new(SourceFetcher::new(
            cache,
            Arc::new(CountingLoader::new()),
        ));
        let report = orchestrator
            .fetch_all(&ids(&["same", "same"]), DAY)
            .await
            .unwrap();
        assert!(report.all_succeeded);
        assert_eq!(report.slots[0].index, 0);
        assert_eq!(report.slots[1].index, 1);
    }
}
