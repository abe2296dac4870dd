//! `Cache-Control` lifetime parsing.

use std::time::Duration;

/// Extract the `max-age` directive from a `Cache-Control` value such as
/// `public, max-age=3600`.
///
/// Returns `None` when the directive is absent or its value is not a
/// non-negative integer; callers then apply their default.
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value
            .trim()
            .trim_matches('"')
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    })
}

/// The shortest of `default` and every advertised lifetime.
///
/// Sources without an advertised lifetime impose no constraint.
#[must_use]
pub fn effective_max_age(
    default: Duration,
    advertised: impl IntoIterator<Item = Option<Duration>>,
) -> Duration {
    advertised.into_iter().flatten().fold(default, Duration::min)
}
