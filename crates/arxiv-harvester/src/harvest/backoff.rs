//! Server-directed backoff.
//!
//! arXiv answers bursts with `503 Service Unavailable` and a body containing
//! `Retry after <N> seconds`. The wait is whole seconds.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarvestError, HarvestResult};

static RETRY_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Retry after (\d+) seconds").expect("valid retry-after regex pattern")
});

/// Extract the wait from a 503 body.
///
/// # Errors
///
/// Returns [`HarvestError::MalformedBackoffHint`] if the pattern is missing
/// or the number does not fit in a `u64`.
pub fn parse_retry_after(body: &str) -> HarvestResult<Duration> {
    RETRY_AFTER
        .captures(body)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or_else(|| HarvestError::MalformedBackoffHint { body: body.to_string() })
}
