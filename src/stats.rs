//! Immutable usage snapshots handed out by the throttlers.

use serde::Serialize;

/// Number of bytes in one megabyte of upload quota.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Request quota state for one identifier in one interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUsageStats {
    pub period_seconds: u64,
    pub min_delay_till_next_request_millis: u64,
    pub remaining_requests_in_period: f64,
    pub total_requests_per_period: u32,
}

impl ApiUsageStats {
    /// Advisory milliseconds to wait before the next request in this interval.
    ///
    /// With at least one whole token left only the minimum spacing applies.
    /// Otherwise this is the time for the missing fraction of a token to
    /// refill, rounded up, plus one millisecond.
    pub fn wait_time_millis(&self) -> u64 {
        if self.remaining_requests_in_period >= 1.0 {
            return self.min_delay_till_next_request_millis;
        }
        if self.total_requests_per_period == 0 {
            return self.period_seconds * 1000;
        }
        let millis_per_token =
            self.period_seconds as f64 * 1000.0 / self.total_requests_per_period as f64;
        let missing = (1.0 - self.remaining_requests_in_period).max(0.0);
        (missing * millis_per_token).ceil() as u64 + 1
    }
}

/// Largest wait among the intervals that have stats. `None` when none do.
pub fn max_wait_millis<I>(stats: I) -> Option<u64>
where
    I: IntoIterator<Item = Option<ApiUsageStats>>,
{
    stats
        .into_iter()
        .flatten()
        .map(|s| s.wait_time_millis())
        .max()
}

/// Upload volume quota state for one identifier, in megabytes to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadStats {
    pub limit_mb: f64,
    pub remaining_mb: f64,
}

impl FileUploadStats {
    pub fn new(limit_mb: f64, remaining_mb: f64) -> Self {
        Self {
            limit_mb: round_one_decimal(limit_mb),
            remaining_mb: round_one_decimal(remaining_mb),
        }
    }

    pub fn limit_header_value(&self) -> String {
        format!("{:.1}", self.limit_mb)
    }

    pub fn remaining_header_value(&self) -> String {
        format!("{:.1}", self.remaining_mb)
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
