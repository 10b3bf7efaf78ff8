use crate::clock::{Clock, SystemClock};
use crate::interval::ThrottleInterval;
use crate::rate_limit_config::ThrottleDomainConfig;
use crate::stats::ApiUsageStats;
use crate::token_bucket::RateBucket;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type BucketKey = (String, ThrottleInterval);

/// Request-count throttler for one domain, holding one bucket per
/// identifier and configured interval.
///
/// Buckets are created full on first use and kept for the life of the
/// process. Contention is per bucket: callers with different identifiers
/// never wait on each other.
pub struct Throttler {
    domain: String,
    config: ThrottleDomainConfig,
    buckets: DashMap<BucketKey, Arc<RateBucket>>,
    clock: Arc<dyn Clock>,
}

impl Throttler {
    pub fn new(domain: impl Into<String>, config: ThrottleDomainConfig) -> Self {
        Self::with_clock(domain, config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        domain: impl Into<String>,
        config: ThrottleDomainConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            domain: domain.into(),
            config,
            buckets: DashMap::new(),
            clock,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn config(&self) -> &ThrottleDomainConfig {
        &self.config
    }

    /// Configured intervals, shortest window first
    pub fn intervals(&self) -> Vec<ThrottleInterval> {
        self.config.intervals().collect()
    }

    /// Number of live buckets across all identifiers and intervals
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Take one token from every interval bucket of `identifier`.
    ///
    /// Intervals are tried shortest first and the walk stops at the first
    /// bucket that refuses. Tokens already taken from earlier intervals are
    /// not returned.
    pub fn proceed(&self, identifier: &str) -> bool {
        let now = self.clock.now_millis();

        for interval in self.config.intervals() {
            let bucket = match self.bucket(identifier, interval, now) {
                Some(bucket) => bucket,
                None => continue,
            };

            if !bucket.try_consume(1.0, now) {
                warn!(
                    domain = %self.domain,
                    interval = %interval,
                    identifier = %redact(identifier),
                    "Request quota exhausted"
                );
                return false;
            }
        }

        true
    }

    /// Usage in `interval` for `identifier`, or `None` when no request has
    /// touched that bucket yet (or the interval is not configured).
    pub fn get_stats(&self, identifier: &str, interval: ThrottleInterval) -> Option<ApiUsageStats> {
        let limit = self.config.limit(interval)?;
        let bucket = self
            .buckets
            .get(&(identifier.to_string(), interval))
            .map(|entry| Arc::clone(entry.value()))?;
        let snapshot = bucket.peek(self.clock.now_millis());

        Some(ApiUsageStats {
            period_seconds: interval.period_seconds(),
            min_delay_till_next_request_millis: limit.min_delay_millis(),
            remaining_requests_in_period: snapshot.remaining,
            total_requests_per_period: limit.capacity,
        })
    }

    /// Stats for every configured interval, in admission order
    pub fn all_stats(&self, identifier: &str) -> Vec<Option<ApiUsageStats>> {
        self.config
            .intervals()
            .map(|interval| self.get_stats(identifier, interval))
            .collect()
    }

    fn bucket(&self, identifier: &str, interval: ThrottleInterval, now: u64) -> Option<Arc<RateBucket>> {
        let key = (identifier.to_string(), interval);
        if let Some(existing) = self.buckets.get(&key) {
            return Some(Arc::clone(existing.value()));
        }

        let limit = self.config.limit(interval)?;
        let entry = self.buckets.entry(key).or_insert_with(|| {
            debug!(
                domain = %self.domain,
                interval = %interval,
                identifier = %redact(identifier),
                capacity = limit.capacity,
                "Creating rate bucket"
            );
            Arc::new(RateBucket::new(limit.capacity as f64, interval.window_millis(), now))
        });
        Some(Arc::clone(entry.value()))
    }
}

/// Shorten an identifier for logs; api keys are credentials.
pub(crate) fn redact(identifier: &str) -> String {
    let prefix: String = identifier.chars().take(4).collect();
    if prefix.len() < identifier.len() {
        format!("{}***", prefix)
    } else {
        prefix
    }
}
