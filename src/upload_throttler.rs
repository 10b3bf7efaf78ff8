use crate::clock::{Clock, SystemClock};
use crate::interval::ThrottleInterval;
use crate::rate_limit_config::UploadQuotaConfig;
use crate::stats::FileUploadStats;
use crate::throttler::redact;
use crate::token_bucket::RateBucket;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Upload volume throttler: one hourly megabyte bucket per identifier.
pub struct ByteQuotaThrottler {
    config: UploadQuotaConfig,
    buckets: DashMap<String, Arc<RateBucket>>,
    clock: Arc<dyn Clock>,
}

impl ByteQuotaThrottler {
    pub const INTERVAL: ThrottleInterval = ThrottleInterval::Hour;

    pub fn new(config: UploadQuotaConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: UploadQuotaConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            clock,
        }
    }

    pub fn capacity_mb(&self) -> f64 {
        self.config.capacity_mb
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Charge `size_mb` against the identifier's hourly volume.
    pub fn proceed(&self, identifier: &str, size_mb: f64) -> bool {
        let now = self.clock.now_millis();
        let allowed = self.bucket(identifier, now).try_consume(size_mb, now);
        if !allowed {
            warn!(
                identifier = %redact(identifier),
                size_mb,
                "Upload volume quota exhausted"
            );
        }
        allowed
    }

    /// Upload quota state, `None` for other intervals or before the first
    /// upload by `identifier`.
    pub fn get_stats(&self, identifier: &str, interval: ThrottleInterval) -> Option<FileUploadStats> {
        if interval != Self::INTERVAL {
            return None;
        }
        let bucket = self
            .buckets
            .get(identifier)
            .map(|entry| Arc::clone(entry.value()))?;
        let snapshot = bucket.peek(self.clock.now_millis());
        Some(FileUploadStats::new(snapshot.capacity, snapshot.remaining))
    }

    fn bucket(&self, identifier: &str, now: u64) -> Arc<RateBucket> {
        if let Some(existing) = self.buckets.get(identifier) {
            return Arc::clone(existing.value());
        }
        let entry = self.buckets.entry(identifier.to_string()).or_insert_with(|| {
            debug!(
                identifier = %redact(identifier),
                capacity_mb = self.config.capacity_mb,
                "Creating upload bucket"
            );
            Arc::new(RateBucket::new(
                self.config.capacity_mb,
                Self::INTERVAL.window_millis(),
                now,
            ))
        });
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn throttler(capacity_mb: f64) -> (ByteQuotaThrottler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (
            ByteQuotaThrottler::with_clock(UploadQuotaConfig { capacity_mb }, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_no_stats_before_first_upload() {
        let (throttler, _) = throttler(100.0);
        assert!(throttler.get_stats("alice", ThrottleInterval::Hour).is_none());
    }

    #[test]
    fn test_stats_reflect_consumed_megabytes() {
        let (throttler, _) = throttler(100.0);
        assert!(throttler.proceed("alice", 2.5));

        let stats = throttler.get_stats("alice", ThrottleInterval::Hour).unwrap();
        assert_eq!(stats.limit_mb, 100.0);
        assert_eq!(stats.remaining_mb, 97.5);
        assert!(throttler.get_stats("alice", ThrottleInterval::Day).is_none());
    }

    #[test]
    fn test_upload_over_remaining_volume_denied() {
        let (throttler, clock) = throttler(10.0);
        assert!(throttler.proceed("alice", 8.0));
        assert!(!throttler.proceed("alice", 3.0));
        assert_eq!(throttler.get_stats("alice", ThrottleInterval::Hour).unwrap().remaining_mb, 2.0);

        // 10MB an hour refills 1MB every 6 minutes
        clock.advance(360_000);
        assert!(throttler.proceed("alice", 3.0));
        assert_eq!(throttler.get_stats("alice", ThrottleInterval::Hour).unwrap().remaining_mb, 0.0);
    }

    #[test]
    fn test_remaining_rounded_to_one_decimal() {
        let (throttler, _) = throttler(100.0);
        assert!(throttler.proceed("alice", 1.0 / 3.0));
        let stats = throttler.get_stats("alice", ThrottleInterval::Hour).unwrap();
        assert_eq!(stats.remaining_header_value(), "99.7");
        assert_eq!(stats.limit_header_value(), "100.0");
    }

    #[test]
    fn test_identifiers_are_isolated() {
        let (throttler, _) = throttler(5.0);
        assert!(!throttler.proceed("alice", 6.0));
        assert!(throttler.get_stats("bob", ThrottleInterval::Hour).is_none());
        assert!(throttler.proceed("bob", 5.0));
        assert_eq!(throttler.bucket_count(), 2);
    }
}
