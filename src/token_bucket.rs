use parking_lot::Mutex;
use serde::Serialize;

/// Continuously refilling token bucket.
///
/// Tokens are fractional: a bucket refills at `capacity / window` tokens per
/// millisecond rather than resetting at window boundaries. The same bucket
/// backs request counting (one token per request) and upload volume
/// (one token per megabyte).
#[derive(Debug)]
pub struct RateBucket {
    capacity: f64,
    window_millis: u64,
    state: Mutex<BucketState>,
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: u64,
}

/// Point-in-time view of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketSnapshot {
    pub remaining: f64,
    pub capacity: f64,
    pub window_millis: u64,
}

impl RateBucket {
    /// Create a full bucket whose refill clock starts at `now_millis`.
    pub fn new(capacity: f64, window_millis: u64, now_millis: u64) -> Self {
        Self {
            capacity,
            window_millis,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now_millis,
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn window_millis(&self) -> u64 {
        self.window_millis
    }

    /// Tokens added per millisecond
    pub fn refill_rate(&self) -> f64 {
        self.capacity / self.window_millis as f64
    }

    /// Refill, then take `tokens` if that many are available.
    ///
    /// The refill is committed even when the request is rejected.
    pub fn try_consume(&self, tokens: f64, now_millis: u64) -> bool {
        let mut state = self.state.lock();
        let refilled = self.refilled(&state, now_millis);
        state.last_refill = state.last_refill.max(now_millis);

        if refilled >= tokens {
            state.tokens = refilled - tokens;
            true
        } else {
            state.tokens = refilled;
            false
        }
    }

    /// Remaining tokens as of `now_millis`, without mutating the bucket.
    pub fn peek(&self, now_millis: u64) -> BucketSnapshot {
        let state = self.state.lock();
        BucketSnapshot {
            remaining: self.refilled(&state, now_millis),
            capacity: self.capacity,
            window_millis: self.window_millis,
        }
    }

    fn refilled(&self, state: &BucketState, now_millis: u64) -> f64 {
        let elapsed = now_millis.saturating_sub(state.last_refill);
        if elapsed == 0 || self.window_millis == 0 {
            return state.tokens;
        }
        // Multiply before dividing so whole-token refills stay exact.
        let added = elapsed as f64 * self.capacity / self.window_millis as f64;
        (state.tokens + added).min(self.capacity)
    }
}
