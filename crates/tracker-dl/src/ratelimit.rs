use std::{
    sync::Mutex,
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Result};

/// Longest single sleep while waiting for a token, so cancellation is
/// observed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Blocking admission control for outbound requests.
pub trait RateLimiter: Send + Sync {
    /// Blocks until a request may be sent or `cancel` fires.
    fn wait(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Limiter that admits everything.
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Ok(())
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every worker of the process.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Bucket refilling `per_hour` tokens an hour, holding at most `burst`.
    ///
    /// Both values are clamped to at least one.
    pub fn per_hour(per_hour: u32, burst: u32) -> Self {
        Self::per_second(f64::from(per_hour.max(1)) / 3600.0, burst)
    }

    pub fn per_second(rate: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            refill_per_sec: rate.max(f64::MIN_POSITIVE),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes a token if one is available, otherwise returns how long until
    /// the next one is.
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - state.tokens;
        Err(Duration::from_secs_f64(missing / self.refill_per_sec))
    }
}

impl RateLimiter for TokenBucket {
    fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(delay) => thread::sleep(delay.min(WAIT_SLICE)),
            }
        }
    }
}
