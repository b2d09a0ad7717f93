//! Request pacing for the marketplace API.
//!
//! Request `n` (0-based) is released no earlier than `start + n * spacing`,
//! where `spacing = 1s / rate`. A caller that arrives after its slot goes
//! straight through. One limiter lives for one job invocation and is shared
//! by every request that invocation makes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    start: Instant,
    spacing: Duration,
    issued: AtomicU64,
}

impl RateLimiter {
    /// Limiter allowing `rate_per_second` requests per second (minimum 1).
    pub fn new(rate_per_second: u32) -> Self {
        let rate = u64::from(rate_per_second.max(1));
        // Round up so that `rate` slots never fit inside a single second
        let spacing = Duration::from_nanos(1_000_000_000u64.div_ceil(rate));

        Self {
            start: Instant::now(),
            spacing,
            issued: AtomicU64::new(0),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Wait for the next request slot.
    pub async fn acquire(&self) {
        let slot = self.issued.fetch_add(1, Ordering::SeqCst);
        let offset = self
            .spacing
            .saturating_mul(u32::try_from(slot).unwrap_or(u32::MAX));
        let due = self.start + offset;

        let now = Instant::now();
        if due > now {
            debug!(slot = slot, wait_ms = (due - now).as_millis() as u64, "Rate limiting");
            sleep_until(due).await;
        }
    }
}
