//! Process-wide request quota for the reasoning service.

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Token-bucket limiter shared by every source of every run that uses the
/// same pipeline context.
pub struct RequestLimiter {
    limiter: DirectRateLimiter,
}

impl RequestLimiter {
    /// Allow `requests_per_second` sustained requests; zero is treated as one.
    pub fn per_second(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(Quota::per_second(rate))
    }

    pub fn with_quota(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Wait until a request is permitted.
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit without waiting, if one is available.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
