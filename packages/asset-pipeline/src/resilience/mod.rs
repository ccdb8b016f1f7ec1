//! Retry, circuit-breaking and rate limiting.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use rate_limit::RequestLimiter;
pub use retry::RetryPolicy;
