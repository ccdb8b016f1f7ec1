//! Reasoning-service backends and the guard layer around them.

pub mod credentials;
pub mod guarded;
pub mod openai;

pub use credentials::ApiKey;
pub use guarded::GuardedService;
pub use openai::OpenAiService;
