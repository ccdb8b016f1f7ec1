//! API key handling with secure memory.
//!
//! Uses the `secrecy` crate to keep the key out of logs, `Debug` output
//! and error messages.

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};

use crate::error::{PipelineError, Result};

/// Environment variable holding the reasoning-service key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// A reasoning-service API key that won't be logged or displayed.
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Read `OPENAI_API_KEY`, loading `.env` first if present.
    ///
    /// A missing or blank key is a configuration error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        lookup(API_KEY_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self::new)
            .ok_or_else(|| PipelineError::Config(format!("{} must be set", API_KEY_VAR)))
    }

    /// Expose the key. Only call this when building a request.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
