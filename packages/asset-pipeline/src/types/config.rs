//! Configuration types for the pipeline.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::section::SectionFocus;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default user agent for web fetches.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; AssetAnalyst/0.1; +https://example.com/bot)";

/// Settings for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cache time-to-live. `0` disables caching.
    ///
    /// Default: 3600.
    pub ttl_seconds: u64,

    /// Sources processed at once. Default: 4.
    pub max_concurrency: usize,

    /// Minimum extracted characters before the model is called.
    ///
    /// Shorter documents finish as `NoData`. Default: 200.
    pub min_text_length: usize,

    /// Byte ceiling for any single source. Default: 20 MiB.
    pub max_bytes: u64,

    pub fetch: FetchConfig,

    pub reasoning: ReasoningConfig,

    /// Optional section rule applied before prompting.
    pub focus: Option<SectionFocus>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_concurrency: 4,
            min_text_length: 200,
            max_bytes: 20 * 1024 * 1024,
            fetch: FetchConfig::default(),
            reasoning: ReasoningConfig::default(),
            focus: None,
        }
    }
}

/// HTTP fetch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reasoning-service settings: model, retry, breaker and quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Failures within the window that open the breaker
    pub breaker_threshold: u32,
    pub breaker_window_secs: u64,
    pub breaker_cooldown_secs: u64,

    /// Process-wide request quota
    pub requests_per_second: u32,

    /// Longest document text sent in a single prompt
    pub max_prompt_chars: usize,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            breaker_threshold: 5,
            breaker_window_secs: 60,
            breaker_cooldown_secs: 30,
            requests_per_second: 2,
            max_prompt_chars: 12_000,
        }
    }
}

impl ReasoningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-call overrides accepted by `analyze`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    pub ttl_seconds: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub min_text_length: Option<usize>,
}

impl AnalyzeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    pub fn with_min_text_length(mut self, n: usize) -> Self {
        self.min_text_length = Some(n);
        self
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from the environment, reading `.env` if present.
    ///
    /// Unset variables keep their defaults; malformed numbers are a
    /// configuration error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ttl) = parse_var(&lookup, "ANALYST_TTL_SECONDS")? {
            config.ttl_seconds = ttl;
        }
        if let Some(n) = parse_var(&lookup, "ANALYST_MAX_CONCURRENCY")? {
            config.max_concurrency = n;
        }
        if let Some(n) = parse_var(&lookup, "ANALYST_MIN_TEXT_LENGTH")? {
            config.min_text_length = n;
        }
        if let Some(n) = parse_var(&lookup, "ANALYST_MAX_BYTES")? {
            config.max_bytes = n;
        }
        if let Some(agent) = lookup("ANALYST_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            config.fetch.user_agent = agent;
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
            config.reasoning.model = model;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.reasoning.base_url = base_url.trim_end_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(PipelineError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.fetch.max_attempts == 0 || self.reasoning.max_attempts == 0 {
            return Err(PipelineError::Config("max_attempts must be at least 1".into()));
        }
        if self.reasoning.requests_per_second == 0 {
            return Err(PipelineError::Config(
                "requests_per_second must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// This config with per-call overrides applied.
    pub fn with_options(&self, options: &AnalyzeOptions) -> Self {
        Self {
            ttl_seconds: options.ttl_seconds.unwrap_or(self.ttl_seconds),
            max_concurrency: options
                .max_concurrency
                .unwrap_or(self.max_concurrency)
                .max(1),
            min_text_length: options.min_text_length.unwrap_or(self.min_text_length),
            ..self.clone()
        }
    }

    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_min_text_length(mut self, n: usize) -> Self {
        self.min_text_length = n;
        self
    }

    pub fn with_max_bytes(mut self, n: u64) -> Self {
        self.max_bytes = n;
        self
    }

    pub fn with_focus(mut self, focus: SectionFocus) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningConfig) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// TTL handed to the cache; `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Option<u64> {
        (self.ttl_seconds > 0).then_some(self.ttl_seconds)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| PipelineError::Config(format!("{} must be a valid number, got {:?}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.min_text_length, 200);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.reasoning.breaker_threshold, 5);
        assert_eq!(config.cache_ttl(), Some(3600));
    }

    #[test]
    fn test_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("ANALYST_TTL_SECONDS", "0"),
            ("ANALYST_MAX_CONCURRENCY", "8"),
            ("OPENAI_MODEL", "gpt-4"),
            ("OPENAI_BASE_URL", "http://localhost:9000/v1/"),
        ]))
        .unwrap();

        assert_eq!(config.cache_ttl(), None);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.reasoning.model, "gpt-4");
        assert_eq!(config.reasoning.base_url, "http://localhost:9000/v1");
        assert_eq!(config.min_text_length, 200);
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let err = PipelineConfig::from_lookup(lookup(&[("ANALYST_MAX_BYTES", "lots")])).unwrap_err();
        assert!(matches!(err, PipelineError::Config(msg) if msg.contains("ANALYST_MAX_BYTES")));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("ANALYST_MAX_CONCURRENCY", "0")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_options_override() {
        let config = PipelineConfig::default();
        let options = AnalyzeOptions::new()
            .with_min_text_length(10)
            .with_max_concurrency(0);
        let merged = config.with_options(&options);

        assert_eq!(merged.min_text_length, 10);
        assert_eq!(merged.max_concurrency, 1);
        assert_eq!(merged.ttl_seconds, 3600);
    }
}
