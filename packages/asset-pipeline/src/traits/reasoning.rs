//! Reasoning-service trait: the external language model.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Which step of the analysis a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStep {
    Classify,
    ExtractFields,
    Summarize,
    MatchFunds,
}

impl ReasoningStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::ExtractFields => "extract_fields",
            Self::Summarize => "summarize",
            Self::MatchFunds => "match_funds",
        }
    }

    /// Whether the step expects a JSON object back.
    pub fn expects_json(&self) -> bool {
        !matches!(self, Self::Summarize)
    }
}

impl fmt::Display for ReasoningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prompt sent to the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub step: ReasoningStep,
    pub system: String,
    pub prompt: String,
    pub json: bool,
}

impl ReasoningRequest {
    pub fn new(step: ReasoningStep, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            step,
            system: system.into(),
            prompt: prompt.into(),
            json: step.expects_json(),
        }
    }
}

/// Opaque request/response language-model service.
///
/// Implementations report raw failures; retry, timeout and circuit-breaking
/// are layered on by [`GuardedService`](crate::reasoning::GuardedService).
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: ReasoningRequest) -> Result<String, ServiceError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
