//! The analysis pipeline.
//!
//! - `controller` - batches, concurrency, cancellation and caching
//! - `orchestrator` - classify → extract fields → summarize per document
//! - `prompts` - prompt templates and response parsing
//! - `state` - per-source state machine

pub mod controller;
pub mod orchestrator;
pub mod prompts;
pub mod state;

pub use controller::{analyze, Pipeline, PipelineContext};
pub use orchestrator::Orchestrator;
pub use prompts::{parse_json_response, prompt_version};
pub use state::{SourceProgress, SourceState};
