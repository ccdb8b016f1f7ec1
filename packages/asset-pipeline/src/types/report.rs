//! The pipeline's terminal output.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::analysis::{AnalysisResult, Outcome};

/// Ordered per-source results plus aggregate counts.
///
/// `results[i]` always belongs to the i-th submitted source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub results: Vec<AnalysisResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub no_data: usize,
    pub cancelled: usize,

    /// Sources whose analysis was served from the cache
    pub cache_hits: usize,

    /// Wall time of the whole run
    pub elapsed_ms: u64,
}

impl Report {
    /// Build a report, deriving the counts from the results.
    pub fn from_results(
        run_id: Uuid,
        results: Vec<AnalysisResult>,
        cache_hits: usize,
        elapsed: Duration,
    ) -> Self {
        let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();

        Self {
            run_id,
            succeeded: count(Outcome::Succeeded),
            failed: count(Outcome::Failed),
            no_data: count(Outcome::NoData),
            cancelled: count(Outcome::Cancelled),
            cache_hits,
            elapsed_ms: elapsed.as_millis() as u64,
            results,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter()
    }

    /// Results that finished successfully, in input order.
    pub fn succeeded_results(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter().filter(|r| r.is_success())
    }
}
