//! Fund matching: rate a catalog of funds against analysed documents.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnalysisError, AnalyzeResult};
use crate::pipeline::prompts::{format_match_funds_prompt, parse_json_response, MATCH_FUNDS_SYSTEM};
use crate::reasoning::GuardedService;
use crate::traits::reasoning::{ReasoningRequest, ReasoningStep};
use crate::types::report::Report;

/// One fund in a consumer-supplied catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundProfile {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Free-form facts (strategy, expense ratio, minimum investment, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl FundProfile {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// How well a fund fits the analysed adviser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundMatch {
    pub fund_name: String,

    /// 1 (poor fit) to 5 (strong fit)
    pub score: u8,

    pub rationale: String,

    #[serde(default)]
    pub strengths: Vec<String>,

    #[serde(default)]
    pub concerns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    fund_name: String,
    score: f64,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    concerns: Vec<String>,
}

/// Sends one `MatchFunds` request per report through the guarded service.
pub struct FundMatcher {
    service: Arc<GuardedService>,
}

impl FundMatcher {
    pub fn new(service: Arc<GuardedService>) -> Self {
        Self { service }
    }

    /// Rate every catalog fund against the report's successful analyses.
    ///
    /// Returns matches sorted by descending score, at most one per fund
    /// (its best score). Matches for funds not in the catalog are dropped. An empty catalog, or a report without a
    /// successful analysis, returns no matches without calling the service.
    pub async fn match_funds(
        &self,
        report: &Report,
        catalog: &[FundProfile],
    ) -> AnalyzeResult<Vec<FundMatch>> {
        let analyses: Vec<_> = report
            .succeeded_results()
            .map(|r| {
                serde_json::json!({
                    "source": r.source.locator,
                    "classification": r.classification,
                    "fields": r.fields,
                    "summary": r.summary,
                })
            })
            .collect();

        if catalog.is_empty() || analyses.is_empty() {
            debug!(
                funds = catalog.len(),
                analyses = analyses.len(),
                "Nothing to match"
            );
            return Ok(Vec::new());
        }

        let prompt = format_match_funds_prompt(&pretty(&analyses), &pretty(&catalog));
        let request = ReasoningRequest::new(ReasoningStep::MatchFunds, MATCH_FUNDS_SYSTEM, prompt);
        let response = self.service.call(request).await?;

        let value = parse_json_response(&response)
            .map_err(|e| AnalysisError::Parse(format!("fund matches: {}", e)))?;
        let parsed: MatchResponse = serde_json::from_value(value)
            .map_err(|e| AnalysisError::Parse(format!("fund matches: {}", e)))?;

        let mut matches: Vec<FundMatch> = parsed
            .matches
            .into_iter()
            .filter_map(|m| {
                let fund = catalog
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(m.fund_name.trim()))?;
                Some(FundMatch {
                    fund_name: fund.name.clone(),
                    score: m.score.round().clamp(1.0, 5.0) as u8,
                    rationale: m.rationale,
                    strengths: m.strengths,
                    concerns: m.concerns,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        let mut seen = HashSet::new();
        matches.retain(|m| seen.insert(m.fund_name.clone()));

        info!(matches = matches.len(), funds = catalog.len(), "Fund matching complete");
        Ok(matches)
    }
}

fn pretty(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
