//! Analysis orchestrator - the classify → extract → summarize chain.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AnalysisError, AnalyzeResult};
use crate::pipeline::prompts::{
    format_classify_prompt, format_correction_prompt, format_extract_prompt,
    format_summarize_prompt, parse_json_response, prompt_version, truncate_for_prompt,
    ANALYST_SYSTEM,
};
use crate::reasoning::GuardedService;
use crate::traits::reasoning::{ReasoningRequest, ReasoningStep};
use crate::types::analysis::{AnalysisResult, Classification, Fields, SourceFailure};
use crate::types::config::PipelineConfig;
use crate::types::document::ExtractedDocument;
use crate::types::schema::{FieldSchema, Violation};
use crate::types::section::SectionFocus;

/// Runs the reasoning steps for one document at a time.
///
/// The guarded service is shared, so its breaker and quota span every
/// document this orchestrator (or any clone of the `Arc`) analyzes.
pub struct Orchestrator {
    service: Arc<GuardedService>,
    schema: FieldSchema,
    prompt_version: String,
    min_text_length: usize,
    max_prompt_chars: usize,
    focus: Option<SectionFocus>,
}

impl Orchestrator {
    /// Orchestrator with the placeholder asset-management schema.
    pub fn new(service: Arc<GuardedService>, config: &PipelineConfig) -> Self {
        let mut orchestrator = Self {
            service,
            schema: FieldSchema::asset_management(),
            prompt_version: String::new(),
            min_text_length: config.min_text_length,
            max_prompt_chars: config.reasoning.max_prompt_chars,
            focus: config.focus.clone(),
        };
        orchestrator.refresh_version();
        orchestrator
    }

    /// Use a consumer-supplied field schema.
    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = schema;
        self.refresh_version();
        self
    }

    /// Default section focus, used for sources that declare none.
    pub fn with_focus(mut self, focus: SectionFocus) -> Self {
        self.focus = Some(focus);
        self.refresh_version();
        self
    }

    pub fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self.refresh_version();
        self
    }

    fn refresh_version(&mut self) {
        self.prompt_version = self.version_for(self.focus.as_ref());
    }

    pub fn with_min_text_length(mut self, min_text_length: usize) -> Self {
        self.min_text_length = min_text_length;
        self
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn focus(&self) -> Option<&SectionFocus> {
        self.focus.as_ref()
    }

    /// Version tag stored alongside analyses made with the default focus.
    pub fn prompt_version(&self) -> &str {
        &self.prompt_version
    }

    /// Version tag for analyses made with `focus` instead of the default.
    pub fn version_for(&self, focus: Option<&SectionFocus>) -> String {
        prompt_version(&self.schema, focus, self.max_prompt_chars)
    }

    pub fn min_text_length(&self) -> usize {
        self.min_text_length
    }

    pub fn service(&self) -> &Arc<GuardedService> {
        &self.service
    }

    /// Analyze a document with the configured minimum text length.
    pub async fn analyze(&self, doc: &ExtractedDocument) -> AnalysisResult {
        self.analyze_with(doc, self.min_text_length).await
    }

    /// Analyze a document, treating anything shorter than `min_text_length`
    /// characters as `NoData` without calling the service.
    pub async fn analyze_with(&self, doc: &ExtractedDocument, min_text_length: usize) -> AnalysisResult {
        self.analyze_focused(doc, min_text_length, self.focus.as_ref())
            .await
    }

    /// Like [`analyze_with`](Self::analyze_with), narrowing the text with
    /// `focus` rather than the default focus.
    pub async fn analyze_focused(
        &self,
        doc: &ExtractedDocument,
        min_text_length: usize,
        focus: Option<&SectionFocus>,
    ) -> AnalysisResult {
        let result = if doc.is_empty() || doc.char_len() < min_text_length {
            debug!(
                fingerprint = %doc.fingerprint().short(),
                chars = doc.char_len(),
                min_text_length,
                "Too little text, skipping analysis"
            );
            AnalysisResult::no_data(doc.source().clone())
        } else {
            match self.run_steps(doc, focus).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        locator = %doc.source().locator,
                        reason = e.reason(),
                        error = %e,
                        "Analysis failed"
                    );
                    AnalysisResult::failed(doc.source().clone(), SourceFailure::from(&e))
                }
            }
        };

        result
            .with_fingerprint(doc.fingerprint().clone())
            .with_skipped_pages(doc.skipped_pages().to_vec())
            .with_document_metadata(doc.metadata().clone())
    }

    async fn run_steps(
        &self,
        doc: &ExtractedDocument,
        focus: Option<&SectionFocus>,
    ) -> AnalyzeResult<AnalysisResult> {
        let locator = doc.source().locator.clone();
        let full_text = doc.text();

        let focused = match focus {
            Some(focus) => match focus.apply(&full_text) {
                Some(section) => {
                    debug!(section = %focus.name, chars = section.len(), "Applied section focus");
                    section
                }
                None => full_text.as_str(),
            },
            None => full_text.as_str(),
        };
        let content = truncate_for_prompt(focused, self.max_prompt_chars);

        let classification = self.classify(&locator, content).await?;
        debug!(
            document_type = %classification.document_type,
            topic = %classification.topic,
            "Classified document"
        );

        let fields = self.extract_fields(&classification, &locator, content).await?;
        let summary = self.summarize(&classification, &fields, content).await?;

        let confidence = classification.confidence * self.schema.coverage(&fields);
        info!(
            locator = %locator,
            fields = fields.len(),
            confidence,
            "Analysis complete"
        );

        Ok(AnalysisResult::succeeded(
            doc.source().clone(),
            classification,
            fields,
            summary,
            confidence,
        ))
    }

    async fn classify(&self, locator: &str, content: &str) -> AnalyzeResult<Classification> {
        let request = ReasoningRequest::new(
            ReasoningStep::Classify,
            ANALYST_SYSTEM,
            format_classify_prompt(locator, content),
        );
        let response = self.service.call(request).await?;

        let value = parse_json_response(&response)
            .map_err(|e| AnalysisError::Parse(format!("classification: {}", e)))?;
        let mut classification: Classification = serde_json::from_value(value)
            .map_err(|e| AnalysisError::Parse(format!("classification: {}", e)))?;
        classification.confidence = classification.confidence.clamp(0.0, 1.0);

        Ok(classification)
    }

    /// Schema-constrained extraction with one corrective re-prompt.
    async fn extract_fields(
        &self,
        classification: &Classification,
        locator: &str,
        content: &str,
    ) -> AnalyzeResult<Fields> {
        let prompt = format_extract_prompt(
            &self.schema,
            &classification.document_type,
            &classification.topic,
            locator,
            content,
        );
        let request = ReasoningRequest::new(ReasoningStep::ExtractFields, ANALYST_SYSTEM, prompt);
        let response = self.service.call(request).await?;

        let violations = match self.validate(&response) {
            Ok(fields) => return Ok(fields),
            Err(violations) => violations,
        };
        warn!(
            violations = violations.len(),
            "Field extraction failed validation, re-prompting"
        );

        let problems: Vec<String> = violations.iter().map(ToString::to_string).collect();
        let correction = ReasoningRequest::new(
            ReasoningStep::ExtractFields,
            ANALYST_SYSTEM,
            format_correction_prompt(&self.schema, &problems, &response),
        );
        let retried = self.service.call(correction).await?;

        self.validate(&retried).map_err(|violations| {
            AnalysisError::SchemaValidation(
                violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })
    }

    fn validate(&self, response: &str) -> Result<Fields, Vec<Violation>> {
        let value = parse_json_response(response).map_err(|e| {
            vec![Violation {
                field: "$".to_string(),
                problem: e,
            }]
        })?;
        self.schema.validate(&value)
    }

    async fn summarize(
        &self,
        classification: &Classification,
        fields: &Fields,
        content: &str,
    ) -> AnalyzeResult<String> {
        let fields_json = serde_json::to_string_pretty(fields)
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;
        let request = ReasoningRequest::new(
            ReasoningStep::Summarize,
            ANALYST_SYSTEM,
            format_summarize_prompt(
                &classification.document_type,
                &classification.topic,
                &fields_json,
                content,
            ),
        );

        let summary = self.service.call(request).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(AnalysisError::Parse("empty summary".to_string()));
        }
        Ok(summary.to_string())
    }
}
