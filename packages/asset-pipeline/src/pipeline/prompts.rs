//! Prompts for the analysis steps.
//!
//! Every template feeds the cache's prompt version, together with the field
//! schema, the section focus and the prompt length limit. Changing any of
//! them makes previously cached analyses stale.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::schema::FieldSchema;
use crate::types::section::SectionFocus;

pub const ANALYST_SYSTEM: &str = "You are a senior asset management analyst. You read financial documents (market commentary, fund fact sheets, regulatory filings such as Form ADV and Form CRS) and report only what the document states. Never invent figures.";

/// Step 1: document type and topic.
pub const CLASSIFY_PROMPT: &str = r#"Classify this document.

Output JSON:
{
    "document_type": "one of: regulatory filing, fund fact sheet, market commentary, news article, research report, marketing material, other",
    "topic": "the main subject in a few words",
    "confidence": 0.0 to 1.0
}

Source: {source}
Document:
{content}"#;

/// Step 2: schema-constrained field extraction.
pub const EXTRACT_PROMPT: &str = r#"Extract the following fields from this {document_type} about {topic}.

Fields:
{fields}

Rules:
- Output a single JSON object whose keys are exactly the field names above.
- Numbers must be plain JSON numbers in USD where applicable (no currency symbols).
- Use null for optional fields the document does not state.

Source: {source}
Document:
{content}"#;

/// Corrective re-prompt after a schema violation.
pub const CORRECTION_PROMPT: &str = r#"Your previous answer did not match the required fields.

Problems:
{violations}

Previous answer:
{previous}

Return a corrected JSON object containing exactly these fields:
{fields}"#;

/// Step 3: narrative summary in bullet sections.
pub const SUMMARIZE_PROMPT: &str = r#"Write a concise analyst summary of this {document_type} about {topic}.

Extracted fields (for context):
{fields_json}

Format the summary as bullet points under these headings:
**Key Numerical Data**
**Main Points**
**Important Disclosures**

Use "•" bullets. Omit a heading if the document has nothing for it.

Document:
{content}"#;

pub const MATCH_FUNDS_SYSTEM: &str = "You are an investment consultant matching advisers to mutual funds. Score each fund strictly on the evidence provided.";

/// Fund matching against a consumer-supplied catalog.
pub const MATCH_FUNDS_PROMPT: &str = r#"Given these analyses of an investment adviser, rate how well each fund in the catalog fits the adviser's clients and strategy.

Adviser analyses:
{analyses}

Fund catalog:
{funds}

Output JSON:
{
    "matches": [
        {
            "fund_name": "exact name from the catalog",
            "score": 1 to 5,
            "rationale": "why the fund fits or does not",
            "strengths": ["..."],
            "concerns": ["..."]
        }
    ]
}"#;

/// Version of everything that shapes what the model sees for a document.
pub fn prompt_version(
    schema: &FieldSchema,
    focus: Option<&SectionFocus>,
    max_prompt_chars: usize,
) -> String {
    let mut hasher = Sha256::new();
    for template in [
        ANALYST_SYSTEM,
        CLASSIFY_PROMPT,
        EXTRACT_PROMPT,
        CORRECTION_PROMPT,
        SUMMARIZE_PROMPT,
    ] {
        hasher.update(template.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(schema.render().as_bytes());
    hasher.update([0u8]);
    match focus {
        Some(focus) => {
            for part in [&focus.name, &focus.start_marker, &focus.end_marker] {
                hasher.update(part.as_bytes());
                hasher.update([0u8]);
            }
        }
        None => hasher.update(b"unfocused\0"),
    }
    hasher.update(max_prompt_chars.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn format_classify_prompt(source: &str, content: &str) -> String {
    CLASSIFY_PROMPT
        .replace("{source}", source)
        .replace("{content}", content)
}

pub fn format_extract_prompt(
    schema: &FieldSchema,
    document_type: &str,
    topic: &str,
    source: &str,
    content: &str,
) -> String {
    EXTRACT_PROMPT
        .replace("{document_type}", document_type)
        .replace("{topic}", topic)
        .replace("{fields}", &schema.render())
        .replace("{source}", source)
        .replace("{content}", content)
}

pub fn format_correction_prompt(schema: &FieldSchema, violations: &[String], previous: &str) -> String {
    let violations = violations
        .iter()
        .map(|v| format!("- {}", v))
        .collect::<Vec<_>>()
        .join("\n");
    CORRECTION_PROMPT
        .replace("{violations}", &violations)
        .replace("{fields}", &schema.render())
        .replace("{previous}", previous)
}

pub fn format_summarize_prompt(
    document_type: &str,
    topic: &str,
    fields_json: &str,
    content: &str,
) -> String {
    SUMMARIZE_PROMPT
        .replace("{document_type}", document_type)
        .replace("{topic}", topic)
        .replace("{fields_json}", fields_json)
        .replace("{content}", content)
}

pub fn format_match_funds_prompt(analyses: &str, funds: &str) -> String {
    MATCH_FUNDS_PROMPT
        .replace("{analyses}", analyses)
        .replace("{funds}", funds)
}

/// Parse a JSON object out of a model response.
///
/// Accepts bare JSON, JSON wrapped in markdown code fences, and JSON
/// surrounded by stray prose.
pub fn parse_json_response(response: &str) -> Result<Value, String> {
    let trimmed = strip_code_fences(response.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&trimmed[start..=end]).map_err(|e| e.to_string())
        }
        _ => Err("response contains no JSON object".to_string()),
    }
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line ("```json").
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Cut `text` to at most `max_chars` characters, preferring a paragraph
/// boundary, then a sentence or word boundary.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> &str {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let head = &text[..cut];

    let boundary = head
        .rfind("\n\n")
        .filter(|&i| i >= cut / 2)
        .or_else(|| head.rfind(". ").map(|i| i + 1).filter(|&i| i >= cut / 2))
        .or_else(|| head.rfind(' '))
        .unwrap_or(cut);

    head[..boundary].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_version_tracks_schema() {
        let v1 = prompt_version(&FieldSchema::asset_management(), None, 12_000);
        let v2 = prompt_version(&FieldSchema::asset_management(), None, 12_000);
        let other = prompt_version(&FieldSchema::new(), None, 12_000);

        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 64);
        assert_ne!(v1, other);
    }

    #[test]
    fn test_prompt_version_tracks_focus_and_limit() {
        let schema = FieldSchema::asset_management();
        let plain = prompt_version(&schema, None, 12_000);
        let crs = prompt_version(&schema, Some(&SectionFocus::crs_fees()), 12_000);
        let adv = prompt_version(&schema, Some(&SectionFocus::form_adv_item5()), 12_000);
        let shorter = prompt_version(&schema, None, 4_000);

        assert_ne!(plain, crs);
        assert_ne!(crs, adv);
        assert_ne!(plain, shorter);
    }

    #[test]
    fn test_parse_fenced_json() {
        let value = parse_json_response("```json\n{\"topic\": \"bonds\"}\n```").unwrap();
        assert_eq!(value["topic"], "bonds");

        let value = parse_json_response("Here you go: {\"topic\": \"equities\"} Hope it helps").unwrap();
        assert_eq!(value["topic"], "equities");

        assert!(parse_json_response("no json here").is_err());
    }

    #[test]
    fn test_format_extract_prompt() {
        let prompt = format_extract_prompt(
            &FieldSchema::asset_management(),
            "regulatory filing",
            "advisory fees",
            "upload:adv.pdf",
            "Item 5 text",
        );
        assert!(prompt.contains("\"asset_name\""));
        assert!(prompt.contains("regulatory filing"));
        assert!(prompt.ends_with("Item 5 text"));
    }

    #[test]
    fn test_correction_prompt_lists_violations() {
        let prompt = format_correction_prompt(
            &FieldSchema::asset_management(),
            &["asset_name: missing required field".to_string()],
            "{}",
        );
        assert!(prompt.contains("- asset_name: missing required field"));
    }

    #[test]
    fn test_truncate_for_prompt() {
        let text = "First paragraph here.\n\nSecond paragraph is longer than the limit";
        assert_eq!(truncate_for_prompt(text, 30), "First paragraph here.");
        assert_eq!(truncate_for_prompt("short", 100), "short");

        let multibyte = "é".repeat(50);
        assert_eq!(truncate_for_prompt(&multibyte, 10).chars().count(), 10);
    }
}
