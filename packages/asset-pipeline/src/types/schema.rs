//! Field schema for the structured extraction step.
//!
//! The field set is a contract owned by the consuming application. The
//! pipeline renders it into the extraction prompt and validates the model's
//! answer against it; [`FieldSchema::asset_management`] is only a default.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::analysis::Fields;

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    TextList,
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::TextList => "array of strings",
        }
    }
}

/// One named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: String,
}

impl FieldSpec {
    pub fn required(
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type, description)
        }
    }
}

/// A schema violation found in a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub problem: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Ordered set of named, typed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A later field with the same name replaces the earlier one.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    /// Placeholder field set for asset-management documents.
    pub fn asset_management() -> Self {
        Self::new()
            .field(FieldSpec::required(
                "asset_name",
                FieldType::Text,
                "Name of the firm, fund or asset the document is about",
            ))
            .field(FieldSpec::optional(
                "asset_type",
                FieldType::Text,
                "Kind of asset or business (e.g. mutual fund, RIA, equity)",
            ))
            .field(FieldSpec::optional(
                "valuation",
                FieldType::Number,
                "Headline valuation or price figure in USD",
            ))
            .field(FieldSpec::optional(
                "assets_under_management",
                FieldType::Number,
                "Regulatory or reported assets under management in USD",
            ))
            .field(FieldSpec::optional(
                "fees",
                FieldType::Text,
                "Fee structure as stated in the document",
            ))
            .field(FieldSpec::optional(
                "risk_notes",
                FieldType::TextList,
                "Risks, conflicts of interest or important disclosures",
            ))
            .field(FieldSpec::required(
                "investment_themes",
                FieldType::TextList,
                "Investment themes mentioned in the content",
            ))
            .field(FieldSpec::required(
                "key_points",
                FieldType::TextList,
                "Main points of the content",
            ))
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field list for the extraction prompt.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "- \"{}\" ({}, {}): {}",
                    f.name,
                    f.field_type.describe(),
                    if f.required { "required" } else { "optional, use null if absent" },
                    f.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate a response object, coercing loosely-typed values.
    ///
    /// Unknown fields are dropped; absent optional fields are omitted.
    pub fn validate(&self, value: &Value) -> Result<Fields, Vec<Violation>> {
        let Some(object) = value.as_object() else {
            return Err(vec![Violation {
                field: "$".to_string(),
                problem: "expected a JSON object".to_string(),
            }]);
        };

        let mut fields = Fields::new();
        let mut violations = Vec::new();

        for spec in &self.fields {
            let raw = object.get(&spec.name).filter(|v| !v.is_null());

            let Some(raw) = raw else {
                if spec.required {
                    violations.push(Violation {
                        field: spec.name.clone(),
                        problem: "missing required field".to_string(),
                    });
                }
                continue;
            };

            match coerce(raw, spec.field_type) {
                Some(coerced) if spec.required && is_blank(&coerced) => {
                    violations.push(Violation {
                        field: spec.name.clone(),
                        problem: "required field is empty".to_string(),
                    });
                }
                Some(coerced) => {
                    fields.insert(spec.name.clone(), coerced);
                }
                None => violations.push(Violation {
                    field: spec.name.clone(),
                    problem: format!("expected {}", spec.field_type.describe()),
                }),
            }
        }

        if violations.is_empty() {
            Ok(fields)
        } else {
            Err(violations)
        }
    }

    /// Share of schema fields present in `fields`.
    pub fn coverage(&self, fields: &Fields) -> f32 {
        if self.fields.is_empty() {
            return 1.0;
        }
        let present = self
            .fields
            .iter()
            .filter(|f| fields.contains_key(&f.name))
            .count();
        present as f32 / self.fields.len() as f32
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn coerce(value: &Value, field_type: FieldType) -> Option<Value> {
    match (field_type, value) {
        (FieldType::Text, Value::String(s)) => Some(Value::String(s.trim().to_string())),
        (FieldType::Text, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldType::Text, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (FieldType::Number, Value::Number(_)) => Some(value.clone()),
        (FieldType::Number, Value::String(s)) => parse_amount(s)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),

        (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },

        (FieldType::TextList, Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => Some(Value::String(s.trim().to_string())),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        (FieldType::TextList, Value::String(s)) => {
            Some(Value::Array(vec![Value::String(s.trim().to_string())]))
        }

        _ => None,
    }
}

/// Parse amounts like "$1.2B", "4,500,000", "0.75%" or "12.5 million".
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | '€' | '£') && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    let multipliers: [(&str, f64); 8] = [
        ("trillion", 1e12),
        ("billion", 1e9),
        ("million", 1e6),
        ("thousand", 1e3),
        ("bn", 1e9),
        ("t", 1e12),
        ("b", 1e9),
        ("m", 1e6),
    ];

    for (suffix, factor) in multipliers.iter().chain([("k", 1e3)].iter()) {
        if let Some(number) = cleaned.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| n * factor);
        }
    }

    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
