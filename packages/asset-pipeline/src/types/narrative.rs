//! Bullet-section view of a narrative summary.
//!
//! The summarize step asks the model for "Key Numerical Data", "Main Points"
//! and "Important Disclosures" sections of bullets. This splits such text
//! back into sections for display.

use serde::{Deserialize, Serialize};

/// Section headings the summarize prompt asks for.
pub const SUMMARY_SECTIONS: [&str; 3] = ["Key Numerical Data", "Main Points", "Important Disclosures"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSection {
    pub title: String,
    pub points: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSections {
    pub sections: Vec<NarrativeSection>,
}

impl NarrativeSections {
    /// Parse `**Heading**` / `## Heading` / `Heading:` lines followed by
    /// `•`, `-` or `*` bullets. Text with no headings yields no sections.
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<NarrativeSection> = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(title) = heading(line) {
                sections.push(NarrativeSection {
                    title,
                    points: Vec::new(),
                });
                continue;
            }

            let Some(point) = bullet(line) else {
                continue;
            };
            if let Some(current) = sections.last_mut() {
                current.points.push(point);
            }
        }

        sections.retain(|s| !s.points.is_empty());
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Points under a heading (case-insensitive).
    pub fn get(&self, title: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|s| s.title.eq_ignore_ascii_case(title))
            .map(|s| s.points.as_slice())
    }
}

fn heading(line: &str) -> Option<String> {
    let inner = if line.starts_with("**") && line.ends_with("**") && line.len() > 4 {
        line.trim_matches('*')
    } else if line.starts_with('#') {
        line.trim_start_matches('#')
    } else if line.ends_with(':') && !is_bullet(line) {
        line.trim_end_matches(':')
    } else {
        return None;
    };

    let title = inner.trim().trim_end_matches(':').trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn is_bullet(line: &str) -> bool {
    line.starts_with('•') || line.starts_with("- ") || line.starts_with("* ")
}

fn bullet(line: &str) -> Option<String> {
    if !is_bullet(line) {
        return None;
    }
    let point = line
        .trim_start_matches('•')
        .trim_start_matches("- ")
        .trim_start_matches("* ")
        .trim();
    (!point.is_empty()).then(|| point.to_string())
}
