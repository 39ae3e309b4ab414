use serde::{Deserialize, Serialize};

/// Label assigned when no rule or dictionary entry matched a line.
pub const UNCLASSIFIED: &str = "99";

/// Confidences are finite and within `0.0..=1.0`.
pub fn is_valid_confidence(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// One code and the lowercase trigger strings that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub code: String,
    pub keywords: Vec<String>,
}

/// A single transcript line, resolved from its source table once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRow {
    pub text: Option<String>,
    pub speaker: Option<String>,
}

impl TranscriptRow {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            speaker: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Text if present and not blank.
    pub fn classifiable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.trim().is_empty())
    }
}

/// Where a candidate classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Keyword,
    Llm,
}

/// A scored code proposal for one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub confidence: f64,
    pub source: CandidateSource,
    pub explanation: Option<String>,
}

impl Candidate {
    pub fn keyword(code: impl Into<String>, confidence: f64) -> Self {
        Self {
            code: code.into(),
            confidence,
            source: CandidateSource::Keyword,
            explanation: None,
        }
    }
}

/// Ranked decision for one line in the scored path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub primary_code: Option<String>,
    pub primary_confidence: f64,
    pub secondary_code: Option<String>,
    pub secondary_confidence: f64,
    pub explanation: Option<String>,
}

/// Primary label plus two subcategories in the rule-based path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleClassification {
    pub b5t: String,
    pub sub1: String,
    pub sub2: String,
}

impl Default for RuleClassification {
    fn default() -> Self {
        Self {
            b5t: UNCLASSIFIED.to_string(),
            sub1: String::new(),
            sub2: String::new(),
        }
    }
}

/// Per-line context handed to the LLM provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineContext {
    pub row_index: usize,
    pub line_number: usize,
    pub keyword_hits: Vec<String>,
    pub speaker: Option<String>,
}

impl LineContext {
    pub fn for_row(row_index: usize) -> Self {
        Self {
            row_index,
            line_number: row_index + 1,
            ..Self::default()
        }
    }
}

/// Structured verdict returned by the LLM. Every field is optional because
/// model output is not trusted to follow the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmVerdict {
    pub code: Option<String>,
    pub confidence: Option<f64>,
    pub explanation: Option<String>,
}

impl LlmVerdict {
    pub fn new(code: impl Into<String>, confidence: f64, explanation: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            confidence: Some(confidence),
            explanation: Some(explanation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_not_classifiable() {
        let row = TranscriptRow {
            text: Some("   ".to_string()),
            speaker: None,
        };
        assert_eq!(row.classifiable_text(), None);
        assert_eq!(TranscriptRow::default().classifiable_text(), None);
        assert_eq!(TranscriptRow::new("roger").classifiable_text(), Some("roger"));
    }

    #[test]
    fn line_context_numbers_from_one() {
        let ctx = LineContext::for_row(4);
        assert_eq!(ctx.row_index, 4);
        assert_eq!(ctx.line_number, 5);
    }

    #[test]
    fn verdict_parses_partial_json() {
        let verdict: LlmVerdict = serde_json::from_str(r#"{"code": "CLC"}"#).unwrap();
        assert_eq!(verdict.code.as_deref(), Some("CLC"));
        assert_eq!(verdict.confidence, None);
    }
}
