use crate::dictionary::{Dictionary, split_keywords};
use crate::infer::{self, InferenceStrategy};
use crate::table::Table;
use crate::types::{Candidate, TranscriptRow};
use crate::{InferenceError, MatchError};
use regex::{Regex, RegexBuilder};
use tracing::trace;

pub const KEYWORD_COLUMN: &str = "keyword";
pub const CODE_COLUMN: &str = "code";

/// Confidence assigned to every keyword hit.
pub const KEYWORD_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRow {
    pub keyword: String,
    pub code: String,
}

/// Flat keyword→code table consumed by [`KeywordMatcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTable {
    rows: Vec<KeywordRow>,
}

impl KeywordTable {
    pub fn new(rows: Vec<KeywordRow>) -> Self {
        Self { rows }
    }

    /// One row per keyword, in dictionary order.
    pub fn from_dictionary(dictionary: &Dictionary) -> Self {
        let rows = dictionary
            .entries()
            .iter()
            .flat_map(|entry| {
                entry.keywords.iter().map(|keyword| KeywordRow {
                    keyword: keyword.clone(),
                    code: entry.code.clone(),
                })
            })
            .collect();
        Self { rows }
    }

    /// Build from a table that names its columns `keyword` and `code`.
    pub fn from_table(table: &Table) -> Result<Self, MatchError> {
        let (Some(keyword), Some(code)) =
            (table.position(KEYWORD_COLUMN), table.position(CODE_COLUMN))
        else {
            return Err(MatchError::InvalidInput(
                "keyword table must contain 'keyword' and 'code' columns".into(),
            ));
        };
        Ok(Self::from_columns(table, keyword, code))
    }

    /// Build from a table whose column roles are inferred.
    pub fn from_inferred_table(
        table: &Table,
        strategy: InferenceStrategy,
    ) -> Result<Self, InferenceError> {
        let roles = infer::infer_dictionary_columns(table, strategy)?;
        let keyword = table.position(&roles.keyword).unwrap_or(0);
        let code = table.position(&roles.code).unwrap_or(1);
        Ok(Self::from_columns(table, keyword, code))
    }

    fn from_columns(table: &Table, keyword: usize, code: usize) -> Self {
        let mut rows = Vec::new();
        for row in 0..table.len() {
            let (Some(cell), Some(code)) = (table.cell(row, keyword), table.cell(row, code)) else {
                continue;
            };
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            for keyword in split_keywords(cell) {
                rows.push(KeywordRow {
                    keyword,
                    code: code.to_string(),
                });
            }
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[KeywordRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct codes in first-seen order.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for row in &self.rows {
            if !codes.contains(&row.code) {
                codes.push(row.code.clone());
            }
        }
        codes
    }
}

/// Whole-word, case-insensitive pattern for a keyword or phrase.
pub fn keyword_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
        .case_insensitive(true)
        .build()
}

/// Keyword table with every pattern compiled once.
pub struct KeywordMatcher {
    patterns: Vec<(Regex, String)>,
}

impl KeywordMatcher {
    pub fn new(table: &KeywordTable) -> Result<Self, MatchError> {
        let patterns = table
            .rows()
            .iter()
            .map(|row| Ok((keyword_pattern(&row.keyword)?, row.code.clone())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    /// One candidate per matching table row, in table order.
    pub fn match_text(&self, text: &str) -> Vec<Candidate> {
        self.patterns
            .iter()
            .filter(|(pattern, _)| pattern.is_match(text))
            .map(|(_, code)| Candidate::keyword(code.clone(), KEYWORD_CONFIDENCE))
            .collect()
    }

    pub fn match_row(&self, row: &TranscriptRow) -> Result<Vec<Candidate>, MatchError> {
        let text = row
            .text
            .as_deref()
            .ok_or_else(|| MatchError::InvalidInput("row must contain a 'text' column".into()))?;
        // Speaker roles are recognized but do not change matching yet.
        if let Some(speaker) = row.speaker.as_deref() {
            trace!(speaker, "matching line with speaker role");
        }
        Ok(self.match_text(text))
    }
}

/// Match one row against a keyword table, returning `(code, confidence)` pairs.
pub fn keyword_match(
    row: &TranscriptRow,
    table: &KeywordTable,
) -> Result<Vec<(String, f64)>, MatchError> {
    let matcher = KeywordMatcher::new(table)?;
    Ok(matcher
        .match_row(row)?
        .into_iter()
        .map(|candidate| (candidate.code, candidate.confidence))
        .collect())
}

/// Legacy dictionary matching: at most one code per dictionary entry.
pub struct DictionaryMatcher {
    entries: Vec<(String, Vec<Regex>)>,
}

impl DictionaryMatcher {
    pub fn new(dictionary: &Dictionary) -> Result<Self, MatchError> {
        let mut entries = Vec::with_capacity(dictionary.len());
        for entry in dictionary.entries() {
            let patterns = entry
                .keywords
                .iter()
                .map(|keyword| keyword_pattern(keyword))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push((entry.code.clone(), patterns));
        }
        Ok(Self { entries })
    }

    /// Codes whose keywords appear in `text`, in dictionary order.
    pub fn matched_codes(&self, text: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
            .map(|(code, _)| code.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::parse_dictionary;

    fn kw_table(rows: &[(&str, &str)]) -> KeywordTable {
        KeywordTable::new(
            rows.iter()
                .map(|(keyword, code)| KeywordRow {
                    keyword: keyword.to_string(),
                    code: code.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn basic_word_matching() {
        let table = kw_table(&[("cancel", "CANCEL"), ("subscription", "SUBSCRIPTION")]);
        let hits = keyword_match(&TranscriptRow::new("I want to cancel my subscription"), &table)
            .unwrap();
        assert_eq!(
            hits,
            vec![("CANCEL".to_string(), 1.0), ("SUBSCRIPTION".to_string(), 1.0)]
        );
    }

    #[test]
    fn phrases_match_contiguously() {
        let table = kw_table(&[
            ("cancel my subscription", "CANCEL_SUBSCRIPTION"),
            ("immediately", "URGENT"),
            ("my plan", "PLAN"),
        ]);
        let row = TranscriptRow::new("I need to cancel my subscription plan immediately");
        let hits = keyword_match(&row, &table).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&("CANCEL_SUBSCRIPTION".to_string(), 1.0)));
        assert!(hits.contains(&("URGENT".to_string(), 1.0)));
    }

    #[test]
    fn matching_ignores_case() {
        let table = kw_table(&[("cancel", "CANCEL"), ("subscription", "SUBSCRIPTION")]);
        let hits =
            keyword_match(&TranscriptRow::new("I want to CANCEL my Subscription"), &table).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn substrings_of_longer_words_do_not_match() {
        let table = kw_table(&[("can", "CAN")]);
        assert!(keyword_match(&TranscriptRow::new("cancelation"), &table)
            .unwrap()
            .is_empty());

        let table = kw_table(&[("cancel", "CANCEL"), ("cancelled", "CANCELLED"), ("can", "CAN")]);
        let row = TranscriptRow::new("I want to cancel my cancelation subscription");
        assert_eq!(
            keyword_match(&row, &table).unwrap(),
            vec![("CANCEL".to_string(), 1.0)]
        );
    }

    #[test]
    fn repeated_keyword_counts_once() {
        let table = kw_table(&[("roger", "CLC")]);
        let hits = keyword_match(&TranscriptRow::new("roger, roger"), &table).unwrap();
        assert_eq!(hits, vec![("CLC".to_string(), 1.0)]);
    }

    #[test]
    fn speaker_role_does_not_change_hits() {
        let table = kw_table(&[("cancel", "CANCEL"), ("subscription", "SUBSCRIPTION")]);
        let row = TranscriptRow::new("I want to cancel my subscription").with_speaker("customer");
        assert_eq!(keyword_match(&row, &table).unwrap().len(), 2);
    }

    #[test]
    fn missing_text_is_invalid_input() {
        let table = kw_table(&[("cancel", "CANCEL")]);
        let err = keyword_match(&TranscriptRow::default(), &table).unwrap_err();
        assert!(err.to_string().contains("must contain a 'text' column"));
    }

    #[test]
    fn table_without_keyword_column_is_rejected() {
        let table = Table::from_columns(vec![
            ("word", vec!["cancel", "subscription"]),
            ("code", vec!["CANCEL", "SUBSCRIPTION"]),
        ]);
        let err = KeywordTable::from_table(&table).unwrap_err();
        assert!(err.to_string().contains("must contain 'keyword' and 'code' columns"));
    }

    #[test]
    fn inferred_table_resolves_roles() {
        let table = Table::from_columns(vec![
            ("category", vec!["CANCEL", "REFUND"]),
            ("term", vec!["cancel subscription", "request refund"]),
        ]);
        let keywords = KeywordTable::from_inferred_table(&table, InferenceStrategy::Scored).unwrap();
        assert_eq!(keywords.codes(), vec!["CANCEL", "REFUND"]);
        assert_eq!(keywords.rows()[0].keyword, "cancel subscription");
    }

    #[test]
    fn no_matches() {
        let table = kw_table(&[("cancel", "CANCEL")]);
        assert!(keyword_match(&TranscriptRow::new("I am just saying hello"), &table)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn dictionary_matcher_reports_each_code_once() {
        let dict = parse_dictionary("category,keywords\nCLC,\"roger, copy that\"\nMV,well done\n")
            .unwrap();
        let matcher = DictionaryMatcher::new(&dict).unwrap();
        assert_eq!(matcher.matched_codes("Roger, copy that. Well done!"), vec!["CLC", "MV"]);
        assert!(matcher.matched_codes("copy").is_empty());
    }

    #[test]
    fn keyword_table_from_dictionary_flattens_entries() {
        let dict = parse_dictionary("CLC,\"roger, copy\"\n").unwrap();
        let table = KeywordTable::from_dictionary(&dict);
        assert_eq!(table.len(), 2);
        assert_eq!(table.codes(), vec!["CLC"]);
    }
}
