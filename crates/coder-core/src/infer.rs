use crate::InferenceError;
use crate::table::Table;
use std::collections::HashSet;

pub const PREFERRED_KEYWORD_COLUMN: &str = "keywords";
pub const PREFERRED_CODE_COLUMN: &str = "classification_code";

/// Minimum winning score for either role in scored inference.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

const KEYWORD_INDICATORS: [&str; 6] = ["keyword", "term", "phrase", "text", "word", "expression"];
const CODE_INDICATORS: [&str; 7] = ["code", "id", "label", "tag", "category", "class", "type"];

pub(crate) const KEYWORD_ALTERNATIVES: [&str; 6] =
    ["keyword", "term", "phrase", "text", "word", "expression"];
pub(crate) const CODE_ALTERNATIVES: [&str; 7] = [
    "code",
    "id",
    "label",
    "classification",
    "category",
    "class",
    "type",
];

const NAME_MATCH_WEIGHT: f64 = 0.4;
const NAME_EXACT_WEIGHT: f64 = 0.3;
const UNIQUE_CODE_WEIGHT: f64 = 0.2;
const REPEATED_KEYWORD_WEIGHT: f64 = 0.15;
const MULTI_TOKEN_WEIGHT: f64 = 0.3;
const SINGLE_TOKEN_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InferenceStrategy {
    /// Heuristic scoring with a confidence gate.
    #[default]
    Scored,
    /// Fixed names, then common alternatives, then the first two columns.
    Fallback,
}

/// Column names chosen for the keyword and code roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRoles {
    pub keyword: String,
    pub code: String,
}

impl ColumnRoles {
    fn new(keyword: &str, code: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnScore {
    pub column: String,
    pub keyword_score: f64,
    pub code_score: f64,
}

pub fn infer_dictionary_columns(
    table: &Table,
    strategy: InferenceStrategy,
) -> Result<ColumnRoles, InferenceError> {
    match strategy {
        InferenceStrategy::Scored => infer_by_score(table),
        InferenceStrategy::Fallback => infer_by_name(table),
    }
}

pub fn infer_by_score(table: &Table) -> Result<ColumnRoles, InferenceError> {
    ensure_two_columns(table)?;
    if let Some(roles) = preferred_columns(table) {
        return Ok(roles);
    }

    let scores = score_columns(table);
    let mut keyword_idx = best_column(&scores, |s| s.keyword_score, None);
    let mut code_idx = best_column(&scores, |s| s.code_score, None);

    if let (Some(k), Some(c)) = (keyword_idx, code_idx)
        && k == c
    {
        let shared = &scores[k];
        if shared.keyword_score > shared.code_score {
            code_idx = best_column(&scores, |s| s.code_score, Some(k));
        } else if shared.code_score > shared.keyword_score {
            keyword_idx = best_column(&scores, |s| s.keyword_score, Some(c));
        } else {
            return Err(InferenceError::Ambiguous(format!(
                "column {} scores equally for both roles; {}",
                shared.column,
                describe_scores(&scores)
            )));
        }
    }

    let (Some(keyword_idx), Some(code_idx)) = (keyword_idx, code_idx) else {
        return Err(InferenceError::Ambiguous(format!(
            "no distinct column left for both roles; {}",
            describe_scores(&scores)
        )));
    };

    let keyword = &scores[keyword_idx];
    let code = &scores[code_idx];
    if keyword.keyword_score < CONFIDENCE_THRESHOLD || code.code_score < CONFIDENCE_THRESHOLD {
        return Err(InferenceError::LowConfidence {
            threshold: CONFIDENCE_THRESHOLD,
            diagnostics: describe_scores(&scores),
        });
    }

    Ok(ColumnRoles::new(&keyword.column, &code.column))
}

pub fn infer_by_name(table: &Table) -> Result<ColumnRoles, InferenceError> {
    ensure_two_columns(table)?;
    if let Some(roles) = preferred_columns(table) {
        return Ok(roles);
    }

    let keyword = first_present(table, &KEYWORD_ALTERNATIVES);
    let code = first_present(table, &CODE_ALTERNATIVES);
    if let (Some(keyword), Some(code)) = (keyword, code)
        && keyword != code
    {
        return Ok(ColumnRoles::new(keyword, code));
    }

    let columns = table.columns();
    Ok(ColumnRoles::new(&columns[0], &columns[1]))
}

/// Score every column for the keyword and code roles.
pub fn score_columns(table: &Table) -> Vec<ColumnScore> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let (name_keyword, name_code) = name_scores(name);
            let values: Vec<&str> = table.column_values(idx).flatten().collect();
            let (value_keyword, value_code) = value_scores(&values);
            ColumnScore {
                column: name.clone(),
                keyword_score: name_keyword + value_keyword,
                code_score: name_code + value_code,
            }
        })
        .collect()
}

/// Whether a column name carries a keyword or code indicator token.
pub(crate) fn names_a_role(name: &str) -> bool {
    let (keyword, code) = name_scores(name.trim());
    keyword > 0.0 || code > 0.0
}

/// `(code, keyword)` positions decided by header names alone: the strongest
/// code name, then the strongest keyword name among the other columns.
pub(crate) fn roles_from_names(names: &[String]) -> Option<(usize, usize)> {
    let scores: Vec<(f64, f64)> = names.iter().map(|name| name_scores(name.trim())).collect();
    let strongest = |role: fn(&(f64, f64)) -> f64, skip: Option<usize>| {
        scores
            .iter()
            .enumerate()
            .filter(|(idx, score)| Some(*idx) != skip && role(score) > 0.0)
            .fold(None, |best: Option<(usize, f64)>, (idx, score)| match best {
                Some((_, top)) if top >= role(score) => best,
                _ => Some((idx, role(score))),
            })
            .map(|(idx, _)| idx)
    };
    let code = strongest(|score| score.1, None)?;
    let keyword = strongest(|score| score.0, Some(code))?;
    Some((code, keyword))
}

fn ensure_two_columns(table: &Table) -> Result<(), InferenceError> {
    let count = table.columns().len();
    if count < 2 {
        return Err(InferenceError::TooFewColumns(count));
    }
    Ok(())
}

fn preferred_columns(table: &Table) -> Option<ColumnRoles> {
    let keyword = find_lowercase(table, PREFERRED_KEYWORD_COLUMN)?;
    let code = find_lowercase(table, PREFERRED_CODE_COLUMN)?;
    Some(ColumnRoles::new(keyword, code))
}

fn find_lowercase<'a>(table: &'a Table, name: &str) -> Option<&'a str> {
    table
        .columns()
        .iter()
        .find(|column| column.to_lowercase() == name)
        .map(String::as_str)
}

fn first_present<'a>(table: &'a Table, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| find_lowercase(table, name))
}

fn name_scores(name: &str) -> (f64, f64) {
    let lowered = name.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();
    (
        indicator_score(&lowered, &tokens, &KEYWORD_INDICATORS),
        indicator_score(&lowered, &tokens, &CODE_INDICATORS),
    )
}

fn indicator_score(name: &str, tokens: &[&str], indicators: &[&str]) -> f64 {
    let mut score = 0.0;
    if tokens
        .iter()
        .any(|token| indicators.iter().any(|ind| token.starts_with(ind)))
    {
        score += NAME_MATCH_WEIGHT;
    }
    if indicators.contains(&name) {
        score += NAME_EXACT_WEIGHT;
    }
    score
}

fn value_scores(values: &[&str]) -> (f64, f64) {
    let mut keyword = 0.0;
    let mut code = 0.0;
    if values.is_empty() {
        return (keyword, code);
    }

    let distinct: HashSet<&str> = values.iter().copied().collect();
    let ratio = distinct.len() as f64 / values.len() as f64;
    if ratio > 0.8 {
        code += UNIQUE_CODE_WEIGHT;
    } else if (0.01..=0.5).contains(&ratio) {
        keyword += REPEATED_KEYWORD_WEIGHT;
    }

    let is_text = values.iter().any(|value| value.trim().parse::<f64>().is_err());
    if is_text {
        let tokens: usize = values
            .iter()
            .map(|value| value.split_whitespace().count())
            .sum();
        let mean = tokens as f64 / values.len() as f64;
        if mean >= 2.0 {
            keyword += MULTI_TOKEN_WEIGHT;
        } else if mean < 1.5 {
            code += SINGLE_TOKEN_WEIGHT;
        }
    }

    (keyword, code)
}

fn best_column(
    scores: &[ColumnScore],
    score: impl Fn(&ColumnScore) -> f64,
    exclude: Option<usize>,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, candidate) in scores.iter().enumerate() {
        if Some(idx) == exclude {
            continue;
        }
        match best {
            Some(current) if score(candidate) <= score(&scores[current]) => {}
            _ => best = Some(idx),
        }
    }
    best
}

fn describe_scores(scores: &[ColumnScore]) -> String {
    scores
        .iter()
        .map(|s| {
            format!(
                "{} (keyword={:.2}, code={:.2})",
                s.column, s.keyword_score, s.code_score
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
