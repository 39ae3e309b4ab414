use crate::aggregate::{DEFAULT_THRESHOLD, aggregate};
use crate::dictionary::Dictionary;
use crate::llm::LlmClassifier;
use crate::matcher::{DictionaryMatcher, KeywordMatcher, KeywordTable};
use crate::rules::{RuleCatalog, resolve_subcategories};
use crate::MatchError;
use crate::types::{ClassificationResult, LineContext, RuleClassification, TranscriptRow};
use tracing::{debug, warn};

/// How each transcript line is classified.
pub enum Strategy {
    /// Built-in regex catalog with subcategory resolution.
    Rules,
    /// Dictionary keyword matching with subcategory resolution.
    Dictionary(Dictionary),
    /// Keyword hits plus an optional LLM verdict, ranked by the aggregator.
    Scored {
        keywords: KeywordTable,
        llm: Option<Box<dyn LlmClassifier>>,
        threshold: f64,
    },
}

impl Strategy {
    pub fn scored(keywords: KeywordTable) -> Self {
        Strategy::Scored {
            keywords,
            llm: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `Text,B5T,Subcategory1,Subcategory2`
    Labels,
    /// `text,primary_code,primary_confidence,secondary_code,secondary_confidence,explanation`
    Ranked,
}

impl OutputLayout {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            OutputLayout::Labels => &["Text", "B5T", "Subcategory1", "Subcategory2"],
            OutputLayout::Ranked => &[
                "text",
                "primary_code",
                "primary_confidence",
                "secondary_code",
                "secondary_confidence",
                "explanation",
            ],
        }
    }

    /// Column holding the primary label.
    pub fn label_column(self) -> &'static str {
        match self {
            OutputLayout::Labels => "B5T",
            OutputLayout::Ranked => "primary_code",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Labels(RuleClassification),
    Ranked(ClassificationResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub row_index: usize,
    pub text: String,
    pub outcome: LineOutcome,
}

impl OutputRecord {
    pub fn cells(&self) -> Vec<String> {
        match &self.outcome {
            LineOutcome::Labels(labels) => vec![
                self.text.clone(),
                labels.b5t.clone(),
                labels.sub1.clone(),
                labels.sub2.clone(),
            ],
            LineOutcome::Ranked(result) => vec![
                self.text.clone(),
                result.primary_code.clone().unwrap_or_default(),
                format!("{:?}", result.primary_confidence),
                result.secondary_code.clone().unwrap_or_default(),
                format!("{:?}", result.secondary_confidence),
                result.explanation.clone().unwrap_or_default(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub classified: usize,
    pub skipped: usize,
    /// Rows that kept a keyword-only result after the LLM gave up.
    pub llm_fallbacks: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub records: Vec<OutputRecord>,
    pub stats: DispatchStats,
}

enum Engine {
    Rules(RuleCatalog),
    Dictionary(DictionaryMatcher),
    Scored {
        matcher: KeywordMatcher,
        llm: Option<Box<dyn LlmClassifier>>,
        threshold: f64,
    },
}

/// Classifies rows in input order with one compiled strategy.
pub struct Dispatcher {
    engine: Engine,
}

impl Dispatcher {
    pub fn new(strategy: Strategy) -> Result<Self, MatchError> {
        let engine = match strategy {
            Strategy::Rules => Engine::Rules(RuleCatalog::new()?),
            Strategy::Dictionary(dictionary) => {
                Engine::Dictionary(DictionaryMatcher::new(&dictionary)?)
            }
            Strategy::Scored {
                keywords,
                mut llm,
                threshold,
            } => {
                if let Some(llm) = llm.as_mut() {
                    llm.set_allowed_codes(keywords.codes());
                }
                Engine::Scored {
                    matcher: KeywordMatcher::new(&keywords)?,
                    llm,
                    threshold,
                }
            }
        };
        Ok(Self { engine })
    }

    pub fn layout(&self) -> OutputLayout {
        match self.engine {
            Engine::Rules(_) | Engine::Dictionary(_) => OutputLayout::Labels,
            Engine::Scored { .. } => OutputLayout::Ranked,
        }
    }

    /// Classify every row with text in input order. Rows without text are
    /// counted as skipped and left out of the records.
    pub fn classify_rows(&self, rows: &[TranscriptRow]) -> Dispatch {
        let mut dispatch = Dispatch::default();
        for (row_index, row) in rows.iter().enumerate() {
            let Some(text) = row.classifiable_text() else {
                dispatch.stats.skipped += 1;
                continue;
            };
            let outcome = self.classify_line(row_index, text, row, &mut dispatch.stats);
            dispatch.stats.classified += 1;
            dispatch.records.push(OutputRecord {
                row_index,
                text: text.to_string(),
                outcome,
            });
        }
        dispatch
    }

    fn classify_line(
        &self,
        row_index: usize,
        text: &str,
        row: &TranscriptRow,
        stats: &mut DispatchStats,
    ) -> LineOutcome {
        match &self.engine {
            Engine::Rules(catalog) => LineOutcome::Labels(catalog.classify(text)),
            Engine::Dictionary(matcher) => {
                let codes = matcher.matched_codes(text);
                debug!(line = row_index + 1, ?codes, "dictionary matches");
                LineOutcome::Labels(resolve_subcategories(&codes))
            }
            Engine::Scored {
                matcher,
                llm,
                threshold,
            } => {
                let hits: Vec<(String, f64)> = matcher
                    .match_text(text)
                    .into_iter()
                    .map(|candidate| (candidate.code, candidate.confidence))
                    .collect();
                let verdict = match llm {
                    Some(llm) => {
                        let context = LineContext {
                            keyword_hits: hits.iter().map(|(code, _)| code.clone()).collect(),
                            speaker: row.speaker.clone(),
                            ..LineContext::for_row(row_index)
                        };
                        match llm.classify(text, &context) {
                            Ok(verdict) => Some(verdict),
                            Err(err) => {
                                stats.llm_fallbacks += 1;
                                warn!(
                                    line = context.line_number,
                                    provider = llm.name(),
                                    error = %err,
                                    "llm unavailable, keeping keyword result"
                                );
                                None
                            }
                        }
                    }
                    None => None,
                };
                LineOutcome::Ranked(aggregate(&hits, verdict.as_ref(), *threshold))
            }
        }
    }
}
