use crate::types::{
    Candidate, CandidateSource, ClassificationResult, LlmVerdict, is_valid_confidence,
};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Merge keyword hits and an optional LLM verdict into one ranked result.
///
/// Keyword hits come first and the LLM candidate (when it carries both a code
/// and a confidence within `0.0..=1.0`) is appended last, so the stable sort keeps keyword hits
/// ahead of an equally confident LLM answer. Only the second-ranked valid
/// candidate is considered for the secondary slot; a duplicate code there
/// leaves the slot empty.
pub fn aggregate(
    keyword_hits: &[(String, f64)],
    llm: Option<&LlmVerdict>,
    threshold: f64,
) -> ClassificationResult {
    let mut candidates: Vec<Candidate> = keyword_hits
        .iter()
        .map(|(code, confidence)| Candidate::keyword(code.clone(), *confidence))
        .collect();

    if let Some(LlmVerdict {
        code: Some(code),
        confidence: Some(confidence),
        explanation,
    }) = llm
        && is_valid_confidence(*confidence)
    {
        candidates.push(Candidate {
            code: code.clone(),
            confidence: *confidence,
            source: CandidateSource::Llm,
            explanation: explanation.clone(),
        });
    }

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates.retain(|candidate| candidate.confidence >= threshold);

    let Some(primary) = candidates.first() else {
        return ClassificationResult::default();
    };

    let explanation = candidates
        .iter()
        .find(|candidate| candidate.source == CandidateSource::Llm)
        .and_then(|candidate| candidate.explanation.clone());
    let secondary = candidates
        .get(1)
        .filter(|candidate| candidate.code != primary.code);

    ClassificationResult {
        primary_code: Some(primary.code.clone()),
        primary_confidence: primary.confidence,
        secondary_code: secondary.map(|candidate| candidate.code.clone()),
        secondary_confidence: secondary.map_or(0.0, |candidate| candidate.confidence),
        explanation,
    }
}
