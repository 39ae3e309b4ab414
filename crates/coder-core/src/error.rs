use std::io;
use thiserror::Error;

/// Errors from reading and writing tabular files.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("csv parse error: {0}")]
    Parse(String),

    #[error("table io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from loading or installing a keyword dictionary.
#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("dictionary not found: {0}")]
    NotFound(String),

    #[error("dictionary parse error: {0}")]
    Parse(String),

    #[error("dictionary columns invalid: {0}")]
    InvalidColumns(String),

    #[error("dictionary io error: {0}")]
    Io(#[from] io::Error),

    #[error("dictionary column inference failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Errors from column-role inference.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("table must have at least 2 columns (found {0})")]
    TooFewColumns(usize),

    #[error("column inference confidence below {threshold}: {diagnostics}")]
    LowConfidence { threshold: f64, diagnostics: String },

    #[error("column roles are ambiguous: {0}")]
    Ambiguous(String),
}

/// Errors from keyword matching.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("keyword pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Errors from the LLM classification provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API key not set; export OPENROUTER_API_KEY or set llm.api_key")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unknown llm provider: {0}")]
    UnknownProvider(String),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::InvalidResponse(_))
    }
}

/// Errors from processing transcript files.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("input not found: {0}")]
    NotFound(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("input/output mismatch: {0}")]
    Arity(String),

    #[error("process io error: {0}")]
    Io(#[from] io::Error),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
}
