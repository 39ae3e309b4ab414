pub mod openrouter;
mod prompt;

use crate::LlmError;
use crate::types::{LineContext, LlmVerdict};

pub use openrouter::OpenRouterClassifier;
pub use prompt::{build_prompt, parse_verdict};

pub const DEFAULT_PROVIDER: &str = "openrouter";

/// A model-backed classifier for one transcript line at a time.
pub trait LlmClassifier: Send {
    fn name(&self) -> &'static str;

    /// Codes the model may answer with, used to constrain the prompt.
    fn set_allowed_codes(&mut self, codes: Vec<String>);

    /// Retries only failures another attempt could fix ([`LlmError::is_retryable`]):
    /// network errors, 429 and 5xx responses, unparseable output. Other 4xx
    /// rejections and a missing key return on the first attempt; the caller
    /// keeps the keyword-only result either way.
    fn classify(&self, text: &str, context: &LineContext) -> Result<LlmVerdict, LlmError>;
}

pub fn create_classifier(
    provider: &str,
    model: Option<&str>,
    api_key: Option<&str>,
) -> Result<Box<dyn LlmClassifier>, LlmError> {
    match provider {
        "openrouter" => Ok(Box::new(OpenRouterClassifier::new(model, api_key)?)),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}
