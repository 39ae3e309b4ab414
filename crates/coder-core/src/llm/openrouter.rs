use crate::LlmError;
use crate::http::{RetryPolicy, classify_error, default_agent};
use crate::types::{LineContext, LlmVerdict};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{LlmClassifier, prompt};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
const SYSTEM_PROMPT: &str = "You are a transcript coding engine. Respond only with a JSON object \
     with exactly the keys code, confidence and explanation.";

pub struct OpenRouterClassifier {
    model: String,
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
    allowed_codes: Vec<String>,
}

impl OpenRouterClassifier {
    pub fn new(model: Option<&str>, api_key: Option<&str>) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(LlmError::MissingApiKey)?
            .to_string();
        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Ok(Self {
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            agent: default_agent(),
            retry: RetryPolicy::default(),
            allowed_codes: Vec::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
        })
    }

    fn parse_response(body: &str) -> Result<String, LlmError> {
        let response: OpenRouterResponse =
            serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices".into()))?;
        choice
            .message
            .content
            .ok_or_else(|| LlmError::InvalidResponse("empty message content".into()))
    }

    fn request_once(&self, url: &str, body: &serde_json::Value) -> Result<LlmVerdict, LlmError> {
        let response = self
            .agent
            .post(url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(classify_error)?;
        let raw = response
            .into_body()
            .read_to_string()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let content = Self::parse_response(raw.trim())?;
        prompt::parse_verdict(content.trim())
    }
}

impl LlmClassifier for OpenRouterClassifier {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn set_allowed_codes(&mut self, codes: Vec<String>) {
        self.allowed_codes = codes;
    }

    fn classify(&self, text: &str, context: &LineContext) -> Result<LlmVerdict, LlmError> {
        let prompt = prompt::build_prompt(text, context, &self.allowed_codes);
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(&prompt);
        debug!(line = context.line_number, model = %self.model, "requesting llm verdict");
        self.retry.run(|| self.request_once(&url, &body))
    }
}

#[derive(Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
}

#[derive(Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[derive(Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{OpenRouterClassifier, SYSTEM_PROMPT};
    use crate::LlmError;
    use crate::http::RetryPolicy;

    fn classifier() -> OpenRouterClassifier {
        OpenRouterClassifier::new(Some("test-model"), Some("test-key")).unwrap()
    }

    #[test]
    fn parse_response_extracts_content() {
        let body = r#"{"choices":[{"message":{"content":"{\"code\": \"CLC\"}"}}]}"#;
        let content = OpenRouterClassifier::parse_response(body).unwrap();
        assert!(content.contains("CLC"));
    }

    #[test]
    fn parse_response_without_choices_is_invalid() {
        let err = OpenRouterClassifier::parse_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        let err = OpenRouterClassifier::parse_response(r#"{"choices":[{"message":{"content":null}}]}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn build_request_body_is_deterministic_json_mode() {
        let body = classifier().build_request_body("prompt");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["content"], "prompt");
    }

    #[test]
    fn blank_key_is_missing() {
        assert!(matches!(
            OpenRouterClassifier::new(None, None),
            Err(LlmError::MissingApiKey)
        ));
        assert!(matches!(
            OpenRouterClassifier::new(None, Some("")),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn default_model_applies() {
        let classifier = OpenRouterClassifier::new(None, Some("key"))
            .unwrap()
            .with_retry(RetryPolicy::immediate());
        assert_eq!(classifier.model(), super::DEFAULT_MODEL);
    }
}
