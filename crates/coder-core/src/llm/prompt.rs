use crate::LlmError;
use crate::types::{LineContext, LlmVerdict, is_valid_confidence};
use serde_json::Value;

pub fn build_prompt(text: &str, context: &LineContext, allowed_codes: &[String]) -> String {
    const JSON_SCHEMA_SAMPLE: &str =
        r#"{"code": "CLC", "confidence": 0.85, "explanation": "..."}"#;

    let speaker_block = context
        .speaker
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| format!("Speaker: {value}\n"))
        .unwrap_or_default();
    let hits_block = if context.keyword_hits.is_empty() {
        "Keyword matches: none\n".to_string()
    } else {
        format!("Keyword matches: {}\n", context.keyword_hits.join(", "))
    };
    let codes_block = if allowed_codes.is_empty() {
        String::new()
    } else {
        format!("Allowed codes: {}\n", allowed_codes.join(", "))
    };

    format!(
        r#"<task>
Classify one transcript line into a single behavioral code.
</task>

<schema>
Output one JSON object with exactly these keys:
{schema}
confidence is a number between 0.0 and 1.0.
</schema>

<context>
Line {line}
{speaker_block}{hits_block}{codes_block}</context>

<line>
{text}
</line>"#,
        schema = JSON_SCHEMA_SAMPLE,
        line = context.line_number,
        text = text.trim(),
    )
}

/// Read a verdict out of model output, tolerating prose around the object.
/// A confidence outside `0.0..=1.0` is dropped, so the verdict adds no candidate.
pub fn parse_verdict(output: &str) -> Result<LlmVerdict, LlmError> {
    let value = match serde_json::from_str::<Value>(output) {
        Ok(value) => value,
        Err(_) => {
            let json = extract_json_object(output)
                .ok_or_else(|| LlmError::InvalidResponse("no JSON object in output".into()))?;
            serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse(e.to_string()))?
        }
    };
    let object = value
        .as_object()
        .ok_or_else(|| LlmError::InvalidResponse("verdict is not a JSON object".into()))?;

    let code = object
        .get("code")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string);
    let confidence = object
        .get("confidence")
        .and_then(|value| match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
        .filter(|confidence| is_valid_confidence(*confidence));
    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(LlmVerdict {
        code,
        confidence,
        explanation,
    })
}

fn extract_json_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&input[start..=end])
}
