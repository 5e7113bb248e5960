use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

use super::provider::PROVIDER_NAME;

/// Parses error payloads returned by OpenAI-compatible endpoints.
///
/// Also used for `{"error": ...}` objects embedded in an SSE stream, where `status` is
/// the (successful) status of the enclosing response.
pub(crate) fn parse_openai_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }
    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        #[allow(dead_code)]
        r#type: Option<String>,
        code: Option<Value>,
    }

    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        return LLMError::Provider {
            provider: PROVIDER_NAME,
            message: format!("status {status}: {body}"),
        };
    };

    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    let code = error.code.as_ref().map(|code| match code {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });
    if let Some(code) = &code {
        message = format!("{message} ({code})");
    }

    if looks_like_token_limit_error(code.as_deref(), &message) {
        return LLMError::TokenLimitExceeded { message };
    }
    if status == 404 || code.as_deref() == Some("model_not_found") {
        return LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        };
    }

    match status {
        401 | 403 => LLMError::Auth { message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        400 => LLMError::Validation { message },
        _ => LLMError::Provider {
            provider: PROVIDER_NAME,
            message,
        },
    }
}
