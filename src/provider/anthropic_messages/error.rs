use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

use super::provider::PROVIDER_NAME;

/// Parses error responses returned by the Anthropic API.
///
/// Classification uses the HTTP status first and the `error.type` field second, so the
/// same parser handles `error` events delivered inside a successful SSE response.
pub(crate) fn parse_anthropic_error(
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
        r#type: Option<String>,
    }

    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        // Fallback: if the payload cannot be parsed, surface the raw body.
        return LLMError::Provider {
            provider: PROVIDER_NAME,
            message: format!("status {status}: {body}"),
        };
    };

    let kind = error.r#type.unwrap_or_default();
    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    if !kind.is_empty() {
        message = format!("{message} ({kind})");
    }

    if looks_like_token_limit_error(None, &message) {
        return LLMError::TokenLimitExceeded { message };
    }

    match (status, kind.as_str()) {
        (401 | 403, _) | (_, "authentication_error" | "permission_error") => {
            LLMError::Auth { message }
        }
        (429, _) | (_, "rate_limit_error") => LLMError::RateLimit {
            message,
            retry_after,
        },
        (404, _) | (_, "not_found_error") => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        (400, _) | (_, "invalid_request_error") => LLMError::Validation { message },
        _ => LLMError::Provider {
            provider: PROVIDER_NAME,
            message,
        },
    }
}
