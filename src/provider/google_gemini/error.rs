use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

use super::provider::PROVIDER_NAME;

/// Parses error responses returned by Google Gemini.
///
/// Errors embedded in a 200 SSE stream carry their real HTTP code in `error.code`, which
/// is then used in place of the transport status.
pub(crate) fn parse_gemini_error(
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
        code: Option<u16>,
        message: Option<String>,
        status: Option<String>,
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
    let status_hint = error.status.as_deref().filter(|text| !text.is_empty());
    if let Some(status_text) = status_hint {
        message = format!("{message} ({status_text})");
    }

    if looks_like_token_limit_error(status_hint, &message) {
        return LLMError::TokenLimitExceeded { message };
    }

    let effective = match error.code {
        Some(code) if (200..300).contains(&status) => code,
        _ => status,
    };

    // Combine the HTTP status with the Google RPC status for classification.
    match (effective, status_hint) {
        (404, _) | (_, Some("NOT_FOUND")) => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        (401 | 403, _) | (_, Some("UNAUTHENTICATED" | "PERMISSION_DENIED")) => {
            LLMError::Auth { message }
        }
        (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => LLMError::RateLimit {
            message,
            retry_after,
        },
        (400, _) | (_, Some("INVALID_ARGUMENT")) => LLMError::Validation { message },
        _ => LLMError::Provider {
            provider: PROVIDER_NAME,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_auth_and_rate_limit_errors() {
        let body = r#"{
  "error": {
    "code": 400,
    "message": "API key not valid. Please pass a valid API key.",
    "status": "INVALID_ARGUMENT"
  }
}"#;
        // Gemini reports bad keys as INVALID_ARGUMENT.
        assert!(matches!(
            parse_gemini_error(400, body, None),
            LLMError::Validation { .. }
        ));

        let body = r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#;
        match parse_gemini_error(403, body, None) {
            LLMError::Auth { message } => assert!(message.contains("PERMISSION_DENIED")),
            other => panic!("expected Auth error, got {other:?}"),
        }

        let body = r#"{"error":{"code":429,"message":"quota exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        match parse_gemini_error(429, body, Some(Duration::from_secs(5))) {
            LLMError::RateLimit {
                message,
                retry_after,
            } => {
                assert!(message.contains("quota exhausted"));
                assert_eq!(retry_after, Some(Duration::from_secs(5)));
            }
            other => panic!("expected RateLimit error, got {other:?}"),
        }
    }

    #[test]
    fn embedded_code_classifies_in_stream_errors() {
        let body = r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        match parse_gemini_error(200, body, None) {
            LLMError::Provider { provider, message } => {
                assert_eq!(provider, "Gemini");
                assert!(message.contains("overloaded"));
            }
            other => panic!("expected Provider error, got {other:?}"),
        }

        let body = r#"{"error":{"code":429,"message":"slow down"}}"#;
        assert!(matches!(
            parse_gemini_error(200, body, None),
            LLMError::RateLimit { .. }
        ));
    }

    #[test]
    fn parse_token_limit_and_model_errors() {
        let body = r#"{"error":{"code":400,"message":"The input token count exceeds the maximum context window.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            parse_gemini_error(400, body, None),
            LLMError::TokenLimitExceeded { .. }
        ));

        let body = r#"{"error":{"code":404,"message":"Model `gemini-pro-oops` not found.","status":"NOT_FOUND"}}"#;
        match parse_gemini_error(404, body, None) {
            LLMError::ModelNotFound { model, .. } => {
                assert_eq!(model.as_deref(), Some("gemini-pro-oops"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }

        match parse_gemini_error(502, "<html>bad gateway</html>", None) {
            LLMError::Provider { message, .. } => {
                assert!(message.contains("status 502: <html>bad gateway</html>"));
            }
            other => panic!("expected Provider fallback error, got {other:?}"),
        }
    }
}
