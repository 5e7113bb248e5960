use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Aggregates every failure mode exposed by the providers and the stream aggregator.
///
/// Per-provider failures raised during a chat session never escape the session: the
/// aggregator records them as that provider's terminal state. Only session-level misuse
/// (such as starting with no providers) is returned to the caller directly.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or missing credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Optional wait duration suggested by the provider before retrying.
        retry_after: Option<Duration>,
    },
    /// Indicates that the prompt exceeds the allowed token budget.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded { message: String },
    /// Signals validation failures in the request payload or in session arguments.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Declares that a capability is not supported by the selected provider.
    #[error("feature unsupported: {feature}")]
    UnsupportedFeature { feature: &'static str },
    /// Indicates that a requested model could not be resolved by the vendor.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the error payload when available.
        model: Option<String>,
        /// Full error message returned by the provider for debugging.
        message: String,
    },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
    /// A chat session was started without any provider to run.
    #[error("no providers available")]
    NoProvidersAvailable,
    /// Neither an explicit override nor a provider default names a model.
    #[error("no model configured for {provider}")]
    NoModelConfigured { provider: String },
    /// The caller raised the cancellation signal while the request was in flight.
    #[error("request cancelled")]
    Cancelled,
    /// Signals that a streaming channel closed before delivering its terminal marker.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// Wraps provider-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the provider, such as `OpenAI`.
        provider: &'static str,
        /// Human-readable error message returned by the provider.
        message: String,
    },
    /// Catches opaque or unexpected failures.
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use chorus_llm::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given provider name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use chorus_llm::error::LLMError;
    ///
    /// let err = LLMError::provider("OpenAI", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "OpenAI", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Returns `true` for [`LLMError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Returns `true` when an error code or message suggests a context window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded"
                | "max_context_length_exceeded"
                | "prompt_tokens_exceeded"
                | "context_window_exceeded"
        ) {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 5] = [
        "context length",
        "context window",
        "token limit",
        "maximum context",
        "prompt is too long",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Reads a numeric `Retry-After` header (seconds) from a response.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Attempts to extract a model identifier quoted inside an error message.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\'']
        .into_iter()
        .filter_map(|delimiter| between_delimiters(message, delimiter))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn between_delimiters(message: &str, delimiter: char) -> Option<&str> {
    let start = message.find(delimiter)? + delimiter.len_utf8();
    let rest = &message[start..];
    let end = rest.find(delimiter)?;
    Some(&rest[..end])
}
