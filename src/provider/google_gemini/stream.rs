use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::TextStream;
use crate::stream::{PayloadAction, TextFragmentStream};

use super::error::parse_gemini_error;
use super::provider::PROVIDER_NAME;
use super::types::GeminiStreamChunk;

pub(crate) fn create_stream(body: HttpBodyStream) -> TextStream {
    Box::pin(TextFragmentStream::new(body, PROVIDER_NAME, parse_chunk))
}

// Gemini sends no terminal marker; the stream ends when the body closes.
fn parse_chunk(data: &str) -> Result<PayloadAction, LLMError> {
    let chunk: GeminiStreamChunk = serde_json::from_str(data).map_err(|err| {
        LLMError::provider(PROVIDER_NAME, format!("failed to parse stream chunk: {err}"))
    })?;

    if chunk.error.is_some() {
        return Err(parse_gemini_error(200, data, None));
    }

    if chunk.candidates.is_empty() {
        if let Some(reason) = chunk.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(LLMError::provider(
                PROVIDER_NAME,
                format!("prompt blocked: {reason}"),
            ));
        }
        return Ok(PayloadAction::Skip);
    }

    // Only the first candidate is shown.
    let text: String = chunk.candidates[0]
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter(|part| part.thought != Some(true))
        .filter_map(|part| part.text.as_deref())
        .collect();
    Ok(PayloadAction::Emit(text))
}
