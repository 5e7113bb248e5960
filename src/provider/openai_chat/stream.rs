use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::TextStream;
use crate::stream::{PayloadAction, TextFragmentStream};

use super::error::parse_openai_error;
use super::provider::PROVIDER_NAME;
use super::types::OpenAiStreamChunk;

pub(crate) fn create_stream(body: HttpBodyStream) -> TextStream {
    Box::pin(TextFragmentStream::new(body, PROVIDER_NAME, parse_payload).require_end_marker())
}

/// Concatenates the `delta.content` of every choice; `[DONE]` is handled by the decoder.
fn parse_payload(data: &str) -> Result<PayloadAction, LLMError> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data).map_err(|err| {
        LLMError::provider(PROVIDER_NAME, format!("failed to parse stream chunk: {err}"))
    })?;
    if chunk.error.is_some() {
        return Err(parse_openai_error(200, data, None));
    }

    let mut choices = chunk.choices;
    choices.sort_by_key(|choice| choice.index);
    let text: String = choices
        .into_iter()
        .filter_map(|choice| choice.delta.and_then(|delta| delta.content))
        .collect();

    Ok(if text.is_empty() {
        PayloadAction::Skip
    } else {
        PayloadAction::Emit(text)
    })
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;

    #[test]
    fn role_header_chunk_is_skipped() {
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#;
        assert_eq!(parse_payload(data).unwrap(), PayloadAction::Skip);
    }

    #[test]
    fn content_delta_is_emitted() {
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_payload(data).unwrap(),
            PayloadAction::Emit("Hel".to_string())
        );
    }

    #[test]
    fn embedded_error_is_raised() {
        let data = r#"{"error":{"message":"server overloaded","type":"server_error"}}"#;
        match parse_payload(data) {
            Err(LLMError::Provider { message, .. }) => {
                assert!(message.contains("server overloaded"))
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sse_body_becomes_text_fragments() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
        ]));
        let fragments: Vec<String> = create_stream(body)
            .map(|item| item.expect("fragment"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn body_closed_before_done_is_an_error() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![Ok(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n".to_vec(),
        )]));
        let items: Vec<Result<String, LLMError>> = create_stream(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("Hel"));
        assert!(matches!(items[1], Err(LLMError::StreamClosed { .. })));
    }
}
