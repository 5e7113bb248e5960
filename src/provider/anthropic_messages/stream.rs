use serde_json::Value;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::TextStream;
use crate::stream::{PayloadAction, TextFragmentStream};

use super::error::parse_anthropic_error;
use super::provider::PROVIDER_NAME;

pub(crate) fn create_stream(body: HttpBodyStream) -> TextStream {
    Box::pin(TextFragmentStream::new(body, PROVIDER_NAME, parse_event).require_end_marker())
}

// Each Anthropic SSE data payload is a JSON event tagged by `type`.
fn parse_event(data: &str) -> Result<PayloadAction, LLMError> {
    let event: Value = serde_json::from_str(data).map_err(|err| {
        LLMError::provider(PROVIDER_NAME, format!("failed to parse stream event: {err}"))
    })?;

    match event.get("type").and_then(Value::as_str).unwrap_or_default() {
        "content_block_delta" => {
            let Some(delta) = event.get("delta") else {
                return Ok(PayloadAction::Skip);
            };
            let is_text = delta
                .get("type")
                .and_then(Value::as_str)
                .is_none_or(|kind| kind == "text_delta");
            match delta.get("text").and_then(Value::as_str) {
                Some(text) if is_text => Ok(PayloadAction::Emit(text.to_string())),
                _ => Ok(PayloadAction::Skip),
            }
        }
        "message_stop" => Ok(PayloadAction::Finish),
        "error" => Err(parse_anthropic_error(200, data, None)),
        _ => Ok(PayloadAction::Skip),
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;

    #[test]
    fn text_delta_is_emitted() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Once upon"}}"#;
        assert_eq!(
            parse_event(data).unwrap(),
            PayloadAction::Emit("Once upon".to_string())
        );
    }

    #[test]
    fn non_text_deltas_and_bookkeeping_events_are_skipped() {
        for data in [
            r#"{"type":"message_start","message":{"id":"msg_1","role":"assistant"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":15}}"#,
        ] {
            assert_eq!(parse_event(data).unwrap(), PayloadAction::Skip, "{data}");
        }
    }

    #[test]
    fn error_event_is_raised() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match parse_event(data) {
            Err(LLMError::Provider { provider, message }) => {
                assert_eq!(provider, "Anthropic");
                assert!(message.contains("Overloaded"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn message_stop_ends_the_stream() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![Ok(concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"late\"}}\n\n",
        )
        .as_bytes()
        .to_vec())]));
        let fragments: Vec<String> = create_stream(body)
            .map(|item| item.expect("fragment"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hi".to_string()]);
    }

    #[tokio::test]
    async fn body_closed_before_message_stop_is_an_error() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![Ok(concat!(
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":null}}\n\n",
        )
        .as_bytes()
        .to_vec())]));
        let items: Vec<Result<String, LLMError>> = create_stream(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("Hi"));
        match &items[1] {
            Err(LLMError::StreamClosed { message }) => assert!(message.contains("Anthropic")),
            other => panic!("expected StreamClosed, got {other:?}"),
        }
    }
}
