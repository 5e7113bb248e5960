use serde_json::{Map, Value, json};

use crate::types::ChatRequest;

/// Builds a streaming Messages API body.
///
/// Anthropic takes the system prompt as a top-level field rather than a message and
/// requires `max_tokens` on every request.
pub(crate) fn build_anthropic_body(
    request: &ChatRequest,
    system_prompt: Option<&str>,
    max_tokens: u32,
) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(request.model.clone()));
    body.insert("max_tokens".to_string(), Value::from(max_tokens));
    body.insert("stream".to_string(), Value::Bool(true));
    if let Some(system) = system_prompt {
        body.insert("system".to_string(), Value::String(system.to_string()));
    }
    body.insert(
        "messages".to_string(),
        json!([{ "role": "user", "content": request.message }]),
    );
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_max_tokens_and_user_turn() {
        let request = ChatRequest::new("Hello", "claude-3-5-haiku-latest");
        let body = build_anthropic_body(&request, None, 4096);
        assert_eq!(body["model"], "claude-3-5-haiku-latest");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
        assert!(body.get("system").is_none());
        assert_eq!(
            body["messages"],
            json!([{ "role": "user", "content": "Hello" }])
        );
    }

    #[test]
    fn system_prompt_is_top_level() {
        let request = ChatRequest::new("Hello", "claude-3-5-haiku-latest");
        let body = build_anthropic_body(&request, Some("Answer in French."), 256);
        assert_eq!(body["system"], "Answer in French.");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    }
}
