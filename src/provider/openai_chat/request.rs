use serde_json::{Value, json};

use crate::types::ChatRequest;

/// Builds a streaming Chat Completions body: optional system message, then the user turn.
pub(crate) fn build_openai_body(request: &ChatRequest, system_prompt: Option<&str>) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.message }));

    json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_without_system_prompt_has_single_user_message() {
        let request = ChatRequest::new("Hello", "gpt-4o-mini");
        let body = build_openai_body(&request, None);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(
            body["messages"],
            json!([{ "role": "user", "content": "Hello" }])
        );
    }

    #[test]
    fn system_prompt_comes_first() {
        let request = ChatRequest::new("Hello", "gpt-4o-mini");
        let body = build_openai_body(&request, Some("Be brief."));
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be brief.");
        assert_eq!(messages[1]["role"], "user");
    }
}
