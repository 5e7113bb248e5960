use serde_json::{Map, Value, json};

use crate::types::ChatRequest;

/// 构建 Gemini streamGenerateContent 请求体
///
/// Gemini 通过路径参数携带模型名称，因此 body 中不出现 `model`。
/// system prompt 走 `system_instruction`，用户消息进入 `contents`。
pub(crate) fn build_gemini_body(request: &ChatRequest, system_prompt: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": [{ "text": request.message }] }]),
    );
    if let Some(system) = system_prompt {
        body.insert(
            "system_instruction".to_string(),
            json!({ "parts": [{ "text": system }] }),
        );
    }
    Value::Object(body)
}
