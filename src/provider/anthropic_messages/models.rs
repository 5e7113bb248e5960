use chrono::DateTime;

use crate::types::ModelInfo;

use super::types::AnthropicModel;

pub(crate) fn map_model(model: AnthropicModel) -> ModelInfo {
    let created = model
        .created_at
        .as_deref()
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|timestamp| timestamp.timestamp());
    ModelInfo {
        name: Some(model.display_name.unwrap_or_else(|| model.id.clone())),
        id: model.id,
        description: None,
        created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::anthropic_messages::types::AnthropicModelPage;

    #[test]
    fn page_maps_display_name_and_creation_time() {
        let page: AnthropicModelPage = serde_json::from_str(
            r#"{
  "data": [
    {"type":"model","id":"claude-3-5-sonnet-20241022","display_name":"Claude 3.5 Sonnet (New)","created_at":"2024-10-22T00:00:00Z"},
    {"type":"model","id":"claude-legacy","created_at":"not a date"}
  ],
  "has_more": false,
  "first_id": "claude-3-5-sonnet-20241022",
  "last_id": "claude-legacy"
}"#,
        )
        .expect("page");

        let models: Vec<ModelInfo> = page.data.into_iter().map(map_model).collect();
        assert_eq!(models[0].name.as_deref(), Some("Claude 3.5 Sonnet (New)"));
        assert_eq!(models[0].created, Some(1_729_555_200));
        assert_eq!(models[1].name.as_deref(), Some("claude-legacy"));
        assert_eq!(models[1].created, None);
    }
}
