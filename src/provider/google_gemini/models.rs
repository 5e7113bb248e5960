use crate::types::ModelInfo;

use super::types::GeminiModel;

/// Maps a Gemini model entry, keeping the full `models/...` resource name as the id.
pub(crate) fn map_model(model: GeminiModel) -> ModelInfo {
    let mut info = ModelInfo::new(model.name);
    if let Some(display_name) = model.display_name {
        info = info.with_name(display_name);
    }
    if let Some(description) = model.description.filter(|text| !text.trim().is_empty()) {
        info = info.with_description(description);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::google_gemini::types::GeminiModelPage;

    #[test]
    fn page_maps_every_model() {
        let page: GeminiModelPage = serde_json::from_str(
            r#"{
  "models": [
    {"name":"models/gemini-2.0-flash","displayName":"Gemini 2.0 Flash","description":"Fast model","supportedGenerationMethods":["generateContent","countTokens"]},
    {"name":"models/text-embedding-004","displayName":"Text Embedding 004","supportedGenerationMethods":["embedContent"]}
  ],
  "nextPageToken": "abc"
}"#,
        )
        .expect("page");
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let models: Vec<ModelInfo> = page.models.into_iter().map(map_model).collect();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "models/gemini-2.0-flash");
        assert_eq!(models[0].name.as_deref(), Some("Gemini 2.0 Flash"));
        assert_eq!(models[0].description.as_deref(), Some("Fast model"));
        assert_eq!(models[1].description, None);
    }
}
