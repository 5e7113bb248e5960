use serde::Deserialize;

/// One page of `GET /v1/models`.
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct AnthropicModelPage {
    #[serde(default)]
    pub(crate) data: Vec<AnthropicModel>,
    #[serde(default)]
    pub(crate) has_more: bool,
    #[serde(default)]
    pub(crate) last_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct AnthropicModel {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub(crate) created_at: Option<String>,
}
