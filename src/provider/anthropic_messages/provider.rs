use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{LLMError, retry_after_from_headers};
use crate::http::{
    DynHttpTransport, HttpResponse, HttpStreamResponse, fetch, is_success, open_event_stream,
    url_with_query,
};
use crate::provider::{LLMProvider, TextStream};
use crate::stream::collect_stream_text;
use crate::types::{CapabilityDescriptor, ChatRequest, ModelInfo};

use super::error::parse_anthropic_error;
use super::models::map_model;
use super::request::build_anthropic_body;
use super::stream::create_stream;
use super::types::AnthropicModelPage;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const MODELS_PAGE_SIZE: u32 = 1000;
pub(crate) const PROVIDER_NAME: &str = "Anthropic";

/// Anthropic Messages provider（兼容 Claude Messages API）
pub struct AnthropicMessagesProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
    pub(crate) system_prompt: Option<String>,
    pub(crate) max_tokens: u32,
}

impl AnthropicMessagesProvider {
    /// 使用默认 base_url 创建 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: None,
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// 自定义 base_url，便于接入代理或兼容层
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Upper bound on generated tokens, required by the Messages API.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/{path}")
        } else {
            format!("{base}/v1/{path}")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("anthropic-version".to_string(), API_VERSION.to_string());
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let retry_after = retry_after_from_headers(&response.headers);
        let status = response.status;
        let text = response.into_string()?;
        if is_success(status) {
            Ok(text)
        } else {
            Err(parse_anthropic_error(status, &text, retry_after))
        }
    }

    async fn fetch_model_page(&self, after_id: Option<&str>) -> Result<AnthropicModelPage, LLMError> {
        let limit = MODELS_PAGE_SIZE.to_string();
        let mut query = vec![("limit", limit.as_str())];
        query.extend(after_id.map(|after_id| ("after_id", after_id)));
        let url = url_with_query(&self.url("models"), query)?;
        let response = fetch(self.transport.as_ref(), PROVIDER_NAME, url, self.build_headers()).await?;
        let text = self.ensure_success(response)?;
        serde_json::from_str(&text).map_err(|err| {
            LLMError::provider(PROVIDER_NAME, format!("failed to parse model list: {err}"))
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicMessagesProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, LLMError> {
        let system_prompt = request
            .system_prompt
            .as_deref()
            .or(self.system_prompt.as_deref());
        let body = build_anthropic_body(&request, system_prompt, self.max_tokens);
        let HttpStreamResponse {
            status,
            headers,
            body,
        } = open_event_stream(
            self.transport.as_ref(),
            PROVIDER_NAME,
            self.url("messages"),
            self.build_headers(),
            &body,
        )
        .await?;
        if !is_success(status) {
            let text = collect_stream_text(body, PROVIDER_NAME).await?;
            return Err(parse_anthropic_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ));
        }
        Ok(create_stream(body))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError> {
        let mut models = Vec::new();
        let mut after_id: Option<String> = None;
        loop {
            let page = self.fetch_model_page(after_id.as_deref()).await?;
            models.extend(page.data.into_iter().map(map_model));
            match page.last_id {
                Some(last_id) if page.has_more && after_id.as_deref() != Some(&last_id) => {
                    tracing::debug!(provider = PROVIDER_NAME, after_id = %last_id, "fetching next model page");
                    after_id = Some(last_id);
                }
                _ => break,
            }
        }
        Ok(models)
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_model_listing: true,
            supports_base_url_override: true,
            supports_system_prompt: true,
        }
    }
}
