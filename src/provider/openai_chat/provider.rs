use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{LLMError, retry_after_from_headers};
use crate::http::{
    DynHttpTransport, HttpResponse, HttpStreamResponse, fetch, is_success, open_event_stream,
};
use crate::provider::{LLMProvider, TextStream};
use crate::stream::collect_stream_text;
use crate::types::{CapabilityDescriptor, ChatRequest, ModelInfo};

use super::error::parse_openai_error;
use super::models::map_models;
use super::request::build_openai_body;
use super::stream::create_stream;
use super::types::OpenAiModelList;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub(crate) const PROVIDER_NAME: &str = "OpenAI";

/// OpenAI Chat Completions provider, also usable against OpenAI-compatible gateways.
pub struct OpenAiChatProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
    pub(crate) system_prompt: Option<String>,
}

impl OpenAiChatProvider {
    /// Creates a provider pointing at `https://api.openai.com`.
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: None,
            system_prompt: None,
        }
    }

    /// Custom base URL, with or without the trailing `/v1`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// System prompt used when a request carries none.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
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
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let retry_after = retry_after_from_headers(&response.headers);
        let status = response.status;
        let text = response.into_string()?;
        if is_success(status) {
            Ok(text)
        } else {
            Err(parse_openai_error(status, &text, retry_after))
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
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
        let body = build_openai_body(&request, system_prompt);
        let HttpStreamResponse {
            status,
            headers,
            body,
        } = open_event_stream(
            self.transport.as_ref(),
            PROVIDER_NAME,
            self.url("chat/completions"),
            self.build_headers(),
            &body,
        )
        .await?;
        if !is_success(status) {
            let text = collect_stream_text(body, PROVIDER_NAME).await?;
            return Err(parse_openai_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ));
        }
        Ok(create_stream(body))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError> {
        let response = fetch(
            self.transport.as_ref(),
            PROVIDER_NAME,
            self.url("models"),
            self.build_headers(),
        )
        .await?;
        let text = self.ensure_success(response)?;
        let list: OpenAiModelList = serde_json::from_str(&text).map_err(|err| {
            LLMError::provider(PROVIDER_NAME, format!("failed to parse model list: {err}"))
        })?;
        Ok(map_models(list))
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
