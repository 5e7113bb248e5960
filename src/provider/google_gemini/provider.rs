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

use super::error::parse_gemini_error;
use super::models::map_model;
use super::request::build_gemini_body;
use super::stream::create_stream;
use super::types::GeminiModelPage;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODELS_PAGE_SIZE: u32 = 1000;
pub(crate) const PROVIDER_NAME: &str = "Gemini";

/// Google Gemini provider for the Generative Language API.
///
/// The endpoint is fixed; Gemini has no supported base URL override.
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
    pub(crate) system_prompt: Option<String>,
}

impl GoogleGeminiProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            default_model: None,
            system_prompt: None,
        }
    }

    /// Sets a default model such as `gemini-2.0-flash`.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Builds the SSE endpoint for `streamGenerateContent`.
    pub(crate) fn stream_endpoint(&self, model: &str) -> String {
        format!(
            "{BASE_URL}/{}:streamGenerateContent?alt=sse",
            normalize_model(model)
        )
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
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
            Err(parse_gemini_error(status, &text, retry_after))
        }
    }

    async fn fetch_model_page(&self, page_token: Option<&str>) -> Result<GeminiModelPage, LLMError> {
        let page_size = MODELS_PAGE_SIZE.to_string();
        let mut query = vec![("pageSize", page_size.as_str())];
        query.extend(page_token.map(|token| ("pageToken", token)));
        let url = url_with_query(&format!("{BASE_URL}/models"), query)?;
        let response = fetch(self.transport.as_ref(), PROVIDER_NAME, url, self.build_headers()).await?;
        let text = self.ensure_success(response)?;
        serde_json::from_str(&text).map_err(|err| {
            LLMError::provider(PROVIDER_NAME, format!("failed to parse model list: {err}"))
        })
    }
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
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
        let body = build_gemini_body(&request, system_prompt);
        let HttpStreamResponse {
            status,
            headers,
            body,
        } = open_event_stream(
            self.transport.as_ref(),
            PROVIDER_NAME,
            self.stream_endpoint(&request.model),
            self.build_headers(),
            &body,
        )
        .await?;
        if !is_success(status) {
            let text = collect_stream_text(body, PROVIDER_NAME).await?;
            return Err(parse_gemini_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ));
        }
        Ok(create_stream(body))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.fetch_model_page(page_token.as_deref()).await?;
            models.extend(page.models.into_iter().map(map_model));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) if page_token.as_deref() != Some(&next) => {
                    tracing::debug!(provider = PROVIDER_NAME, "fetching next model page");
                    page_token = Some(next);
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
            supports_base_url_override: false,
            supports_system_prompt: true,
        }
    }
}

/// Accepts `gemini-2.0-flash`, `models/gemini-2.0-flash` or `tunedModels/...`.
fn normalize_model(model: &str) -> String {
    let model = model.trim().trim_start_matches('/');
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}
