use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::LLMError;
use crate::types::{CapabilityDescriptor, ChatRequest, ModelInfo};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod openai_chat;

/// Lazy, finite sequence of text fragments produced by one chat call.
///
/// The stream is not restartable. It ends normally on vendor end-of-stream or yields a
/// single error and then ends.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// Capability set every vendor adapter implements.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stable display identity, unique among the providers of one chat session.
    fn name(&self) -> &str;

    /// Model used when the caller does not pass an explicit override.
    fn default_model(&self) -> Option<&str>;

    /// Picks the explicit override first, the provider default second.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::NoModelConfigured`] when neither is present.
    fn resolve_model(&self, explicit: Option<&str>) -> Result<String, LLMError> {
        explicit
            .or_else(|| self.default_model())
            .filter(|model| !model.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| LLMError::NoModelConfigured {
                provider: self.name().to_string(),
            })
    }

    /// Opens a streaming chat call and returns its text fragments.
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, LLMError>;

    /// Lists every model visible to the configured key, following pagination.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError>;

    /// Reports whether the configured key can list models.
    ///
    /// There is no dedicated auth check: keys scoped without model-listing access
    /// will report `false` even if they could chat.
    async fn validate_key(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(provider = self.name(), error = %err, "key validation failed");
                false
            }
        }
    }

    /// Describes the optional behaviours this adapter supports.
    fn capabilities(&self) -> CapabilityDescriptor;
}

/// Thread-safe provider handle.
pub type DynProvider = Arc<dyn LLMProvider>;
