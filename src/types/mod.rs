//! Shared data structures exchanged between the adapters, the aggregator and the CLI.
//!
//! These types normalize vendor-specific payloads so the rest of the crate can stay
//! agnostic of individual API differences.

use serde::{Deserialize, Serialize};

/// Normalized model listing record, identical in shape for every vendor.
///
/// # Examples
///
/// ```
/// # use chorus_llm::types::ModelInfo;
/// let info = ModelInfo::new("gpt-4o-mini").with_name("GPT-4o mini");
/// assert_eq!(info.id, "gpt-4o-mini");
/// assert_eq!(info.name.as_deref(), Some("GPT-4o mini"));
/// assert!(info.created.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier accepted by the vendor's chat endpoint.
    pub id: String,
    /// Human-friendly display name.
    pub name: Option<String>,
    /// Free-form description published by the vendor.
    pub description: Option<String>,
    /// Creation time as unix seconds.
    pub created: Option<i64>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            created: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_created(mut self, created: i64) -> Self {
        self.created = Some(created);
        self
    }
}

/// Single-turn streaming chat request handed to a provider.
///
/// The model is already resolved by the time a request reaches a provider; the system
/// prompt is the per-request override, providers fall back to their configured default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message text.
    pub message: String,
    /// Resolved model identifier.
    pub model: String,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: model.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Describes which optional behaviours a provider adapter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Incremental text delivery through `stream_chat`.
    pub supports_stream: bool,
    /// Model discovery through `list_models`.
    pub supports_model_listing: bool,
    /// Pointing the adapter at a proxy or compatible gateway.
    pub supports_base_url_override: bool,
    /// Honouring a system prompt.
    pub supports_system_prompt: bool,
}
