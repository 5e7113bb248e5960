//! Provider configuration: explicit values first, environment second.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::OpenAiChatProvider;

/// Shared default system prompt applied to every provider.
pub const SYSTEM_PROMPT_VAR: &str = "CHORUS_SYSTEM_PROMPT";

/// Supported LLM vendors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    /// Every supported vendor, in display order.
    pub const ALL: [ProviderKind; 3] = [Self::OpenAi, Self::Anthropic, Self::Gemini];

    /// Lowercase identifier used on the command line and in serialized configs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Gemini has no base URL variable.
    pub fn base_url_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_BASE_URL"),
            Self::Anthropic => Some("ANTHROPIC_BASE_URL"),
            Self::Gemini => None,
        }
    }

    pub fn model_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_MODEL",
            Self::Anthropic => "ANTHROPIC_MODEL",
            Self::Gemini => "GEMINI_MODEL",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LLMError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(LLMError::InvalidConfig {
                field: "provider".to_string(),
                reason: format!("unknown provider: {other}"),
            }),
        }
    }
}

/// Values given explicitly (for example on the command line). Unset fields fall back to
/// the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub system_prompt: Option<String>,
}

/// Fully resolved configuration for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ProviderConfig {
    /// Resolves a configuration, consulting `env` for every field the overrides leave unset.
    ///
    /// Blank values count as unset on both sides.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Auth`] naming the expected variable when no API key is found.
    pub fn resolve<F>(
        kind: ProviderKind,
        overrides: ProviderOverrides,
        env: F,
    ) -> Result<Self, LLMError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| env(var).and_then(non_blank);
        let pick = |explicit: Option<String>, var: Option<&str>| {
            explicit
                .and_then(non_blank)
                .or_else(|| var.and_then(|var| lookup(var)))
        };

        let api_key = pick(overrides.api_key, Some(kind.api_key_var())).ok_or_else(|| {
            LLMError::Auth {
                message: format!(
                    "API key not provided for {kind}. Set {} in .env or use --api-key",
                    kind.api_key_var()
                ),
            }
        })?;

        Ok(Self {
            kind,
            api_key,
            base_url: pick(overrides.base_url, kind.base_url_var()),
            default_model: pick(overrides.default_model, Some(kind.model_var())),
            system_prompt: pick(overrides.system_prompt, Some(SYSTEM_PROMPT_VAR)),
        })
    }

    /// [`ProviderConfig::resolve`] against the process environment.
    pub fn from_env(kind: ProviderKind, overrides: ProviderOverrides) -> Result<Self, LLMError> {
        Self::resolve(kind, overrides, |var| std::env::var(var).ok())
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Builds the adapter described by `config` on top of `transport`.
///
/// # Errors
///
/// Returns [`LLMError::UnsupportedFeature`] when a base URL is configured for Gemini.
pub fn build_provider(
    config: &ProviderConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    let provider: DynProvider = match config.kind {
        ProviderKind::OpenAi => {
            let mut provider = OpenAiChatProvider::new(transport, config.api_key.clone());
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(prompt) = &config.system_prompt {
                provider = provider.with_system_prompt(prompt.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::Anthropic => {
            let mut provider = AnthropicMessagesProvider::new(transport, config.api_key.clone());
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(prompt) = &config.system_prompt {
                provider = provider.with_system_prompt(prompt.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::Gemini => {
            if config.base_url.is_some() {
                return Err(LLMError::UnsupportedFeature {
                    feature: "base_url override for Gemini",
                });
            }
            let mut provider = GoogleGeminiProvider::new(transport, config.api_key.clone());
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(prompt) = &config.system_prompt {
                provider = provider.with_system_prompt(prompt.clone());
            }
            Arc::new(provider)
        }
    };
    Ok(provider)
}

/// Builds every configured provider, sharing one transport.
pub fn build_providers(
    configs: &[ProviderConfig],
    transport: DynHttpTransport,
) -> Result<Vec<DynProvider>, LLMError> {
    configs
        .iter()
        .map(|config| build_provider(config, transport.clone()))
        .collect()
}

/// Masks an API key for display.
///
/// # Examples
///
/// ```
/// use chorus_llm::config::mask_api_key;
///
/// assert_eq!(mask_api_key("short-key"), "*********");
/// assert_eq!(mask_api_key("sk-proj-abcdef123456"), "sk-p************3456");
/// ```
pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}
