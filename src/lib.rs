//! Fan one prompt out to several LLM vendors and collect every stream side by side.
//!
//! - [`provider`] holds the [`LLMProvider`] trait and the OpenAI, Anthropic and Gemini
//!   adapters, all speaking through an injectable [`http::HttpTransport`].
//! - [`aggregator`] runs one task per provider and exposes race-free snapshots.
//! - [`config`] resolves provider settings from explicit values and the environment.
//!
//! ```no_run
//! use chorus_llm::aggregator::{ChatPrompt, StreamAggregator};
//! use chorus_llm::config::{ProviderConfig, ProviderKind, ProviderOverrides, build_providers};
//! use chorus_llm::http::reqwest::default_dyn_transport;
//!
//! # async fn run() -> Result<(), chorus_llm::LLMError> {
//! let configs = vec![
//!     ProviderConfig::from_env(ProviderKind::OpenAi, ProviderOverrides::default())?,
//!     ProviderConfig::from_env(ProviderKind::Anthropic, ProviderOverrides::default())?,
//! ];
//! let providers = build_providers(&configs, default_dyn_transport()?)?;
//! let session = StreamAggregator::new().start(providers, ChatPrompt::new("Say hi"))?;
//! for provider in session.await_all().await {
//!     println!("{}: {}", provider.provider, provider.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod stream;
pub mod types;

pub use aggregator::{
    ChatPrompt, ChatSession, ProviderSnapshot, SessionSnapshot, SessionView, StreamAggregator,
    StreamStatus,
};
pub use error::LLMError;
pub use provider::{DynProvider, LLMProvider, TextStream};
pub use types::*;
