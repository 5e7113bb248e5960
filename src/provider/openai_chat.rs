//! OpenAI-compatible adapter: Chat Completions streaming and `/v1/models` discovery.

mod error;
mod models;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::OpenAiChatProvider;
