//! Anthropic Messages adapter: streaming `/v1/messages` and paginated `/v1/models`.

mod error;
mod models;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::AnthropicMessagesProvider;
