//! Google Gemini adapter: `streamGenerateContent` over SSE and paginated `models.list`.

mod error;
mod models;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::GoogleGeminiProvider;
