//! Vendor-neutral HTTP seam.
//!
//! Adapters build [`HttpRequest`]s and hand them to an [`HttpTransport`]; the default
//! implementation lives in [`reqwest`](self::reqwest). Tests script vendor behaviour by
//! implementing the trait in memory.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::error::LLMError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outgoing call. Header names are passed through as given.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// ```
    /// use chorus_llm::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::get("https://example.com/v1/models");
    /// assert_eq!(request.method, HttpMethod::Get);
    /// assert!(request.body.is_none());
    /// ```
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// POST with `Content-Type: application/json`.
    ///
    /// ```
    /// use chorus_llm::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.method, HttpMethod::Post);
    /// assert_eq!(request.headers.get("Content-Type").map(String::as_str), Some("application/json"));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Some(body),
        }
    }

    /// Adds `headers` on top of the ones already set.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Fully buffered response, used for model listing.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// ```
    /// use chorus_llm::http::HttpResponse;
    ///
    /// let response = HttpResponse { status: 200, headers: Default::default(), body: b"ok".to_vec() };
    /// assert_eq!(response.into_string().unwrap(), "ok");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Transport`] when the body is not UTF-8.
    pub fn into_string(self) -> Result<String, LLMError> {
        String::from_utf8(self.body).map_err(|err| LLMError::transport(err.to_string()))
    }
}

/// Response whose body arrives incrementally, used for chat streams.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

/// Raw body chunks, in arrival order. Chunk boundaries carry no meaning.
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>>;

/// The only way adapters reach the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and buffers the whole body.
    ///
    /// # Errors
    ///
    /// Network failures map to [`LLMError::Transport`]. Non-2xx statuses are returned as
    /// responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError>;

    /// Sends a request and returns as soon as the status line and headers are in.
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use chorus_llm::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use chorus_llm::error::LLMError;
    /// # use futures_util::{stream, StreamExt};
    /// struct EchoTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for EchoTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: request.body.unwrap_or_default() })
    ///     }
    ///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
    ///         let stream = stream::once(async move { Ok(request.body.unwrap_or_default()) });
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = EchoTransport
    ///     .send_stream(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// let chunks: Vec<_> = response.body.collect::<Vec<_>>().await;
    /// assert_eq!(chunks.len(), 1);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Same contract as [`HttpTransport::send`]; body errors surface as stream items.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError>;
}

pub type DynHttpTransport = Arc<dyn HttpTransport>;

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Appends `pairs` to `base` as form-encoded query parameters.
///
/// # Errors
///
/// [`LLMError::InvalidConfig`] when `base` is not an absolute URL.
pub(crate) fn url_with_query<'a>(
    base: &str,
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<String, LLMError> {
    let mut url = ::reqwest::Url::parse(base).map_err(|err| LLMError::InvalidConfig {
        field: "base_url".to_string(),
        reason: format!("{base:?} is not a valid URL: {err}"),
    })?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.into())
}

/// GET `url` and buffer the response.
pub(crate) async fn fetch(
    transport: &dyn HttpTransport,
    provider: &'static str,
    url: String,
    headers: HashMap<String, String>,
) -> Result<HttpResponse, LLMError> {
    tracing::debug!(provider, %url, "GET");
    let response = transport.send(HttpRequest::get(url).with_headers(headers)).await?;
    tracing::debug!(
        provider,
        status = response.status,
        bytes = response.body.len(),
        "response received"
    );
    Ok(response)
}

/// POST `body` as JSON and ask for a server-sent event stream.
///
/// # Errors
///
/// [`LLMError::Validation`] when `body` does not serialize, otherwise whatever the
/// transport returns.
pub(crate) async fn open_event_stream<T: Serialize>(
    transport: &dyn HttpTransport,
    provider: &'static str,
    url: String,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpStreamResponse, LLMError> {
    let payload = serde_json::to_vec(body).map_err(|err| LLMError::Validation {
        message: format!("failed to serialize {provider} request: {err}"),
    })?;
    let mut request = HttpRequest::post_json(url, payload).with_headers(headers);
    request
        .headers
        .insert("Accept".to_string(), "text/event-stream".to_string());
    tracing::debug!(provider, url = %request.url, "POST (event stream)");
    let response = transport.send_stream(request).await?;
    tracing::debug!(provider, status = response.status, "stream opened");
    Ok(response)
}

pub mod reqwest;

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures_util::stream;
    use serde::ser;

    use super::*;

    /// Records requests and answers every stream with an empty 200.
    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: b"{}".to_vec(),
            })
        }

        async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpStreamResponse {
                status: 200,
                headers: HashMap::new(),
                body: Box::pin(stream::empty()),
            })
        }
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(ser::Error::custom("no"))
        }
    }

    #[tokio::test]
    async fn event_stream_request_carries_json_and_sse_headers() {
        let transport = RecordingTransport::default();
        let headers = HashMap::from([("x-api-key".to_string(), "secret".to_string())]);
        open_event_stream(
            &transport,
            "Test",
            "https://example.com/v1/messages".to_string(),
            headers,
            &serde_json::json!({"stream": true}),
        )
        .await
        .unwrap();

        let seen = transport.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(request.headers["Accept"], "text/event-stream");
        assert_eq!(request.headers["x-api-key"], "secret");
        assert_eq!(request.body.as_deref(), Some(&br#"{"stream":true}"#[..]));
    }

    #[tokio::test]
    async fn serialization_failure_never_reaches_the_transport() {
        let transport = RecordingTransport::default();
        let result = open_event_stream(
            &transport,
            "Test",
            "https://example.com".to_string(),
            HashMap::new(),
            &Unserializable,
        )
        .await;

        match result {
            Err(LLMError::Validation { message }) => {
                assert!(message.contains("failed to serialize Test request"), "{message}");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected a validation error"),
        }
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_is_a_plain_get() {
        let transport = RecordingTransport::default();
        let headers = HashMap::from([("Authorization".to_string(), "Bearer k".to_string())]);
        let response = fetch(&transport, "Test", "https://example.com/models".to_string(), headers)
            .await
            .unwrap();
        assert!(is_success(response.status));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].method, HttpMethod::Get);
        assert!(seen[0].body.is_none());
        assert_eq!(seen[0].headers["Authorization"], "Bearer k");
        assert!(!seen[0].headers.contains_key("Content-Type"));
    }

    #[test]
    fn query_values_are_percent_encoded() {
        let url = url_with_query(
            "https://example.com/v1beta/models",
            [("pageSize", "1000"), ("pageToken", "Ab+c/d=&x=1")],
        )
        .unwrap();
        assert_eq!(
            url,
            "https://example.com/v1beta/models?pageSize=1000&pageToken=Ab%2Bc%2Fd%3D%26x%3D1"
        );
    }

    #[test]
    fn relative_base_is_a_config_error() {
        match url_with_query("not a url", [("limit", "1")]) {
            Err(LLMError::InvalidConfig { field, .. }) => assert_eq!(field, "base_url"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn only_2xx_counts_as_success() {
        assert!(is_success(200));
        assert!(is_success(204));
        assert!(!is_success(301));
        assert!(!is_success(429));
    }
}
