use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};

use crate::error::LLMError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

const USER_AGENT: &str = concat!("chorus-llm/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpTransport`] on top of `reqwest`.
///
/// Dropping a body stream returned by `send_stream` closes the connection, which is how
/// cancelled chat sessions abort in-flight calls.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client with the crate user agent and a connect timeout. There is no overall
    /// timeout because a stream may stay quiet for a long time between fragments.
    pub fn default_client() -> Result<Self, LLMError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map(Self::new)
            .map_err(|err| LLMError::transport(format!("failed to create HTTP client: {err}")))
    }

    fn build_request(&self, request: HttpRequest) -> Result<RequestBuilder, LLMError> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                LLMError::transport(format!("invalid header name {name:?}: {err}"))
            })?;
            // Never echo the value: it is usually a credential.
            let value = HeaderValue::from_str(&value)
                .map_err(|_| LLMError::transport(format!("invalid value for header {name}")))?;
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        Ok(builder)
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
    ) -> Result<(u16, HashMap<String, String>, Response), LLMError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        Ok((status, headers, response))
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> LLMError {
    let kind = if err.is_connect() {
        "connection failed"
    } else if err.is_timeout() {
        "timed out"
    } else if err.is_body() || err.is_decode() {
        "body interrupted"
    } else {
        "request failed"
    };
    LLMError::transport(format!("{kind}: {err}"))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let (status, headers, response) = self.dispatch(request).await?;
        let body = response.bytes().await.map_err(transport_error)?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let (status, headers, response) = self.dispatch(request).await?;
        let body: HttpBodyStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport_error)),
        );
        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

pub fn default_dyn_transport() -> Result<DynHttpTransport, LLMError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_header_names_are_rejected() {
        let transport = ReqwestTransport::default_client().expect("client");
        let mut request = HttpRequest::get("https://example.com/v1/models");
        request
            .headers
            .insert("bad header".to_string(), "value".to_string());
        match transport.build_request(request) {
            Err(LLMError::Transport { message }) => {
                assert!(message.contains("invalid header name"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected header validation to fail"),
        }
    }

    #[test]
    fn invalid_header_values_are_not_echoed() {
        let transport = ReqwestTransport::default_client().expect("client");
        let mut request = HttpRequest::get("https://example.com/v1/models");
        request
            .headers
            .insert("x-api-key".to_string(), "sk-secret\n".to_string());
        match transport.build_request(request) {
            Err(LLMError::Transport { message }) => {
                assert!(message.contains("x-api-key"));
                assert!(!message.contains("sk-secret"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected header validation to fail"),
        }
    }

    #[test]
    fn request_parts_are_carried_over() {
        let transport = ReqwestTransport::default_client().expect("client");
        let request = HttpRequest::post_json("https://example.com/v1/chat", b"{}".to_vec())
            .with_headers(HashMap::from([(
                "Accept".to_string(),
                "text/event-stream".to_string(),
            )]));
        let built = transport
            .build_request(request)
            .expect("builder")
            .build()
            .expect("request");
        assert_eq!(built.method(), Method::POST);
        assert_eq!(built.url().as_str(), "https://example.com/v1/chat");
        assert_eq!(
            built.headers().get("content-type").map(|value| value.as_bytes()),
            Some(&b"application/json"[..])
        );
        assert_eq!(
            built.headers().get("accept").map(|value| value.as_bytes()),
            Some(&b"text/event-stream"[..])
        );
        assert_eq!(
            built.body().and_then(|body| body.as_bytes()),
            Some(&b"{}"[..])
        );
    }

    #[test]
    fn non_utf8_header_values_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        headers.insert("x-binary", HeaderValue::from_bytes(&[0xff, 0xfe]).expect("opaque value"));
        let map = header_map(&headers);
        assert_eq!(map.get("retry-after").map(String::as_str), Some("3"));
        assert!(!map.contains_key("x-binary"));
    }
}
