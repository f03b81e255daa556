//! Connection chain shared by every API client
//!
//! A [`Connection`] sends one [`ApiRequest`] and returns the buffered response whatever its
//! status. Wrappers (auth refresh, retry, request logging) implement the same trait around an
//! inner connection; status to error mapping happens once, in [`crate::http::client::ApiClient`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::errors::EngineError;

/// Request body
pub enum RequestBody {
    Empty,
    /// Buffered body, replayed on retry
    Bytes(Bytes),
    /// Streaming body, consumed by the first send
    Stream(Option<reqwest::Body>),
}

impl RequestBody {
    pub fn stream(body: reqwest::Body) -> Self {
        RequestBody::Stream(Some(body))
    }

    /// Whether the body can be sent again
    pub fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Stream(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RequestBody::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Body to hand to the transport. A stream can only be taken once.
    fn take_for_send(&mut self) -> Result<Option<reqwest::Body>, EngineError> {
        match self {
            RequestBody::Empty => Ok(None),
            RequestBody::Bytes(b) => Ok(Some(reqwest::Body::from(b.clone()))),
            RequestBody::Stream(body) => body
                .take()
                .map(Some)
                .ok_or(EngineError::StreamNotReplayable),
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Outgoing request
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// JSON body with matching content type
    pub fn json<B: serde::Serialize + ?Sized>(mut self, body: &B) -> Result<Self, EngineError> {
        let bytes = serde_json::to_vec(body)?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = RequestBody::Bytes(Bytes::from(bytes));
        Ok(self)
    }

    /// Form encoded body
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = RequestBody::Bytes(Bytes::from(encoded));
        self
    }

    pub fn header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Buffered response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// `Location` header, used for job references
    pub fn location(&self) -> Option<String> {
        self.headers
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, EngineError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One hop of the connection chain
#[async_trait]
pub trait Connection: Send + Sync {
    async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError>;
}

/// Transport options for the shared HTTP client
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub skip_ssl_validation: bool,
    pub dial_timeout: Duration,
    pub keepalive: Duration,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            skip_ssl_validation: false,
            dial_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(30),
            user_agent: crate::utils::user_agent(),
        }
    }
}

/// Build the pooled client. Proxy settings come from the environment.
pub fn build_http_client(options: &TransportOptions) -> Result<Client, EngineError> {
    let client = Client::builder()
        .danger_accept_invalid_certs(options.skip_ssl_validation)
        .connect_timeout(options.dial_timeout)
        .tcp_keepalive(options.keepalive)
        .user_agent(options.user_agent.clone())
        .build()?;
    Ok(client)
}

/// Innermost connection, backed by reqwest
#[derive(Clone)]
pub struct HttpConnection {
    client: Client,
}

impl HttpConnection {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = request.body.take_for_send()? {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
