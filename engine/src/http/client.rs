//! JSON API client over a connection chain

use std::sync::Arc;

use cf_resources::{ErrorEnvelope, Page, V2Error, V2Page, V2Resource};
use http::header::ACCEPT;
use http::{HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use url::Url;

use crate::errors::EngineError;
use crate::http::connection::{ApiRequest, ApiResponse, Connection};

/// Client for one API root (cloud controller, log cache, routing API)
#[derive(Clone)]
pub struct ApiClient {
    connection: Arc<dyn Connection>,
    base_url: Url,
}

/// Cloud controller error code for uniqueness violations
const UNIQUENESS_ERROR: i64 = 10016;

/// Human readable message from an error response
pub fn error_message(response: &ApiResponse) -> String {
    if let Ok(envelope) = response.json::<ErrorEnvelope>() {
        if !envelope.errors.is_empty() {
            return envelope
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.title, e.detail))
                .collect::<Vec<_>>()
                .join("; ");
        }
    }
    if let Ok(v2) = response.json::<V2Error>() {
        if !v2.description.is_empty() {
            return format!("{}: {}", v2.error_code, v2.description);
        }
    }
    let text = response.text();
    if text.trim().is_empty() {
        response
            .status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text
    }
}

fn is_uniqueness_error(response: &ApiResponse) -> bool {
    response
        .json::<ErrorEnvelope>()
        .map(|e| e.errors.iter().any(|d| d.code == UNIQUENESS_ERROR))
        .unwrap_or(false)
}

/// Map a non-success response to an error kind
pub fn status_error(response: &ApiResponse) -> EngineError {
    let message = error_message(response);
    let status = response.status;
    match status {
        StatusCode::NOT_FOUND => EngineError::NotFound(message),
        StatusCode::CONFLICT => EngineError::AlreadyExists(message),
        StatusCode::UNPROCESSABLE_ENTITY if is_uniqueness_error(response) => {
            EngineError::AlreadyExists(message)
        }
        s if s.is_server_error() => EngineError::Transient {
            status: s.as_u16(),
            message,
        },
        s => EngineError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

impl ApiClient {
    pub fn new(connection: Arc<dyn Connection>, base_url: Url) -> Self {
        Self {
            connection,
            base_url,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `path`. Absolute inputs (job links, pagination links) pass through when
    /// they share the origin of the base URL, the token must not leave it.
    pub fn url(&self, path: &str) -> Result<Url, EngineError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            let url = Url::parse(path)?;
            if url.origin() != self.base_url.origin() {
                return Err(EngineError::Validation(format!(
                    "link {} points outside {}",
                    url,
                    self.base_url.origin().ascii_serialization()
                )));
            }
            return Ok(url);
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    /// URL with query parameters appended
    pub fn url_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, EngineError> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// New request accepting JSON
    pub fn request(&self, method: Method, url: Url) -> ApiRequest {
        ApiRequest::new(method, url).header(ACCEPT, HeaderValue::from_static("application/json"))
    }

    /// Send without interpreting the status
    pub async fn send_unchecked(&self, mut request: ApiRequest) -> Result<ApiResponse, EngineError> {
        self.connection.make(&mut request).await
    }

    /// Send and turn non-2xx statuses into errors
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, EngineError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let response = self.send_unchecked(request).await?;
        if response.status.is_success() {
            return Ok(response);
        }

        let err = status_error(&response);
        match response.status {
            StatusCode::NOT_FOUND => debug!("HTTP {} {} not found", method, url),
            s if s.is_server_error() => error!("HTTP {} {} failed: {} - {}", method, url, s, err),
            s => warn!("HTTP {} {} failed: {} - {}", method, url, s, err),
        }
        Err(err)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, EngineError> {
        self.send(self.request(Method::GET, url)).await?.json()
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, EngineError> {
        self.send(self.request(Method::POST, url).json(body)?)
            .await?
            .json()
    }

    /// POST returning the raw response, for endpoints answering with a job location
    pub async fn post_raw<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<ApiResponse, EngineError> {
        self.send(self.request(Method::POST, url).json(body)?).await
    }

    /// Make a PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, EngineError> {
        self.send(self.request(Method::PUT, url).json(body)?)
            .await?
            .json()
    }

    /// Make a PATCH request
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, EngineError> {
        self.send(self.request(Method::PATCH, url).json(body)?)
            .await?
            .json()
    }

    /// Make a DELETE request, returning the job location if any
    pub async fn delete(&self, url: Url) -> Result<Option<String>, EngineError> {
        let response = self.send(self.request(Method::DELETE, url)).await?;
        Ok(response.location())
    }

    /// Collect every page of a v3 list
    pub async fn list_all<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, EngineError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let page: Page<T> = self.get(url).await?;
            items.extend(page.resources);
            next = match page.pagination.next {
                Some(link) if !link.href.is_empty() => Some(self.url(&link.href)?),
                _ => None,
            };
        }
        Ok(items)
    }

    /// First page of a v3 list only
    pub async fn list_first<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, EngineError> {
        let page: Page<T> = self.get(url).await?;
        Ok(page.resources.into_iter().next())
    }

    /// Collect every page of a v2 list
    pub async fn list_all_v2<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Vec<V2Resource<T>>, EngineError> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let page: V2Page<T> = self.get(url).await?;
            items.extend(page.resources);
            next = match page.next_url {
                Some(href) if !href.is_empty() => Some(self.url(&href)?),
                _ => None,
            };
        }
        Ok(items)
    }
}
