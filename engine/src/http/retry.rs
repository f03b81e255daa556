//! Retry wrapper for idempotent requests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::http::connection::{ApiRequest, ApiResponse, Connection};

/// Retry options
#[derive(Debug, Clone)]
pub struct Options {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Pause between attempts
    pub delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Retries 5xx responses and transport failures for everything but POST.
/// Stream bodies are never retried.
pub struct RetryConnection {
    inner: Arc<dyn Connection>,
    options: Options,
}

impl RetryConnection {
    pub fn new(inner: Arc<dyn Connection>, options: Options) -> Self {
        Self { inner, options }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn should_retry(request: &ApiRequest, result: &Result<ApiResponse, EngineError>) -> bool {
    if request.method == Method::POST || !request.body.is_replayable() {
        return false;
    }
    match result {
        Ok(response) => is_retryable_status(response.status),
        Err(e) => e.is_transient(),
    }
}

#[async_trait]
impl Connection for RetryConnection {
    async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError> {
        let mut attempt = 0;
        loop {
            let result = self.inner.make(request).await;
            if attempt >= self.options.max_retries || !should_retry(request, &result) {
                return result;
            }
            attempt += 1;
            match &result {
                Ok(response) => warn!(
                    "{} {} returned {}, retrying ({}/{})",
                    request.method, request.url, response.status, attempt, self.options.max_retries
                ),
                Err(e) => warn!(
                    "{} {} failed: {}, retrying ({}/{})",
                    request.method, request.url, e, attempt, self.options.max_retries
                ),
            }
            debug!("waiting {:?} before retry", self.options.delay);
            tokio::time::sleep(self.options.delay).await;
        }
    }
}
