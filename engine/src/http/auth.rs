//! UAA authentication wrapper

use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{HeaderValue, StatusCode};
use tracing::{debug, warn};

use crate::authn::token_mngr::TokenManagerExt;
use crate::errors::EngineError;
use crate::http::connection::{ApiRequest, ApiResponse, Connection};

/// Attaches the bearer token and, on a 401, refreshes it and retries once
pub struct AuthConnection {
    inner: Arc<dyn Connection>,
    tokens: Arc<dyn TokenManagerExt>,
}

impl AuthConnection {
    pub fn new(inner: Arc<dyn Connection>, tokens: Arc<dyn TokenManagerExt>) -> Self {
        Self { inner, tokens }
    }
}

fn header_value(authorization: &str) -> Result<HeaderValue, EngineError> {
    HeaderValue::from_str(authorization).map_err(|e| EngineError::Auth {
        grant: "bearer".to_string(),
        message: format!("invalid token: {}", e),
    })
}

#[async_trait]
impl Connection for AuthConnection {
    async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError> {
        let authorization = self.tokens.authorization().await?;
        request
            .headers
            .insert(AUTHORIZATION, header_value(&authorization)?);

        let response = self.inner.make(request).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if !request.body.is_replayable() {
            warn!(
                "{} {} was rejected with 401 and its body cannot be resent",
                request.method, request.url
            );
            return Ok(response);
        }

        debug!("Got 401 on {} {}, refreshing token", request.method, request.url);
        let refreshed = self.tokens.refresh_token(&authorization).await?;
        request
            .headers
            .insert(AUTHORIZATION, header_value(&refreshed)?);
        self.inner.make(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use url::Url;

    use super::*;
    use crate::http::connection::RequestBody;

    /// Rejects every request not carrying `bearer fresh`
    struct Guarded {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connection for Guarded {
        async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError> {
            let auth = request
                .headers
                .get(AUTHORIZATION)
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            let status = if auth == "bearer fresh" {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            };
            self.seen.lock().unwrap().push(auth);
            Ok(ApiResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
        }
    }

    struct Tokens {
        refreshed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenManagerExt for Tokens {
        async fn authorization(&self) -> Result<String, EngineError> {
            Ok("bearer stale".to_string())
        }

        async fn refresh_token(&self, stale_authorization: &str) -> Result<String, EngineError> {
            self.refreshed
                .lock()
                .unwrap()
                .push(stale_authorization.to_string());
            Ok("bearer fresh".to_string())
        }
    }

    fn setup() -> (Arc<Guarded>, Arc<Tokens>, AuthConnection) {
        let inner = Arc::new(Guarded {
            seen: Mutex::new(Vec::new()),
        });
        let tokens = Arc::new(Tokens {
            refreshed: Mutex::new(Vec::new()),
        });
        let conn = AuthConnection::new(inner.clone(), tokens.clone());
        (inner, tokens, conn)
    }

    fn url() -> Url {
        Url::parse("https://api.example.com/v3/apps").unwrap()
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_retries_once() {
        let (inner, tokens, conn) = setup();
        let mut request = ApiRequest::new(Method::GET, url());

        let response = conn.make(&mut request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(*inner.seen.lock().unwrap(), vec!["bearer stale", "bearer fresh"]);
        assert_eq!(*tokens.refreshed.lock().unwrap(), vec!["bearer stale"]);
    }

    #[tokio::test]
    async fn streamed_body_is_not_resent() {
        let (inner, tokens, conn) = setup();
        let mut request = ApiRequest::new(Method::POST, url());
        request.body = RequestBody::stream(reqwest::Body::from("bits"));

        let response = conn.make(&mut request).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(inner.seen.lock().unwrap().len(), 1);
        assert!(tokens.refreshed.lock().unwrap().is_empty());
    }
}
