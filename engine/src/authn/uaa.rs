//! UAA token endpoint client

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{ACCEPT, AUTHORIZATION};
use http::{HeaderValue, Method};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::authn::grant::{ClientCredentials, Grant};
use crate::authn::token::Token;
use crate::errors::EngineError;
use crate::http::connection::{ApiRequest, Connection};

/// `/oauth/token` response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,

    #[serde(default)]
    refresh_token: Option<String>,
}

/// UAA error body
#[derive(Debug, Default, Deserialize)]
struct UaaError {
    #[serde(default)]
    error: String,

    #[serde(default)]
    error_description: String,
}

/// Client for the UAA token endpoint
pub struct UaaClient {
    connection: Arc<dyn Connection>,
    token_url: Url,
}

impl UaaClient {
    pub fn new(connection: Arc<dyn Connection>, uaa_url: &Url) -> Result<Self, EngineError> {
        let token_url = Url::parse(&format!(
            "{}/oauth/token",
            uaa_url.as_str().trim_end_matches('/')
        ))?;
        Ok(Self {
            connection,
            token_url,
        })
    }

    /// Obtain a token through `grant`
    pub async fn grant(
        &self,
        grant: &Grant,
        client: &ClientCredentials,
    ) -> Result<Token, EngineError> {
        let fields = grant.form_fields();
        self.request_token(grant.name(), &fields, client).await
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientCredentials,
    ) -> Result<Token, EngineError> {
        let fields = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.request_token("refresh_token", &fields, client).await
    }

    async fn request_token(
        &self,
        grant_name: &str,
        fields: &[(&'static str, String)],
        client: &ClientCredentials,
    ) -> Result<Token, EngineError> {
        debug!("Requesting token with {} grant", grant_name);
        let auth_error = |message: String| EngineError::Auth {
            grant: grant_name.to_string(),
            message,
        };

        let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let basic = STANDARD.encode(format!("{}:{}", client.id, client.secret.expose_secret()));
        let authorization = HeaderValue::from_str(&format!("Basic {}", basic))
            .map_err(|e| auth_error(e.to_string()))?;

        let mut request = ApiRequest::new(Method::POST, self.token_url.clone())
            .form(&pairs)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self
            .connection
            .make(&mut request)
            .await
            .map_err(|e| auth_error(e.to_string()))?;

        if !response.status.is_success() {
            let body: UaaError = response.json().unwrap_or_default();
            let message = if body.error_description.is_empty() {
                format!("{} {}", response.status, body.error)
            } else {
                format!("{} {}", response.status, body.error_description)
            };
            error!("Token request failed: {}", message);
            return Err(auth_error(message.trim().to_string()));
        }

        let body: TokenResponse = response
            .json()
            .map_err(|e| auth_error(format!("invalid token response: {}", e)))?;
        Ok(Token::new(body.access_token, body.refresh_token))
    }
}
