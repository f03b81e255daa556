//! Token manager shared by every authenticated connection

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::authn::grant::{ClientCredentials, Grant};
use crate::authn::token::Token;
use crate::authn::uaa::UaaClient;
use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::storage::tokens::{load_tokens, save_tokens};

/// Token manager trait for testability
#[async_trait]
pub trait TokenManagerExt: Send + Sync {
    /// Current `Authorization` header value, refreshed first if about to expire
    async fn authorization(&self) -> Result<String, EngineError>;

    /// Replace the token that produced a 401. Concurrent callers holding the same stale
    /// value share one refresh.
    async fn refresh_token(&self, stale_authorization: &str) -> Result<String, EngineError>;
}

/// Token manager implementation
pub struct TokenManager {
    uaa: UaaClient,
    client: ClientCredentials,
    grant: Option<Grant>,
    store: Option<File>,
    cached_token: RwLock<Option<Token>>,
    refresh_lock: Mutex<()>,
}

/// Refresh this long before the access token expires
const EXPIRY_MARGIN_SECS: i64 = 30;

impl TokenManager {
    /// Create a manager and obtain the first token.
    ///
    /// A refresh token persisted in `store` is tried first; the `grant` is used when there is
    /// none or it is rejected.
    pub async fn login(
        uaa: UaaClient,
        client: ClientCredentials,
        grant: Option<Grant>,
        store: Option<File>,
    ) -> Result<Self, EngineError> {
        let manager = Self {
            uaa,
            client,
            grant,
            store,
            cached_token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        };

        let token = match manager.refresh_from_store().await {
            Some(token) => token,
            None => manager.run_grant().await?,
        };
        manager.save_token(token).await?;

        Ok(manager)
    }

    async fn refresh_from_store(&self) -> Option<Token> {
        let stored = load_tokens(self.store.as_ref()?).await?;
        let refresh_token = Token::from_stored(&stored).refresh_token?;
        match self.uaa.refresh(&refresh_token, &self.client).await {
            Ok(token) => {
                info!("Reused persisted refresh token");
                Some(token)
            }
            Err(e) => {
                warn!("Persisted refresh token rejected: {}", e);
                None
            }
        }
    }

    async fn run_grant(&self) -> Result<Token, EngineError> {
        let grant = self.grant.as_ref().ok_or_else(|| EngineError::Auth {
            grant: "none".to_string(),
            message: "no valid refresh token, sso passcode, user credentials or client credentials were provided"
                .to_string(),
        })?;
        info!("Authenticating with {} grant", grant.name());
        self.uaa.grant(grant, &self.client).await
    }

    /// Cache and persist a token, keeping the old refresh token when the UAA did not rotate it
    async fn save_token(&self, mut token: Token) -> Result<Token, EngineError> {
        let mut cached = self.cached_token.write().await;
        if token.refresh_token.is_none() {
            token.refresh_token = cached.as_ref().and_then(|t| t.refresh_token.clone());
        }
        if let Some(store) = &self.store {
            save_tokens(store, &token.to_stored()).await?;
        }
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn renew(&self, current: Option<Token>) -> Result<Token, EngineError> {
        if let Some(refresh_token) = current.as_ref().and_then(|t| t.refresh_token.as_deref()) {
            match self.uaa.refresh(refresh_token, &self.client).await {
                Ok(token) => return self.save_token(token).await,
                Err(e) => warn!("Refresh failed, falling back to grant: {}", e),
            }
        }
        match &self.grant {
            Some(grant) if grant.is_replayable() => {
                let token = self.run_grant().await?;
                self.save_token(token).await
            }
            Some(grant) => Err(EngineError::Auth {
                grant: grant.name().to_string(),
                message: "token expired and the grant cannot be replayed".to_string(),
            }),
            None => self.run_grant().await,
        }
    }
}

#[async_trait]
impl TokenManagerExt for TokenManager {
    async fn authorization(&self) -> Result<String, EngineError> {
        let current = {
            let cached = self.cached_token.read().await;
            cached.clone()
        };
        match current {
            Some(token) if !token.expires_within(Duration::seconds(EXPIRY_MARGIN_SECS)) => {
                Ok(token.authorization())
            }
            Some(token) => {
                debug!("Access token about to expire, refreshing");
                self.refresh_token(&token.authorization()).await
            }
            None => Err(EngineError::Auth {
                grant: "none".to_string(),
                message: "not logged in".to_string(),
            }),
        }
    }

    async fn refresh_token(&self, stale_authorization: &str) -> Result<String, EngineError> {
        let _guard = self.refresh_lock.lock().await;

        let current = {
            let cached = self.cached_token.read().await;
            cached.clone()
        };
        if let Some(token) = &current {
            if token.authorization() != stale_authorization {
                debug!("Token already refreshed by a concurrent request");
                return Ok(token.authorization());
            }
        }

        info!("Refreshing access token...");
        let token = self.renew(current).await?;
        Ok(token.authorization())
    }
}
