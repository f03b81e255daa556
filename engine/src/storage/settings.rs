//! Settings file management

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Cloud controller API endpoint
    #[serde(default)]
    pub api_url: String,

    /// Identity zone origin used for password grants
    #[serde(default)]
    pub origin: Option<String>,

    /// User name for password grants
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// One-time SSO passcode
    #[serde(default)]
    pub sso_passcode: Option<String>,

    /// OAuth client used to talk to the cloud controller
    #[serde(default)]
    pub cf_client_id: Option<String>,

    #[serde(default)]
    pub cf_client_secret: Option<String>,

    /// OAuth client used for UAA administration
    #[serde(default)]
    pub uaa_client_id: Option<String>,

    #[serde(default)]
    pub uaa_client_secret: Option<String>,

    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// Number of recent log lines attached to failures
    #[serde(default = "default_app_logs_max")]
    pub app_logs_max: u32,

    /// Purge service instances instead of deleting them through the broker
    #[serde(default)]
    pub purge_when_delete: bool,

    /// Organization quota applied to created organizations
    #[serde(default = "default_quota_name")]
    pub default_quota_name: String,

    /// File persisting the access and refresh tokens
    #[serde(default)]
    pub store_tokens_path: Option<String>,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Retries for idempotent requests failing with 5xx
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_app_logs_max() -> u32 {
    30
}

fn default_quota_name() -> String {
    "default".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_dial_timeout_secs() -> u64 {
    30
}

fn default_keepalive_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            origin: None,
            user: None,
            password: None,
            sso_passcode: None,
            cf_client_id: None,
            cf_client_secret: None,
            uaa_client_id: None,
            uaa_client_secret: None,
            skip_ssl_validation: false,
            app_logs_max: default_app_logs_max(),
            purge_when_delete: false,
            default_quota_name: default_quota_name(),
            store_tokens_path: None,
            log_level: LogLevel::default(),
            max_retries: default_max_retries(),
            dial_timeout_secs: default_dial_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, EngineError> {
        let settings: Settings = file.read_json().await?;
        Ok(settings)
    }

    /// Overlay `CF_*` environment variables
    pub fn apply_env(mut self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok());
        self
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = get("CF_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = get("CF_USER") {
            self.user = Some(v);
        }
        if let Some(v) = get("CF_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = get("CF_SSO_PASSCODE") {
            self.sso_passcode = Some(v);
        }
        if let Some(v) = get("CF_CLIENT_ID") {
            self.cf_client_id = Some(v);
        }
        if let Some(v) = get("CF_CLIENT_SECRET") {
            self.cf_client_secret = Some(v);
        }
        if let Some(v) = get("CF_SKIP_SSL_VALIDATION") {
            self.skip_ssl_validation = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = get("CF_STORE_TOKENS_PATH") {
            self.store_tokens_path = Some(v);
        }
    }

    /// Check the settings can produce a session
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.api_url.trim().is_empty() {
            return Err(EngineError::Config("api_url must be set".to_string()));
        }
        url::Url::parse(&self.api_url)?;
        Ok(())
    }
}
