//! Grant selection

use secrecy::{ExposeSecret, SecretString};

/// OAuth client identity
pub struct ClientCredentials {
    pub id: String,
    pub secret: SecretString,
}

impl ClientCredentials {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// The public `cf` client used with user credentials
    pub fn cf_cli() -> Self {
        Self::new("cf", "")
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// How a fresh token is obtained when no refresh token is usable
pub enum Grant {
    Password {
        username: String,
        password: SecretString,
        origin: Option<String>,
    },
    Passcode {
        passcode: SecretString,
    },
    ClientCredentials,
}

impl Grant {
    /// Name reported in authentication errors
    pub fn name(&self) -> &'static str {
        match self {
            Grant::Password { .. } => "password",
            Grant::Passcode { .. } => "passcode",
            Grant::ClientCredentials => "client_credentials",
        }
    }

    /// Form fields sent to the token endpoint
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Grant::Password {
                username,
                password,
                origin,
            } => {
                let mut fields = vec![
                    ("grant_type", "password".to_string()),
                    ("username", username.clone()),
                    ("password", password.expose_secret().to_string()),
                ];
                if let Some(origin) = origin.as_ref().filter(|o| !o.is_empty()) {
                    fields.push(("login_hint", serde_json::json!({ "origin": origin }).to_string()));
                }
                fields
            }
            Grant::Passcode { passcode } => vec![
                ("grant_type", "password".to_string()),
                ("passcode", passcode.expose_secret().to_string()),
            ],
            Grant::ClientCredentials => vec![("grant_type", "client_credentials".to_string())],
        }
    }

    /// One-time passcodes cannot be replayed once the refresh token is gone
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Grant::Passcode { .. })
    }
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
