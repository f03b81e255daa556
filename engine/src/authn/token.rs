//! OAuth token pair

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::storage::tokens::StoredTokens;

/// Claims read from a UAA access token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Access token plus optional refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Raw access token, without the `bearer` prefix
    pub access_token: String,

    pub refresh_token: Option<String>,

    /// Expiry decoded from the access token, if it is a JWT
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        let access_token = strip_bearer(&access_token.into()).to_string();
        let expires_at = decode_expiry(&access_token);
        Self {
            access_token,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        }
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("bearer {}", self.access_token)
    }

    /// True if the token expires within `margin`. Opaque tokens never expire locally.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - margin <= Utc::now(),
            None => false,
        }
    }

    pub fn to_stored(&self) -> StoredTokens {
        StoredTokens {
            access_token: self.authorization(),
            refresh_token: self.refresh_token.clone().unwrap_or_default(),
        }
    }

    pub fn from_stored(stored: &StoredTokens) -> Self {
        Self::new(stored.access_token.clone(), Some(stored.refresh_token.clone()))
    }
}

fn strip_bearer(token: &str) -> &str {
    let trimmed = token.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}

/// Read `exp` without checking the signature; the platform validates tokens, we only need
/// to know when to refresh.
fn decode_expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(access_token, &DecodingKey::from_secret(b""), &validation).ok()?;
    data.claims
        .exp
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
}
