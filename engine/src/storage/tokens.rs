//! Persisted token pair

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::filesys::file::File;

/// Mode of the persisted tokens file
pub const TOKENS_FILE_MODE: u32 = 0o644;

/// Token pair as written to disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: String,
}

/// Load tokens. A missing, unreadable or malformed file counts as no tokens.
pub async fn load_tokens(file: &File) -> Option<StoredTokens> {
    if !file.exists().await {
        return None;
    }
    match file.read_json::<StoredTokens>().await {
        Ok(tokens) if !tokens.refresh_token.is_empty() => Some(tokens),
        Ok(_) => {
            debug!("Tokens file {} has no refresh token", file.path().display());
            None
        }
        Err(e) => {
            warn!("Ignoring unreadable tokens file {}: {}", file.path().display(), e);
            None
        }
    }
}

/// Save tokens atomically
pub async fn save_tokens(file: &File, tokens: &StoredTokens) -> Result<(), EngineError> {
    file.write_json_atomic(tokens).await?;
    file.set_mode(TOKENS_FILE_MODE).await?;
    debug!("Tokens persisted to {}", file.path().display());
    Ok(())
}
