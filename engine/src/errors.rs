//! Error types for the deployment engine

use std::fmt;

use thiserror::Error;

/// Which polling ceiling was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Bind,
    Stage,
    Start,
    Job,
    Deployment,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeoutKind::Bind => "bind",
            TimeoutKind::Stage => "stage",
            TimeoutKind::Start => "start",
            TimeoutKind::Job => "job",
            TimeoutKind::Deployment => "deployment",
        };
        f.write_str(s)
    }
}

/// Main error type for the deployment engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error ({grant} grant): {message}")]
    Auth { grant: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Transient error ({status}): {message}")]
    Transient { status: u16, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    AsyncFailure(String),

    #[error("Timeout reached waiting for {0}")]
    Timeout(TimeoutKind),

    #[error("{cause}\n\nApp '{app}' logs: \n{logs}")]
    Partial {
        app: String,
        cause: Box<EngineError>,
        logs: String,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Request body is a stream and cannot be replayed")]
    StreamNotReplayable,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True when the platform reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }

    /// True for errors the retry wrapper may absorb
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transient { .. } => true,
            EngineError::HttpError(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// The error a `Partial` wraps, or the error itself
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::Partial { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
