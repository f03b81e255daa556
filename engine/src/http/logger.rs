//! Request logger with redaction of credentials

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use async_trait::async_trait;
use http::HeaderMap;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::errors::EngineError;
use crate::http::connection::{ApiRequest, ApiResponse, Connection, RequestBody};

/// Replacement for redacted values
pub const REDACTED: &str = "[PRIVATE DATA HIDDEN]";

static URL_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d\w]+)://([^:/@]+):(?:[^@]+)@").expect("valid url password regex")
});

static URI_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"((?:^|[&?])(?:password|passcode|client_secret|refresh_token))=[A-Za-z0-9\-._~!$'()*+,;=:@/?%]*",
    )
    .expect("valid uri params regex")
});

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)bearer [\w.\-]+").expect("valid bearer regex"));

static SENSITIVE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)token|password|secret|passcode").expect("valid key regex"));

/// Hide the password component of URLs
pub fn redact_url(url: &str) -> String {
    let url = URL_PASSWORD.replace_all(url, format!("$1://$2:{}@", REDACTED));
    URI_PARAMS
        .replace_all(&url, format!("$1={}", REDACTED))
        .into_owned()
}

/// Hide bearer tokens and credential parameters in free text
pub fn redact_text(text: &str) -> String {
    let text = BEARER.replace_all(text, format!("bearer {}", REDACTED));
    let text = URI_PARAMS.replace_all(&text, format!("$1={}", REDACTED));
    URL_PASSWORD
        .replace_all(&text, format!("$1://$2:{}@", REDACTED))
        .into_owned()
}

/// Hide values of sensitive keys in a JSON document
pub fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if key != "token_endpoint" && SENSITIVE_KEY.is_match(key) && !v.is_null() {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact_json(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        Value::String(s) => {
            let redacted = redact_text(s);
            if redacted != *s {
                *s = redacted;
            }
        }
        _ => {}
    }
}

/// Render headers with the authorization header hidden
pub fn redact_headers(headers: &HeaderMap) -> String {
    let mut names: Vec<_> = headers.keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names
        .into_iter()
        .map(|name| {
            let value = if name.eq_ignore_ascii_case("authorization")
                || name.eq_ignore_ascii_case("set-cookie")
            {
                REDACTED.to_string()
            } else {
                headers
                    .get_all(name)
                    .iter()
                    .map(|v| redact_text(&String::from_utf8_lossy(v.as_bytes())))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{}: {}", name, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a body for the dump
pub fn redact_body(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(mut value) => {
            redact_json(&mut value);
            serde_json::to_string_pretty(&value).unwrap_or_default()
        }
        Err(_) => match std::str::from_utf8(body) {
            Ok(text) => redact_text(text),
            Err(_) => format!("[BINARY DATA: {} bytes]", body.len()),
        },
    }
}

/// Dumps each request and response at debug level
pub struct RequestLogger {
    inner: Arc<dyn Connection>,
}

impl RequestLogger {
    pub fn new(inner: Arc<dyn Connection>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Connection for RequestLogger {
    async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError> {
        let body = match &request.body {
            RequestBody::Empty => String::new(),
            RequestBody::Bytes(b) => redact_body(b),
            RequestBody::Stream(_) => "[MULTIPART/FORM-DATA CONTENT HIDDEN]".to_string(),
        };
        debug!(
            "REQUEST: {} {}\n{}\n\n{}",
            request.method,
            redact_url(request.url.as_str()),
            redact_headers(&request.headers),
            body
        );

        let started = Instant::now();
        let result = self.inner.make(request).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(response) => debug!(
                "RESPONSE: {} ({:?})\n{}\n\n{}",
                response.status,
                elapsed,
                redact_headers(&response.headers),
                redact_body(&response.body)
            ),
            Err(e) => debug!("RESPONSE ERROR ({:?}): {}", elapsed, redact_text(&e.to_string())),
        }
        result
    }
}
