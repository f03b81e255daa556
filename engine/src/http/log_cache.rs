//! Recent application logs from log-cache

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::EngineError;
use crate::http::client::ApiClient;

/// Timestamp layout of a formatted log line
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Source of recent application logs
#[async_trait]
pub trait RecentLogs: Send + Sync {
    /// Formatted tail of the application's logs, oldest line first
    async fn recent_logs(&self, app_guid: &str) -> Result<String, EngineError>;
}

#[derive(Debug, Default, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    envelopes: Batch,
}

#[derive(Debug, Default, Deserialize)]
struct Batch {
    #[serde(default)]
    batch: Vec<Envelope>,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    /// Nanoseconds since epoch, encoded as a string
    #[serde(default)]
    timestamp: String,

    #[serde(default)]
    instance_id: String,

    #[serde(default)]
    tags: HashMap<String, String>,

    #[serde(default)]
    log: Option<LogPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct LogPayload {
    #[serde(default)]
    payload: String,

    #[serde(rename = "type", default)]
    kind: String,
}

/// log-cache client
pub struct LogCacheClient {
    api: ApiClient,
    max_messages: u32,
}

impl LogCacheClient {
    pub fn new(api: ApiClient, max_messages: u32) -> Self {
        Self { api, max_messages }
    }
}

fn format_timestamp(nanos: &str) -> String {
    let nanos: i64 = nanos.parse().unwrap_or_default();
    Utc.timestamp_nanos(nanos)
        .format(LOG_TIMESTAMP_FORMAT)
        .to_string()
}

/// Render envelopes read newest first as lines oldest first
fn format_envelopes(envelopes: Vec<Envelope>) -> String {
    let mut logs = String::new();
    for envelope in envelopes.into_iter().rev() {
        let Some(log) = envelope.log else {
            continue;
        };
        let message = STANDARD
            .decode(log.payload.as_bytes())
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or(log.payload);
        let stream = if log.kind == "ERR" { "ERR" } else { "OUT" };
        let source_type = envelope
            .tags
            .get("source_type")
            .map(String::as_str)
            .unwrap_or_default();
        let header = format!(
            "{} [{}/{}] {} ",
            format_timestamp(&envelope.timestamp),
            source_type,
            envelope.instance_id,
            stream
        );
        for line in message.split('\n') {
            logs.push_str(&header);
            logs.push_str(line.trim_end_matches(['\r', '\n']));
            logs.push('\n');
        }
    }
    logs
}

#[async_trait]
impl RecentLogs for LogCacheClient {
    async fn recent_logs(&self, app_guid: &str) -> Result<String, EngineError> {
        if self.max_messages == 0 {
            return Ok(String::new());
        }
        debug!("Reading recent logs of app {}", app_guid);
        let limit = self.max_messages.to_string();
        let url = self.api.url_with_query(
            &format!("/api/v1/read/{}", app_guid),
            &[
                ("envelope_types", "LOG"),
                ("descending", "true"),
                ("limit", &limit),
            ],
        )?;
        let response: ReadResponse = self.api.get(url).await?;
        Ok(format_envelopes(response.envelopes.batch))
    }
}
