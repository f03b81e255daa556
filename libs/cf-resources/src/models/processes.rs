//! Process and process instance resources

use serde::{Deserialize, Serialize};

/// Type of the process every app gets by default
pub const WEB_PROCESS: &str = "web";

/// Health check type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    #[default]
    Port,
    Process,
    Http,
}

/// Health check parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Process health check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "type")]
    pub kind: HealthCheckType,

    #[serde(default)]
    pub data: HealthCheckData,
}

/// v3 process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub guid: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub instances: u32,

    #[serde(default)]
    pub memory_in_mb: u64,

    #[serde(default)]
    pub disk_in_mb: u64,

    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl Default for Process {
    fn default() -> Self {
        Self {
            guid: String::new(),
            kind: WEB_PROCESS.to_string(),
            command: None,
            instances: 0,
            memory_in_mb: 0,
            disk_in_mb: 0,
            health_check: None,
        }
    }
}

/// Body for `POST /v3/apps/:guid/processes/:type/actions/scale`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessScale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_in_mb: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_in_mb: Option<u64>,
}

/// Body for `PATCH /v3/processes/:guid`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
}

impl ProcessUpdate {
    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.health_check.is_none()
    }
}

/// Process instance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Running,
    Crashed,
    Starting,
    Down,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceState::Running => "RUNNING",
            InstanceState::Crashed => "CRASHED",
            InstanceState::Starting => "STARTING",
            InstanceState::Down => "DOWN",
            InstanceState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Entry of `/v3/processes/:guid/stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstance {
    #[serde(default)]
    pub index: u32,

    pub state: InstanceState,

    #[serde(default)]
    pub uptime: u64,

    #[serde(default)]
    pub details: Option<String>,
}

/// `/v3/processes/:guid/stats` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    #[serde(default)]
    pub resources: Vec<ProcessInstance>,
}
