//! Asynchronous job resources

use serde::{Deserialize, Serialize};

use super::common::{ApiErrorDetail, V2Error};

/// v3 job state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Processing,
    Polling,
    Complete,
    Failed,
}

/// v3 job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub guid: String,

    #[serde(default)]
    pub operation: Option<String>,

    #[serde(default)]
    pub state: JobState,

    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Complete | JobState::Failed)
    }

    /// Joined error details of a failed job
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| {
                if e.title.is_empty() {
                    e.detail.clone()
                } else {
                    format!("{}: {}", e.title, e.detail)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// v2 job status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum V2JobStatus {
    #[default]
    Queued,
    Running,
    Finished,
    Failed,
}

/// v2 job entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct V2Job {
    #[serde(default)]
    pub guid: String,

    #[serde(default)]
    pub status: V2JobStatus,

    #[serde(default)]
    pub error_details: Option<V2Error>,
}
