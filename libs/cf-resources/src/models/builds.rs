//! Build and droplet resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::apps::Lifecycle;
use super::common::RelationshipData;

/// Build state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    #[default]
    Staging,
    Staged,
    Failed,
}

/// v3 build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub guid: String,

    #[serde(default)]
    pub state: BuildState,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub package: Option<RelationshipData>,

    #[serde(default)]
    pub droplet: Option<RelationshipData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Build {
    pub fn droplet_guid(&self) -> Option<&str> {
        self.droplet.as_ref().map(|d| d.guid.as_str())
    }
}

/// Body for staging a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub package: RelationshipData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
}

/// Droplet state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropletState {
    #[default]
    AwaitingUpload,
    ProcessingUpload,
    Staged,
    Copying,
    Failed,
    Expired,
}

impl DropletState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropletState::AwaitingUpload => "AWAITING_UPLOAD",
            DropletState::ProcessingUpload => "PROCESSING_UPLOAD",
            DropletState::Staged => "STAGED",
            DropletState::Copying => "COPYING",
            DropletState::Failed => "FAILED",
            DropletState::Expired => "EXPIRED",
        }
    }
}

/// v3 droplet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Droplet {
    pub guid: String,

    #[serde(default)]
    pub state: DropletState,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
