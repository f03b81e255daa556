//! Deployment and revision resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Relationship, RelationshipData};

/// Deployment status value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatusValue {
    #[default]
    Active,
    Finalized,
    #[serde(other)]
    Unknown,
}

/// Deployment status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    #[serde(default)]
    pub value: DeploymentStatusValue,

    #[serde(default)]
    pub reason: Option<String>,
}

impl DeploymentStatus {
    /// Reason reported once a deployment fully replaced the previous instances
    pub const DEPLOYED: &'static str = "DEPLOYED";

    pub fn is_deployed(&self) -> bool {
        self.value == DeploymentStatusValue::Finalized && self.reason.as_deref() == Some(Self::DEPLOYED)
    }

    pub fn is_finalized(&self) -> bool {
        self.value == DeploymentStatusValue::Finalized
    }
}

/// Deployment relationships
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRelationships {
    pub app: Relationship,
}

/// v3 deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub guid: String,

    #[serde(default)]
    pub status: DeploymentStatus,

    #[serde(default)]
    pub droplet: Option<RelationshipData>,

    #[serde(default)]
    pub revision: Option<RelationshipData>,

    #[serde(default)]
    pub relationships: DeploymentRelationships,
}

/// Body for creating a deployment from a droplet or a revision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub droplet: Option<RelationshipData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<RelationshipData>,

    pub relationships: DeploymentRelationships,
}

impl CreateDeploymentRequest {
    pub fn with_droplet(app_guid: &str, droplet_guid: &str) -> Self {
        Self {
            droplet: Some(RelationshipData::new(droplet_guid)),
            revision: None,
            relationships: DeploymentRelationships {
                app: Relationship::to(app_guid),
            },
        }
    }

    pub fn with_revision(app_guid: &str, revision_guid: &str) -> Self {
        Self {
            droplet: None,
            revision: Some(RelationshipData::new(revision_guid)),
            relationships: DeploymentRelationships {
                app: Relationship::to(app_guid),
            },
        }
    }
}

/// v3 revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub guid: String,

    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub deployable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}
