//! Package resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::Relationship;

/// Package type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    Bits,
    Docker,
}

/// Package state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    #[default]
    AwaitingUpload,
    ProcessingUpload,
    Ready,
    Failed,
    Copying,
    Expired,
}

impl PackageState {
    /// Value used in `states=` query filters
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageState::AwaitingUpload => "AWAITING_UPLOAD",
            PackageState::ProcessingUpload => "PROCESSING_UPLOAD",
            PackageState::Ready => "READY",
            PackageState::Failed => "FAILED",
            PackageState::Copying => "COPYING",
            PackageState::Expired => "EXPIRED",
        }
    }
}

/// Docker image reference carried by docker packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// v3 package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub guid: String,

    #[serde(rename = "type", default)]
    pub kind: PackageType,

    #[serde(default)]
    pub state: PackageState,

    #[serde(default)]
    pub data: PackageData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Package relationships
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageRelationships {
    pub app: Relationship,
}

/// Body for creating a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRequest {
    #[serde(rename = "type")]
    pub kind: PackageType,

    pub relationships: PackageRelationships,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PackageData>,
}

impl PackageRequest {
    pub fn bits(app_guid: &str) -> Self {
        Self {
            kind: PackageType::Bits,
            relationships: PackageRelationships {
                app: Relationship::to(app_guid),
            },
            data: None,
        }
    }

    pub fn docker(app_guid: &str, data: PackageData) -> Self {
        Self {
            kind: PackageType::Docker,
            relationships: PackageRelationships {
                app: Relationship::to(app_guid),
            },
            data: Some(data),
        }
    }
}

/// Body for copying a package into another app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageCopyRequest {
    pub relationships: PackageRelationships,
}
