//! Application resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Metadata, Relationship};

/// Desired or observed application state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Started,
    #[default]
    Stopped,
}

/// Application lifecycle type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleType {
    #[default]
    Buildpack,
    Docker,
}

/// Lifecycle data, only meaningful for buildpack apps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buildpacks: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Application lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(rename = "type")]
    pub kind: LifecycleType,

    #[serde(default)]
    pub data: LifecycleData,
}

impl Lifecycle {
    pub fn docker() -> Self {
        Self {
            kind: LifecycleType::Docker,
            data: LifecycleData::default(),
        }
    }

    pub fn buildpack(buildpacks: Vec<String>, stack: Option<String>) -> Self {
        Self {
            kind: LifecycleType::Buildpack,
            data: LifecycleData { buildpacks, stack },
        }
    }
}

/// Application relationships
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRelationships {
    #[serde(default)]
    pub space: Relationship,
}

/// v3 application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub guid: String,

    pub name: String,

    #[serde(default)]
    pub state: AppState,

    #[serde(default)]
    pub lifecycle: Lifecycle,

    #[serde(default)]
    pub relationships: AppRelationships,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl App {
    pub fn space_guid(&self) -> Option<&str> {
        self.relationships.space.guid()
    }

    pub fn is_docker(&self) -> bool {
        self.lifecycle.kind == LifecycleType::Docker
    }
}

/// Body for creating or updating an application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<AppRelationships>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Application feature such as `ssh`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFeature {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub enabled: bool,
}

/// `/v3/apps/:guid/environment_variables` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvVars {
    #[serde(default)]
    pub var: serde_json::Map<String, serde_json::Value>,
}

/// Metadata-only view of an application, used for label and annotation updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub metadata: Metadata,
}
