//! Service credential binding resources

use serde::{Deserialize, Serialize};

use super::common::Relationship;

/// Last operation state of an asynchronous resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    #[default]
    Initial,
    #[serde(rename = "in progress")]
    InProgress,
    Succeeded,
    Failed,
}

/// Last operation block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOperation {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub state: OperationState,

    #[serde(default)]
    pub description: Option<String>,
}

/// Binding relationships
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRelationships {
    #[serde(default)]
    pub app: Relationship,

    pub service_instance: Relationship,
}

/// v3 service credential binding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredentialBinding {
    pub guid: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub last_operation: Option<LastOperation>,

    #[serde(default)]
    pub relationships: BindingRelationships,
}

impl ServiceCredentialBinding {
    pub fn operation_state(&self) -> OperationState {
        self.last_operation
            .as_ref()
            .map(|op| op.state)
            .unwrap_or_default()
    }
}

/// Body for creating an app binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBindingRequest {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub relationships: BindingRelationships,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CreateBindingRequest {
    /// App binding between `app_guid` and `service_instance_guid`. Empty parameters are dropped.
    pub fn app(
        app_guid: &str,
        service_instance_guid: &str,
        name: Option<String>,
        parameters: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        Self {
            kind: "app".to_string(),
            name,
            relationships: BindingRelationships {
                app: Relationship::to(app_guid),
                service_instance: Relationship::to(service_instance_guid),
            },
            parameters: parameters.filter(|p| !p.is_empty()),
        }
    }
}
