//! Routing API resources

use serde::{Deserialize, Serialize};

/// Router group as listed by `/routing/v1/router_groups`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterGroup {
    pub guid: String,

    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub reservable_ports: Option<String>,
}
