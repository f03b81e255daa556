//! Route destination resources

use serde::{Deserialize, Serialize};

/// Process targeted by a destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationProcess {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Application side of a destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationApp {
    pub guid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<DestinationProcess>,
}

/// Route destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub guid: String,

    pub app: DestinationApp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// `/v3/routes/:guid/destinations` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationList {
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

/// Destination to insert
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDestination {
    pub app: DestinationApp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Body for `POST /v3/routes/:guid/destinations`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertDestinations {
    pub destinations: Vec<NewDestination>,
}
