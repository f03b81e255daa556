//! API root document

use serde::{Deserialize, Serialize};

use super::common::Link;

/// Links advertised at `GET /`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootLinks {
    #[serde(default)]
    pub cloud_controller_v2: Option<Link>,

    #[serde(default)]
    pub cloud_controller_v3: Option<Link>,

    #[serde(default)]
    pub login: Option<Link>,

    #[serde(default)]
    pub uaa: Option<Link>,

    #[serde(default)]
    pub log_cache: Option<Link>,

    #[serde(default)]
    pub routing: Option<Link>,
}

/// `GET /` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootInfo {
    #[serde(default)]
    pub links: RootLinks,
}
