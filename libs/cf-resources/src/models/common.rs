//! Shapes shared by most resources

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Target of a to-one relationship
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipData {
    pub guid: String,
}

impl RelationshipData {
    pub fn new(guid: impl Into<String>) -> Self {
        Self { guid: guid.into() }
    }
}

/// To-one relationship, `{"data": {"guid": ...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<RelationshipData>,
}

impl Relationship {
    /// Relationship pointing at `guid`
    pub fn to(guid: impl Into<String>) -> Self {
        Self {
            data: Some(RelationshipData::new(guid)),
        }
    }

    /// Guid of the related resource, if any
    pub fn guid(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|d| d.guid.as_str())
            .filter(|g| !g.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.guid().is_none()
    }
}

/// Labels and annotations. A `None` value deletes the key on PATCH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub labels: BTreeMap<String, Option<String>>,

    #[serde(default)]
    pub annotations: BTreeMap<String, Option<String>>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.annotations.is_empty()
    }
}

/// Hyperlink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

/// v3 pagination block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total_results: u64,

    #[serde(default)]
    pub next: Option<Link>,
}

/// v3 paginated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub pagination: Pagination,

    pub resources: Vec<T>,
}

/// v2 resource metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct V2Metadata {
    pub guid: String,

    #[serde(default)]
    pub url: String,
}

/// v2 resource envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V2Resource<T> {
    pub metadata: V2Metadata,
    pub entity: T,
}

/// v2 paginated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V2Page<T> {
    #[serde(default)]
    pub total_results: u64,

    #[serde(default)]
    pub next_url: Option<String>,

    pub resources: Vec<V2Resource<T>>,
}

/// One entry of the v3 error envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub detail: String,
}

/// v3 error envelope, `{"errors": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

/// v2 error body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct V2Error {
    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub error_code: String,
}
