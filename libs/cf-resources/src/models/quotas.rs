//! Organization quota resources

use serde::{Deserialize, Serialize};

/// v3 organization quota, reduced to what the session needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationQuota {
    pub guid: String,
    pub name: String,
}
