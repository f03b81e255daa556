//! Routing API client

use cf_resources::RouterGroup;

use crate::errors::EngineError;
use crate::http::client::ApiClient;

pub struct RoutingClient {
    api: ApiClient,
}

impl RoutingClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// All router groups
    pub async fn router_groups(&self) -> Result<Vec<RouterGroup>, EngineError> {
        let url = self.api.url("/routing/v1/router_groups")?;
        self.api.get(url).await
    }

    /// Router group by name
    pub async fn router_group(&self, name: &str) -> Result<RouterGroup, EngineError> {
        self.router_groups()
            .await?
            .into_iter()
            .find(|g| g.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("router group '{}'", name)))
    }
}
