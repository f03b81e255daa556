//! Strategy selection

use std::sync::Arc;

use tracing::debug;

use super::models::AppDeploy;
use super::{AppDeployResponse, DeployFailure, DeployResult, Strategy, DEFAULT_STRATEGY};
use crate::errors::EngineError;

/// Dispatches deployments to the strategy registered under a name
#[derive(Clone)]
pub struct Deployer {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl Deployer {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy answering to `name`, case-insensitively. Unknown names get the default
    /// strategy when one is registered.
    pub fn strategy(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        let name = name.to_lowercase();
        let mut fallback = None;
        for strategy in &self.strategies {
            let names = strategy.names();
            if names.contains(&name.as_str()) {
                return Some(strategy.clone());
            }
            if fallback.is_none() && names.contains(&DEFAULT_STRATEGY) {
                fallback = Some(strategy.clone());
            }
        }
        if fallback.is_some() {
            debug!("No strategy named {:?}, using the default one", name);
        }
        fallback
    }

    /// Every name a strategy is selectable by
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies
            .iter()
            .flat_map(|s| s.names().iter().copied())
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Strategy>, EngineError> {
        self.strategy(name)
            .ok_or_else(|| EngineError::Validation(format!("unknown strategy {:?}", name)))
    }

    pub async fn deploy(&self, strategy: &str, deploy: &AppDeploy) -> DeployResult {
        let checked = self.resolve(strategy).and_then(|s| deploy.validate().map(|_| s));
        match checked {
            Ok(s) => s.deploy(deploy).await,
            Err(e) => Err(DeployFailure::new(AppDeployResponse::from_intent(deploy), e)),
        }
    }

    pub async fn restage(&self, strategy: &str, deploy: &AppDeploy) -> DeployResult {
        match self.resolve(strategy) {
            Ok(s) => s.restage(deploy).await,
            Err(e) => Err(DeployFailure::new(AppDeployResponse::from_intent(deploy), e)),
        }
    }

    pub async fn restart(&self, strategy: &str, deploy: &AppDeploy) -> Result<(), EngineError> {
        self.resolve(strategy)?.restart(deploy).await
    }

    /// Whether an update under `strategy` yields an app with a new identifier
    pub fn is_create_new_app(&self, strategy: &str) -> bool {
        self.strategy(strategy)
            .map(|s| s.is_create_new_app())
            .unwrap_or(false)
    }
}
