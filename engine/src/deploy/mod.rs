//! Application deployment strategies
//!
//! A [`Strategy`] turns an [`AppDeploy`] intent into a plan of [`executor::Action`]s. The
//! [`Deployer`] picks the strategy by name.

pub mod binder;
pub mod bluegreen;
pub mod deployer;
pub mod executor;
pub mod models;
pub mod rolling;
pub mod standard;
pub mod steps;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cloud::{self, CloudController};
use crate::errors::EngineError;

pub use binder::RunBinder;
pub use bluegreen::BlueGreen;
pub use deployer::Deployer;
pub use models::{AppDeploy, AppDeployResponse};
pub use rolling::Rolling;
pub use standard::Standard;

/// Strategy name matched when no other name does
pub const DEFAULT_STRATEGY: &str = "default";

/// Failed deployment with the best known state of the application
#[derive(Error, Debug)]
#[error("{error}")]
pub struct DeployFailure {
    pub response: Box<AppDeployResponse>,
    #[source]
    pub error: EngineError,
}

impl DeployFailure {
    pub fn new(response: AppDeployResponse, error: EngineError) -> Self {
        Self {
            response: Box::new(response),
            error,
        }
    }
}

impl From<DeployFailure> for EngineError {
    fn from(failure: DeployFailure) -> Self {
        failure.error
    }
}

pub type DeployResult = Result<AppDeployResponse, DeployFailure>;

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn deploy(&self, deploy: &AppDeploy) -> DeployResult;

    async fn restage(&self, deploy: &AppDeploy) -> DeployResult;

    /// Restart the running application
    async fn restart(&self, deploy: &AppDeploy) -> Result<(), EngineError>;

    /// Names the strategy is selected by
    fn names(&self) -> &'static [&'static str];

    /// Whether updates replace the application with a new identifier
    fn is_create_new_app(&self) -> bool;
}

/// Delete an app and wait for the deletion job. An app already gone is not an error.
pub async fn delete_app(
    cloud: &dyn CloudController,
    guid: &str,
    timeout: Duration,
) -> Result<(), EngineError> {
    let job_url = match cloud.delete_app(guid).await {
        Ok(job_url) => job_url,
        Err(e) if e.is_not_found() => {
            debug!("App {} already deleted", guid);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if let Some(url) = job_url {
        cloud::wait_job(cloud, &url, timeout).await?;
    }
    Ok(())
}
