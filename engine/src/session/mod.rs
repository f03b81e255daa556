//! Authenticated session holding every client and deployment component
//!
//! A [`Session`] is built once from [`Settings`] and then shared. Tokens are refreshed lazily by
//! the auth wrapper of each connection chain.

pub mod init;

use std::sync::Arc;

use tracing::info;

use crate::archive::ArchiveFetcher;
use crate::bits::BitsManager;
use crate::cloud::client::CloudClient;
use crate::cloud::CloudController;
use crate::deploy::steps::Steps;
use crate::deploy::{BlueGreen, Deployer, Rolling, RunBinder, Standard};
use crate::errors::EngineError;
use crate::http::client::ApiClient;
use crate::http::log_cache::LogCacheClient;
use crate::http::routing::RoutingClient;
use crate::storage::settings::Settings;

/// Process-wide clients and components
pub struct Session {
    api_endpoint: String,
    purge_when_delete: bool,
    default_quota_guid: String,
    cloud: Arc<CloudClient>,
    raw: ApiClient,
    logs: Arc<LogCacheClient>,
    routing: Option<RoutingClient>,
    uaa_admin: Option<ApiClient>,
    bits: BitsManager,
    binder: Arc<RunBinder>,
    deployer: Deployer,
}

impl Session {
    /// Authenticate against the platform and wire every component.
    ///
    /// Fails when no credential can produce a token or the default quota does not exist.
    pub async fn new(settings: Settings) -> Result<Self, EngineError> {
        let settings = settings.apply_env();
        settings.validate()?;

        let clients = init::connect(&settings).await?;
        let cloud = Arc::new(CloudClient::new(clients.api.clone()));
        let default_quota_guid = cloud
            .find_organization_quota(&settings.default_quota_name)
            .await
            .map_err(|e| EngineError::Config(format!("Error when loading default quota: {}", e)))?
            .guid;

        let logs = Arc::new(LogCacheClient::new(clients.log_cache, settings.app_logs_max));
        let controller: Arc<dyn CloudController> = cloud.clone();
        let bits = BitsManager::new(
            controller.clone(),
            ArchiveFetcher::new(clients.http.clone()),
        );
        let binder = Arc::new(RunBinder::new(controller.clone(), logs.clone()));
        let deployer = build_deployer(Steps::new(controller, bits.clone(), binder.clone()));

        info!("Session ready for {}", settings.api_url);
        Ok(Self {
            api_endpoint: settings.api_url.clone(),
            purge_when_delete: settings.purge_when_delete,
            default_quota_guid,
            cloud,
            raw: clients.api,
            logs,
            routing: clients.routing.map(RoutingClient::new),
            uaa_admin: clients.uaa_admin,
            bits,
            binder,
            deployer,
        })
    }

    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    /// Whether service instances are purged rather than deleted through their broker
    pub fn purge_when_delete(&self) -> bool {
        self.purge_when_delete
    }

    /// Quota assigned to organizations created without one
    pub fn default_quota_guid(&self) -> &str {
        &self.default_quota_guid
    }

    pub fn cloud(&self) -> &Arc<CloudClient> {
        &self.cloud
    }

    /// Authenticated client for endpoints the typed client does not cover
    pub fn raw(&self) -> &ApiClient {
        &self.raw
    }

    pub fn logs(&self) -> &Arc<LogCacheClient> {
        &self.logs
    }

    /// Routing API client, when the platform advertises one
    pub fn routing(&self) -> Option<&RoutingClient> {
        self.routing.as_ref()
    }

    /// UAA client authenticated with the admin client credentials, when configured
    pub fn uaa_admin(&self) -> Option<&ApiClient> {
        self.uaa_admin.as_ref()
    }

    pub fn bits(&self) -> &BitsManager {
        &self.bits
    }

    pub fn binder(&self) -> &Arc<RunBinder> {
        &self.binder
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }
}

/// Every strategy, standard first so it is the default
pub fn build_deployer(steps: Steps) -> Deployer {
    let standard = Standard::new(steps.clone());
    Deployer::new(vec![
        Arc::new(standard.clone()),
        Arc::new(BlueGreen::new(steps.clone(), standard)),
        Arc::new(Rolling::new(steps)),
    ])
}
