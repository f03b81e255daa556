//! Application bits, packages, environment variables and metadata

pub mod multipart;

use std::sync::Arc;
use std::time::Duration;

use cf_resources::{Package, PackageData, PackageRequest, PackageState};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::archive::ArchiveFetcher;
use crate::cloud::{self, CloudController};
use crate::errors::{EngineError, TimeoutKind};
use crate::polling::{poll_for, POLL_INTERVAL};

/// Ceiling for a v2 bits copy job
pub const COPY_BITS_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Moves application bits between sources, the platform and other applications
#[derive(Clone)]
pub struct BitsManager {
    cloud: Arc<dyn CloudController>,
    fetcher: ArchiveFetcher,
}

impl BitsManager {
    pub fn new(cloud: Arc<dyn CloudController>, fetcher: ArchiveFetcher) -> Self {
        Self { cloud, fetcher }
    }

    pub fn fetcher(&self) -> &ArchiveFetcher {
        &self.fetcher
    }

    /// Upload the archive at `path` as the bits of a v2 application
    pub async fn upload_app(&self, app_guid: &str, path: &str) -> Result<(), EngineError> {
        let zip = self.fetcher.fetch(path).await?;
        info!("Uploading {} bytes of bits to app {}", zip.size(), app_guid);
        self.cloud.upload_app_bits(app_guid, zip).await
    }

    /// Upload the archive at `path` as the bits of a buildpack
    pub async fn upload_buildpack(&self, buildpack_guid: &str, path: &str) -> Result<(), EngineError> {
        let zip = self.fetcher.fetch(path).await?;
        info!(
            "Uploading buildpack {} ({} bytes) to {}",
            zip.name(),
            zip.size(),
            buildpack_guid
        );
        self.cloud.upload_buildpack_bits(buildpack_guid, zip).await
    }

    /// Copy the bits of `source_app_guid` into `target_app_guid` and wait for the copy job
    pub async fn copy_app(&self, source_app_guid: &str, target_app_guid: &str) -> Result<(), EngineError> {
        let job = self
            .cloud
            .copy_app_bits(source_app_guid, target_app_guid)
            .await?;
        cloud::wait_v2_job(self.cloud.as_ref(), job, COPY_BITS_TIMEOUT).await?;
        Ok(())
    }

    /// Copy the newest ready package of `source_app_guid` into `target_app_guid`
    pub async fn copy_app_package(
        &self,
        source_app_guid: &str,
        target_app_guid: &str,
        timeout: Duration,
    ) -> Result<Package, EngineError> {
        let source = self
            .cloud
            .list_packages(source_app_guid, &[PackageState::Ready])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::AsyncFailure(format!("No package found for app {}", source_app_guid))
            })?;
        debug!(
            "Copying package {} of app {} to app {}",
            source.guid, source_app_guid, target_app_guid
        );
        let package = self
            .cloud
            .copy_package(&source.guid, target_app_guid)
            .await?;
        self.package_wait_ready(&package.guid, timeout).await
    }

    pub async fn get_env_vars(&self, app_guid: &str) -> Result<Map<String, Value>, EngineError> {
        self.cloud.get_env_vars(app_guid).await
    }

    /// Make the app environment equal to `desired`: new values are set and keys absent from
    /// `desired` are removed.
    pub async fn set_env_vars(
        &self,
        app_guid: &str,
        desired: &Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError> {
        let current = self.cloud.get_env_vars(app_guid).await?;
        let mut patch = desired.clone();
        for key in current.keys() {
            if !desired.contains_key(key) {
                patch.insert(key.clone(), Value::Null);
            }
        }
        if patch.is_empty() {
            return Ok(current);
        }
        self.cloud.patch_env_vars(app_guid, patch).await
    }

    pub async fn create_docker_package(
        &self,
        app_guid: &str,
        image: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Package, EngineError> {
        let data = PackageData {
            image: Some(image.to_string()),
            username,
            password,
        };
        self.cloud
            .create_package(&PackageRequest::docker(app_guid, data))
            .await
    }

    /// Create a bits package, upload the archive at `path` into it and wait until it is ready
    pub async fn create_and_upload_bits_package(
        &self,
        app_guid: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Package, EngineError> {
        let package = self
            .cloud
            .create_package(&PackageRequest::bits(app_guid))
            .await?;
        let zip = self.fetcher.fetch(path).await?;
        info!(
            "Uploading {} bytes into package {} of app {}",
            zip.size(),
            package.guid,
            app_guid
        );
        self.cloud.upload_package_bits(&package.guid, zip).await?;

        let cloud = self.cloud.as_ref();
        let guid = package.guid.as_str();
        poll_for(POLL_INTERVAL, timeout, TimeoutKind::Stage, move || async move {
            let package = cloud.get_package(guid).await?;
            match package.state {
                PackageState::Ready => Ok(Some(package)),
                PackageState::Failed => Err(EngineError::AsyncFailure(
                    "Package processing failed".to_string(),
                )),
                PackageState::Expired => {
                    Err(EngineError::AsyncFailure("Package expired".to_string()))
                }
                _ => Ok(None),
            }
        })
        .await
    }

    /// Wait until package `guid` is ready
    pub async fn package_wait_ready(&self, guid: &str, timeout: Duration) -> Result<Package, EngineError> {
        let cloud = self.cloud.as_ref();
        poll_for(POLL_INTERVAL, timeout, TimeoutKind::Stage, move || async move {
            let package = cloud.get_package(guid).await?;
            match package.state {
                PackageState::Ready => Ok(Some(package)),
                PackageState::Failed | PackageState::Expired => Err(EngineError::AsyncFailure(
                    format!("Package {}, state: {}", guid, package.state.as_str()),
                )),
                _ => Ok(None),
            }
        })
        .await
    }

    /// Copy labels and annotations of one app onto another. Failures are logged only.
    pub async fn copy_metadata(&self, source_app_guid: &str, target_app_guid: &str) {
        let result = async {
            let metadata = self.cloud.get_app_metadata(source_app_guid).await?;
            self.cloud
                .update_app_metadata(target_app_guid, &metadata)
                .await
        }
        .await;
        if let Err(e) = result {
            warn!(
                "Could not copy metadata from app {} to app {}: {}",
                source_app_guid, target_app_guid, e
            );
        }
    }

    /// Change detection token of a source reference
    pub async fn content_hash(&self, path: &str) -> Result<String, EngineError> {
        self.fetcher.content_hash(path).await
    }
}
