//! Cloud controller operations used by the deployment engine
//!
//! [`CloudController`] is the seam between the orchestration code (bits pipeline, run binder,
//! strategies) and the platform. [`CloudClient`] implements it over the v2 and v3 REST APIs.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use cf_resources::{
    App, AppFeature, AppRequest, Build, BuildRequest, CreateBindingRequest,
    CreateDeploymentRequest, Deployment, Destination, Droplet, DropletState, Job, JobState,
    Metadata, NewDestination, Package, PackageRequest, PackageState, Process, ProcessInstance,
    ProcessScale, ProcessUpdate, Revision, ServiceCredentialBinding, V2Job, V2JobStatus,
};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::archive::ZipStream;
use crate::errors::{EngineError, TimeoutKind};
use crate::utils::{calc_exp_backoff, CooldownOptions};

pub use client::CloudClient;

/// Ceiling for jobs the engine waits on outside of a caller supplied timeout
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait CloudController: Send + Sync {
    // Applications
    async fn get_app(&self, guid: &str) -> Result<App, EngineError>;
    async fn create_app(&self, request: &AppRequest) -> Result<App, EngineError>;
    async fn update_app(&self, guid: &str, request: &AppRequest) -> Result<App, EngineError>;
    /// Returns the deletion job URL
    async fn delete_app(&self, guid: &str) -> Result<Option<String>, EngineError>;
    async fn start_app(&self, guid: &str) -> Result<App, EngineError>;
    async fn stop_app(&self, guid: &str) -> Result<App, EngineError>;

    async fn get_env_vars(&self, guid: &str) -> Result<Map<String, Value>, EngineError>;
    /// Keys mapped to null are removed
    async fn patch_env_vars(
        &self,
        guid: &str,
        vars: Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError>;

    async fn get_app_feature(&self, guid: &str, name: &str) -> Result<AppFeature, EngineError>;
    async fn update_app_feature(
        &self,
        guid: &str,
        name: &str,
        enabled: bool,
    ) -> Result<AppFeature, EngineError>;

    /// Empty metadata when the app is gone
    async fn get_app_metadata(&self, guid: &str) -> Result<Metadata, EngineError>;
    async fn update_app_metadata(&self, guid: &str, metadata: &Metadata) -> Result<(), EngineError>;

    // Packages
    /// Packages of an app in the given states, newest first
    async fn list_packages(
        &self,
        app_guid: &str,
        states: &[PackageState],
    ) -> Result<Vec<Package>, EngineError>;
    async fn create_package(&self, request: &PackageRequest) -> Result<Package, EngineError>;
    async fn get_package(&self, guid: &str) -> Result<Package, EngineError>;
    async fn upload_package_bits(
        &self,
        package_guid: &str,
        zip: ZipStream,
    ) -> Result<Package, EngineError>;
    /// Copy `source_package_guid` into a new package of `target_app_guid`
    async fn copy_package(
        &self,
        source_package_guid: &str,
        target_app_guid: &str,
    ) -> Result<Package, EngineError>;

    // Builds and droplets
    async fn create_build(&self, request: &BuildRequest) -> Result<Build, EngineError>;
    async fn get_build(&self, guid: &str) -> Result<Build, EngineError>;
    async fn get_droplet(&self, guid: &str) -> Result<Droplet, EngineError>;
    async fn list_package_droplets(
        &self,
        package_guid: &str,
        states: &[DropletState],
    ) -> Result<Vec<Droplet>, EngineError>;
    async fn get_current_droplet(&self, app_guid: &str) -> Result<Droplet, EngineError>;
    async fn set_current_droplet(&self, app_guid: &str, droplet_guid: &str)
        -> Result<(), EngineError>;

    // Processes
    async fn get_app_processes(&self, app_guid: &str) -> Result<Vec<Process>, EngineError>;
    async fn get_app_process(&self, app_guid: &str, kind: &str) -> Result<Process, EngineError>;
    async fn get_process_instances(
        &self,
        process_guid: &str,
    ) -> Result<Vec<ProcessInstance>, EngineError>;
    async fn scale_process(
        &self,
        app_guid: &str,
        kind: &str,
        scale: &ProcessScale,
    ) -> Result<Process, EngineError>;
    async fn update_process(
        &self,
        process_guid: &str,
        update: &ProcessUpdate,
    ) -> Result<Process, EngineError>;

    // Routes and service bindings
    async fn list_route_destinations(&self, route_guid: &str)
        -> Result<Vec<Destination>, EngineError>;
    async fn insert_route_destinations(
        &self,
        route_guid: &str,
        destinations: Vec<NewDestination>,
    ) -> Result<Vec<Destination>, EngineError>;
    async fn list_bindings(
        &self,
        app_guid: &str,
        service_instance_guid: &str,
    ) -> Result<Vec<ServiceCredentialBinding>, EngineError>;
    /// Returns the binding job URL
    async fn create_binding(
        &self,
        request: &CreateBindingRequest,
    ) -> Result<Option<String>, EngineError>;

    // Jobs
    async fn get_job(&self, url: &str) -> Result<Job, EngineError>;
    async fn get_v2_job(&self, url: &str) -> Result<V2Job, EngineError>;

    // Deployments
    async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<Deployment, EngineError>;
    async fn get_deployment(&self, guid: &str) -> Result<Deployment, EngineError>;
    /// Deployed revisions, newest first
    async fn list_deployed_revisions(&self, app_guid: &str) -> Result<Vec<Revision>, EngineError>;

    // v2 bits endpoints
    async fn upload_app_bits(&self, app_guid: &str, zip: ZipStream) -> Result<(), EngineError>;
    async fn upload_buildpack_bits(
        &self,
        buildpack_guid: &str,
        zip: ZipStream,
    ) -> Result<(), EngineError>;
    /// Starts a copy of the source app bits, returning the v2 job
    async fn copy_app_bits(
        &self,
        source_app_guid: &str,
        target_app_guid: &str,
    ) -> Result<V2Job, EngineError>;
}

/// Poll a v3 job until it completes, backing off between reads.
///
/// A failed job surfaces its error details as [`EngineError::AsyncFailure`].
pub async fn wait_job(
    cloud: &dyn CloudController,
    job_url: &str,
    timeout: Duration,
) -> Result<Job, EngineError> {
    let backoff = CooldownOptions::default();
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        let job = cloud.get_job(job_url).await?;
        match job.state {
            JobState::Complete => return Ok(job),
            JobState::Failed => return Err(EngineError::AsyncFailure(job.error_message())),
            _ => {}
        }
        if started.elapsed() >= timeout {
            return Err(EngineError::Timeout(TimeoutKind::Job));
        }
        let delay = calc_exp_backoff(&backoff, attempt);
        debug!("Job {} is {:?}, next check in {:?}", job.guid, job.state, delay);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Poll a v2 job until it finishes
pub async fn wait_v2_job(
    cloud: &dyn CloudController,
    job: V2Job,
    timeout: Duration,
) -> Result<V2Job, EngineError> {
    let backoff = CooldownOptions::default();
    let started = Instant::now();
    let mut attempt = 0;
    let mut job = job;
    loop {
        match job.status {
            V2JobStatus::Finished => return Ok(job),
            V2JobStatus::Failed => {
                let reason = job
                    .error_details
                    .as_ref()
                    .map(|e| format!("{}: {}", e.error_code, e.description))
                    .unwrap_or_else(|| "job failed".to_string());
                return Err(EngineError::AsyncFailure(reason));
            }
            _ => {}
        }
        if started.elapsed() >= timeout {
            return Err(EngineError::Timeout(TimeoutKind::Job));
        }
        tokio::time::sleep(calc_exp_backoff(&backoff, attempt)).await;
        attempt += 1;
        job = cloud
            .get_v2_job(&format!("/v2/jobs/{}", job.guid))
            .await?;
    }
}
