//! Actions shared by the deployment strategies

use std::sync::Arc;

use cf_resources::{AppState, ProcessScale, WEB_PROCESS};
use tracing::{debug, info};

use super::binder::RunBinder;
use super::executor::Action;
use super::models::{AppDeploy, AppDeployResponse};
use super::delete_app;
use crate::bits::BitsManager;
use crate::cloud::{CloudController, DEFAULT_JOB_TIMEOUT};

const SSH_FEATURE: &str = "ssh";

/// Builds the actions strategies assemble into plans
#[derive(Clone)]
pub struct Steps {
    cloud: Arc<dyn CloudController>,
    bits: BitsManager,
    binder: Arc<RunBinder>,
}

impl Steps {
    pub fn new(cloud: Arc<dyn CloudController>, bits: BitsManager, binder: Arc<RunBinder>) -> Self {
        Self {
            cloud,
            bits,
            binder,
        }
    }

    pub fn cloud(&self) -> &Arc<dyn CloudController> {
        &self.cloud
    }

    pub fn bits(&self) -> &BitsManager {
        &self.bits
    }

    pub fn binder(&self) -> &Arc<RunBinder> {
        &self.binder
    }

    /// Seed the response from the intent
    pub fn initialize(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        Action::new("initialize", move |ctx| {
            Box::pin(async move {
                ctx.app_response = AppDeployResponse::from_intent(&deploy);
                Ok(())
            })
        })
    }

    /// Create the app stopped, or update it in place. With `stop_existing` an updated app is
    /// stopped too, otherwise it keeps its state. Reversing deletes the app.
    pub fn upsert_app(&self, deploy: &Arc<AppDeploy>, stop_existing: bool) -> Action {
        let deploy = deploy.clone();
        let cloud = self.cloud.clone();
        let reverse_cloud = self.cloud.clone();
        Action::new("upsert application", move |ctx| {
            Box::pin(async move {
                let app = if deploy.is_new() {
                    info!("Creating app {}", deploy.name);
                    cloud.create_app(&deploy.app_request(false)).await?
                } else {
                    info!("Updating app {} ({})", deploy.name, deploy.guid);
                    let app = cloud.update_app(&deploy.guid, &deploy.app_request(true)).await?;
                    if stop_existing && app.state != AppState::Stopped {
                        cloud.stop_app(&app.guid).await?
                    } else {
                        app
                    }
                };
                ctx.app_response.app = app;
                Ok(())
            })
        })
        .with_reverse(move |ctx| {
            Box::pin(async move {
                let guid = ctx.app_response.app_guid();
                if guid.is_empty() {
                    return Ok(());
                }
                info!("Deleting app {} after failed deployment", ctx.app_response.app.name);
                delete_app(reverse_cloud.as_ref(), guid, DEFAULT_JOB_TIMEOUT).await
            })
        })
    }

    /// Replace the environment variables with the desired set
    pub fn set_env(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let bits = self.bits.clone();
        Action::new("set environment", move |ctx| {
            Box::pin(async move {
                let guid = ctx.app_response.app.guid.clone();
                ctx.app_response.env = bits.set_env_vars(&guid, &deploy.env).await?;
                Ok(())
            })
        })
    }

    /// Apply the ssh toggle when one is given and record the effective value
    pub fn set_ssh(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.cloud.clone();
        Action::new("set ssh", move |ctx| {
            Box::pin(async move {
                let guid = ctx.app_response.app.guid.clone();
                if let Some(enabled) = deploy.enable_ssh {
                    cloud.update_app_feature(&guid, SSH_FEATURE, enabled).await?;
                }
                let feature = cloud.get_app_feature(&guid, SSH_FEATURE).await?;
                ctx.app_response.enable_ssh = Some(feature.enabled);
                Ok(())
            })
        })
    }

    pub fn map_routes(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let binder = self.binder.clone();
        Action::new("map routes", move |ctx| {
            Box::pin(async move {
                let routes = binder
                    .map_routes(&ctx.app_response.app, &deploy.routes)
                    .await?;
                ctx.app_response.routes = routes;
                Ok(())
            })
        })
    }

    pub fn bind_services(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let binder = self.binder.clone();
        Action::new("bind services", move |ctx| {
            Box::pin(async move {
                let bindings = binder
                    .bind_services(&ctx.app_response.app, &deploy.bindings, deploy.bind_timeout)
                    .await?;
                ctx.app_response.bindings = bindings;
                Ok(())
            })
        })
    }

    /// Docker package, or upload of the bits when a path is given
    pub fn upload_package(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let bits = self.bits.clone();
        Action::new("upload package", move |ctx| {
            Box::pin(async move {
                let guid = ctx.app_response.app.guid.clone();
                let package = match &deploy.docker {
                    Some(docker) if deploy.is_docker() => {
                        let package = bits
                            .create_docker_package(
                                &guid,
                                &docker.image,
                                docker.username.clone(),
                                docker.password.clone(),
                            )
                            .await?;
                        bits.package_wait_ready(&package.guid, deploy.stage_timeout)
                            .await?
                    }
                    _ if !deploy.path.is_empty() => {
                        bits.create_and_upload_bits_package(&guid, &deploy.path, deploy.stage_timeout)
                            .await?
                    }
                    _ => {
                        debug!("No bits to upload for app {}", deploy.name);
                        return Ok(());
                    }
                };
                ctx.app_response.package = Some(package);
                Ok(())
            })
        })
    }

    /// Stage the newest ready package and keep the droplet for the deployment
    pub fn stage_package(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let binder = self.binder.clone();
        Action::new("stage package", move |ctx| {
            Box::pin(async move {
                let droplet = binder
                    .stage_newest_package(ctx.app_response.app_guid(), deploy.stage_timeout)
                    .await?;
                ctx.droplet = Some(droplet);
                Ok(())
            })
        })
    }

    pub fn scale_process(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.cloud.clone();
        Action::new("scale process", move |ctx| {
            Box::pin(async move {
                let guid = ctx.app_response.app.guid.clone();
                let scale = deploy.process.scale();
                let process = if scale == ProcessScale::default() {
                    cloud.get_app_process(&guid, WEB_PROCESS).await?
                } else {
                    cloud.scale_process(&guid, WEB_PROCESS, &scale).await?
                };
                ctx.app_response.process = Some(process);
                Ok(())
            })
        })
    }

    /// Command and health check of the web process
    pub fn update_process(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.cloud.clone();
        Action::new("update process", move |ctx| {
            Box::pin(async move {
                let update = deploy.process.update();
                if update.is_empty() {
                    return Ok(());
                }
                let process_guid = match &ctx.app_response.process {
                    Some(process) if !process.guid.is_empty() => process.guid.clone(),
                    _ => {
                        cloud
                            .get_app_process(ctx.app_response.app_guid(), WEB_PROCESS)
                            .await?
                            .guid
                    }
                };
                let process = cloud.update_process(&process_guid, &update).await?;
                ctx.app_response.process = Some(process);
                Ok(())
            })
        })
    }
}
