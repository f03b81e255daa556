//! Zero-downtime updates through platform deployments

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cf_resources::{App, AppState, CreateDeploymentRequest, WEB_PROCESS};
use tracing::{info, warn};

use super::binder::RunBinder;
use super::executor::{execute, Action};
use super::models::AppDeploy;
use super::steps::Steps;
use super::{delete_app, DeployFailure, DeployResult, Strategy};
use crate::cloud::{CloudController, DEFAULT_JOB_TIMEOUT};
use crate::errors::{EngineError, TimeoutKind};
use crate::polling::{poll_with_timeout, Poll, POLL_INTERVAL};

/// Redeploying the previous revision after a failure is not bounded by the request
const REVERT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Rolling {
    steps: Steps,
}

/// Wait for a deployment to replace every instance, then for the app to run
async fn poll_deployment(
    cloud: &dyn CloudController,
    binder: &RunBinder,
    app: &App,
    deployment_guid: &str,
    timeout: Duration,
) -> Result<(), EngineError> {
    poll_with_timeout(POLL_INTERVAL, timeout, TimeoutKind::Deployment, move || async move {
        let deployment = cloud.get_deployment(deployment_guid).await?;
        if deployment.status.is_deployed() {
            let web = cloud.get_app_process(&app.guid, WEB_PROCESS).await?;
            binder.wait_start(app, web.instances, timeout).await?;
            return Ok(Poll::Done);
        }
        if deployment.status.is_finalized() {
            return Err(EngineError::AsyncFailure(format!(
                "Deployment {} finalized with reason {}",
                deployment_guid,
                deployment.status.reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(Poll::Pending)
    })
    .await
}

impl Rolling {
    pub fn new(steps: Steps) -> Self {
        Self { steps }
    }

    /// Remember the revision currently deployed. Reversing deploys it again, or deletes an
    /// app that never had one.
    fn set_current_revision(&self) -> Action {
        let cloud = self.steps.cloud().clone();
        let reverse_cloud = cloud.clone();
        let binder = self.steps.binder().clone();
        Action::new("set current revision", move |ctx| {
            Box::pin(async move {
                let revisions = cloud
                    .list_deployed_revisions(ctx.app_response.app_guid())
                    .await?;
                ctx.revision = revisions.into_iter().next().map(|r| r.guid);
                Ok(())
            })
        })
        .with_reverse(move |ctx| {
            Box::pin(async move {
                let app = &ctx.app_response.app;
                if app.guid.is_empty() {
                    return Ok(());
                }
                match &ctx.revision {
                    Some(revision) => {
                        info!("Redeploying revision {} of app {}", revision, app.name);
                        let request = CreateDeploymentRequest::with_revision(&app.guid, revision);
                        let deployment = reverse_cloud.create_deployment(&request).await?;
                        poll_deployment(
                            reverse_cloud.as_ref(),
                            &binder,
                            app,
                            &deployment.guid,
                            REVERT_TIMEOUT,
                        )
                        .await
                    }
                    None => {
                        warn!("No deployed revision for app {}, deleting it", app.name);
                        delete_app(reverse_cloud.as_ref(), &app.guid, DEFAULT_JOB_TIMEOUT).await
                    }
                }
            })
        })
    }

    /// Roll the staged droplet, or the remembered revision, out to the instances
    fn create_deployment(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.steps.cloud().clone();
        let binder = self.steps.binder().clone();
        Action::new("create deployment", move |ctx| {
            Box::pin(async move {
                let app_guid = ctx.app_response.app.guid.clone();

                if !deploy.wants_started() {
                    let droplet_guid = match &ctx.droplet {
                        Some(droplet) => droplet.guid.clone(),
                        None => cloud.get_current_droplet(&app_guid).await?.guid,
                    };
                    cloud.set_current_droplet(&app_guid, &droplet_guid).await?;
                    ctx.app_response.app = cloud.stop_app(&app_guid).await?;
                    return Ok(());
                }

                let request = match (&ctx.droplet, &ctx.revision) {
                    (Some(droplet), _) => CreateDeploymentRequest::with_droplet(&app_guid, &droplet.guid),
                    (None, Some(revision)) => CreateDeploymentRequest::with_revision(&app_guid, revision),
                    (None, None) => {
                        let current = cloud.get_current_droplet(&app_guid).await?;
                        CreateDeploymentRequest::with_droplet(&app_guid, &current.guid)
                    }
                };
                let deployment = cloud.create_deployment(&request).await?;
                info!("Rolling out deployment {} for app {}", deployment.guid, deploy.name);

                poll_deployment(
                    cloud.as_ref(),
                    &binder,
                    &ctx.app_response.app,
                    &deployment.guid,
                    deploy.start_timeout,
                )
                .await?;

                ctx.app_response.app = cloud.start_app(&app_guid).await?;
                ctx.deployment = Some(deployment);
                Ok(())
            })
        })
    }
}

async fn finish(wants_started: bool, actions: Vec<Action>) -> DeployResult {
    let (ctx, result) = execute(actions).await;
    let mut response = ctx.app_response;
    response.app.state = if wants_started && result.is_ok() {
        AppState::Started
    } else {
        AppState::Stopped
    };
    match result {
        Ok(()) => Ok(response),
        Err(e) => Err(DeployFailure::new(response, e)),
    }
}

#[async_trait]
impl Strategy for Rolling {
    async fn deploy(&self, deploy: &AppDeploy) -> DeployResult {
        info!("Deploying app {} with the rolling strategy", deploy.name);
        let deploy = Arc::new(deploy.clone());
        let actions = vec![
            self.steps.initialize(&deploy),
            self.steps.upsert_app(&deploy, false),
            self.steps.set_env(&deploy),
            self.steps.set_ssh(&deploy),
            self.steps.map_routes(&deploy),
            self.steps.bind_services(&deploy),
            self.steps.upload_package(&deploy),
            self.steps.stage_package(&deploy),
            self.steps.scale_process(&deploy),
            self.steps.update_process(&deploy),
            self.create_deployment(&deploy),
        ];
        finish(deploy.wants_started(), actions).await
    }

    async fn restage(&self, deploy: &AppDeploy) -> DeployResult {
        info!("Restaging app {} with the rolling strategy", deploy.name);
        let deploy = Arc::new(deploy.clone());
        let actions = vec![
            self.steps.initialize(&deploy),
            self.set_current_revision(),
            self.steps.stage_package(&deploy),
            self.create_deployment(&deploy),
        ];
        finish(deploy.wants_started(), actions).await
    }

    async fn restart(&self, deploy: &AppDeploy) -> Result<(), EngineError> {
        info!("Restarting app {} with the rolling strategy", deploy.name);
        let deploy = Arc::new(deploy.clone());
        let actions = vec![
            self.steps.initialize(&deploy),
            self.set_current_revision(),
            self.create_deployment(&deploy),
        ];
        let (_, result) = execute(actions).await;
        result
    }

    fn names(&self) -> &'static [&'static str] {
        &["rolling"]
    }

    fn is_create_new_app(&self) -> bool {
        false
    }
}
