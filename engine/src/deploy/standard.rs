//! Stop, mutate and start in place

use std::sync::Arc;

use async_trait::async_trait;
use cf_resources::{AppState, PackageState, WEB_PROCESS};
use tracing::info;

use super::executor::{execute, Action};
use super::models::{AppDeploy, AppDeployResponse};
use super::steps::Steps;
use super::{DeployFailure, DeployResult, Strategy, DEFAULT_STRATEGY};
use crate::errors::EngineError;

#[derive(Clone)]
pub struct Standard {
    steps: Steps,
}

impl Standard {
    pub fn new(steps: Steps) -> Self {
        Self { steps }
    }

    fn start_app(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let binder = self.steps.binder().clone();
        Action::new("start application", move |ctx| {
            Box::pin(async move {
                if !deploy.wants_started() {
                    return Ok(());
                }
                let (app, process) = binder
                    .restart(
                        &ctx.app_response.app,
                        &deploy.process,
                        deploy.stage_timeout,
                        deploy.start_timeout,
                    )
                    .await?;
                ctx.app_response.app = app;
                ctx.app_response.process = Some(process);
                Ok(())
            })
        })
    }

    async fn try_restage(&self, deploy: &AppDeploy) -> Result<AppDeployResponse, EngineError> {
        let cloud = self.steps.cloud();
        let binder = self.steps.binder();
        let app = deploy.app();

        let package = cloud
            .list_packages(&deploy.guid, &[PackageState::Ready])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::AsyncFailure("No READY package found".to_string()))?;
        let droplet = binder.stage_package(&package.guid, deploy.stage_timeout).await?;

        binder.stop(&app).await?;
        cloud.set_current_droplet(&deploy.guid, &droplet.guid).await?;
        let started = cloud.start_app(&deploy.guid).await?;
        let web = cloud.get_app_process(&deploy.guid, WEB_PROCESS).await?;

        let mut response = AppDeployResponse::from_intent(deploy);
        response.app = started;
        response.package = Some(package);
        if let Err(e) = binder
            .wait_start(&response.app, web.instances, deploy.start_timeout)
            .await
        {
            return Err(binder.with_logs(&response.app, e).await);
        }
        response.process = Some(web);

        if !deploy.wants_started() {
            response.app = binder.stop(&response.app).await?;
        }
        Ok(response)
    }
}

#[async_trait]
impl Strategy for Standard {
    async fn deploy(&self, deploy: &AppDeploy) -> DeployResult {
        info!("Deploying app {} with the standard strategy", deploy.name);
        let deploy = Arc::new(deploy.clone());
        let actions = vec![
            self.steps.initialize(&deploy),
            self.steps.upsert_app(&deploy, true),
            self.steps.set_env(&deploy),
            self.steps.set_ssh(&deploy),
            self.steps.map_routes(&deploy),
            self.steps.bind_services(&deploy),
            self.steps.upload_package(&deploy),
            self.steps.scale_process(&deploy),
            self.steps.update_process(&deploy),
            self.start_app(&deploy),
        ];

        let (ctx, result) = execute(actions).await;
        let mut response = ctx.app_response;
        response.app.state = if deploy.wants_started() && result.is_ok() {
            AppState::Started
        } else {
            AppState::Stopped
        };
        match result {
            Ok(()) => Ok(response),
            Err(e) => Err(DeployFailure::new(response, e)),
        }
    }

    async fn restage(&self, deploy: &AppDeploy) -> DeployResult {
        info!("Restaging app {}", deploy.name);
        self.try_restage(deploy).await.map_err(|e| {
            let mut response = AppDeployResponse::from_intent(deploy);
            response.app.state = AppState::Stopped;
            DeployFailure::new(response, e)
        })
    }

    async fn restart(&self, deploy: &AppDeploy) -> Result<(), EngineError> {
        self.steps
            .binder()
            .restart(
                &deploy.app(),
                &deploy.process,
                deploy.stage_timeout,
                deploy.start_timeout,
            )
            .await?;
        Ok(())
    }

    fn names(&self) -> &'static [&'static str] {
        &["standard", "v2", DEFAULT_STRATEGY]
    }

    fn is_create_new_app(&self) -> bool {
        false
    }
}
