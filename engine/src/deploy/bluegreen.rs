//! Run the new application next to the old one, then retire the old one

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cf_resources::{AppRequest, AppState, InstanceState};
use tokio::time::Instant;
use tracing::{info, warn};

use super::executor::{execute, Action, Context};
use super::models::{venerable_name, AppDeploy};
use super::standard::Standard;
use super::steps::Steps;
use super::{delete_app, DeployFailure, DeployResult, Strategy};
use crate::bits::COPY_BITS_TIMEOUT;
use crate::cloud::{CloudController, DEFAULT_JOB_TIMEOUT};
use crate::errors::EngineError;

/// The platform kills an app still running after its graceful stop period
const VENERABLE_STOP_TIMEOUT: Duration = Duration::from_secs(20);
const VENERABLE_STOP_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct BlueGreen {
    steps: Steps,
    standard: Standard,
}

async fn rename(cloud: &dyn CloudController, guid: &str, name: &str) -> Result<(), EngineError> {
    let request = AppRequest {
        name: Some(name.to_string()),
        ..Default::default()
    };
    cloud.update_app(guid, &request).await?;
    Ok(())
}

/// True once every instance of every process is down or crashed
async fn is_app_stopped(cloud: &dyn CloudController, guid: &str) -> Result<bool, EngineError> {
    for process in cloud.get_app_processes(guid).await? {
        for instance in cloud.get_process_instances(&process.guid).await? {
            match instance.state {
                InstanceState::Down => {}
                InstanceState::Crashed => {
                    info!(
                        "Process {} has crashed, considered stopped",
                        process.guid
                    );
                }
                _ => return Ok(false),
            }
        }
    }
    Ok(true)
}

impl BlueGreen {
    pub fn new(steps: Steps, standard: Standard) -> Self {
        Self { steps, standard }
    }

    /// Rename the current app out of the way. Reversing gives it its name back.
    fn rename_to_venerable(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let reverse_deploy = deploy.clone();
        let cloud = self.steps.cloud().clone();
        let reverse_cloud = cloud.clone();
        Action::new("rename to venerable", move |_ctx| {
            Box::pin(async move {
                let venerable = venerable_name(&deploy.name);
                info!("Renaming app {} to {}", deploy.name, venerable);
                rename(cloud.as_ref(), &deploy.guid, &venerable).await
            })
        })
        .with_reverse(move |_ctx| {
            Box::pin(async move {
                info!("Renaming venerable app back to {}", reverse_deploy.name);
                rename(reverse_cloud.as_ref(), &reverse_deploy.guid, &reverse_deploy.name).await
            })
        })
    }

    /// Standard deployment of `deploy` as a new app. A failed deployment removes what it
    /// created itself; reversing deletes the new app.
    fn deploy_new_app(&self, deploy: AppDeploy) -> Action {
        let standard = self.standard.clone();
        let cloud = self.steps.cloud().clone();
        Action::new("deploy new application", move |ctx| {
            Box::pin(async move {
                match standard.deploy(&deploy).await {
                    Ok(response) => {
                        ctx.app_response = response;
                        Ok(())
                    }
                    Err(failure) => {
                        ctx.app_response = *failure.response;
                        ctx.app_response.app.guid.clear();
                        Err(failure.error)
                    }
                }
            })
        })
        .with_reverse(move |ctx| {
            Box::pin(async move {
                let guid = ctx.app_response.app_guid();
                if guid.is_empty() {
                    return Ok(());
                }
                info!("Deleting new app {}", guid);
                delete_app(cloud.as_ref(), guid, DEFAULT_JOB_TIMEOUT).await
            })
        })
    }

    /// Labels and annotations of the old app onto the new one
    fn copy_metadata(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let bits = self.steps.bits().clone();
        Action::new("copy metadata", move |ctx| {
            Box::pin(async move {
                bits.copy_metadata(&deploy.guid, ctx.app_response.app_guid())
                    .await;
                Ok(())
            })
        })
    }

    fn stop_venerable(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.steps.cloud().clone();
        Action::new("stop venerable", move |_ctx| {
            Box::pin(async move {
                cloud.stop_app(&deploy.guid).await?;
                Ok(())
            })
        })
    }

    /// Wait for the old instances to go down. Past the ceiling the step proceeds anyway.
    fn wait_venerable_stopped(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.steps.cloud().clone();
        Action::new("wait venerable stopped", move |_ctx| {
            Box::pin(async move {
                let started = Instant::now();
                while !is_app_stopped(cloud.as_ref(), &deploy.guid).await? {
                    if started.elapsed() >= VENERABLE_STOP_TIMEOUT {
                        warn!("Timeout reached while waiting for application to stop");
                        break;
                    }
                    tokio::time::sleep(VENERABLE_STOP_INTERVAL).await;
                }
                Ok(())
            })
        })
    }

    fn delete_venerable(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let cloud = self.steps.cloud().clone();
        Action::new("delete venerable", move |_ctx| {
            Box::pin(async move {
                delete_app(cloud.as_ref(), &deploy.guid, DEFAULT_JOB_TIMEOUT)
                    .await
                    .map_err(|e| match e {
                        EngineError::AsyncFailure(reason) => EngineError::AsyncFailure(format!(
                            "Venerable app deletion failed, reason: {}",
                            reason
                        )),
                        other => other,
                    })
            })
        })
    }

    /// Newest ready package of the old app into the new one. Docker apps already have theirs.
    fn copy_package(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let bits = self.steps.bits().clone();
        Action::new("copy package", move |ctx| {
            Box::pin(async move {
                if deploy.is_docker() {
                    return Ok(());
                }
                let package = bits
                    .copy_app_package(&deploy.guid, ctx.app_response.app_guid(), COPY_BITS_TIMEOUT)
                    .await?;
                ctx.app_response.package = Some(package);
                Ok(())
            })
        })
    }

    fn start_new_app(&self, deploy: &Arc<AppDeploy>) -> Action {
        let deploy = deploy.clone();
        let binder = self.steps.binder().clone();
        Action::new("start new application", move |ctx| {
            Box::pin(async move {
                let (app, process) = binder
                    .start(
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

    fn finish(result: (Context, Result<(), EngineError>)) -> DeployResult {
        let (ctx, result) = result;
        match result {
            Ok(()) => Ok(ctx.app_response),
            Err(e) => {
                let mut response = ctx.app_response;
                response.app.state = AppState::Stopped;
                Err(DeployFailure::new(response, e))
            }
        }
    }
}

#[async_trait]
impl Strategy for BlueGreen {
    async fn deploy(&self, deploy: &AppDeploy) -> DeployResult {
        if !deploy.wants_started() || deploy.is_new() {
            return self.standard.deploy(deploy).await;
        }
        info!("Deploying app {} with the blue-green strategy", deploy.name);
        let deploy = Arc::new(deploy.clone());
        let actions = vec![
            self.rename_to_venerable(&deploy),
            self.deploy_new_app(deploy.as_new_app()),
            self.copy_metadata(&deploy),
            self.stop_venerable(&deploy),
            self.wait_venerable_stopped(&deploy),
            self.delete_venerable(&deploy),
        ];
        Self::finish(execute(actions).await)
    }

    async fn restage(&self, deploy: &AppDeploy) -> DeployResult {
        if !deploy.wants_started() || deploy.is_new() {
            return self.standard.restage(deploy).await;
        }
        info!("Restaging app {} with the blue-green strategy", deploy.name);
        let deploy = Arc::new(deploy.clone());
        let mut created = deploy.as_new_app();
        created.state = AppState::Stopped;
        created.path = String::new();

        let actions = vec![
            self.rename_to_venerable(&deploy),
            self.deploy_new_app(created),
            self.copy_package(&deploy),
            self.start_new_app(&deploy),
            self.copy_metadata(&deploy),
            self.delete_venerable(&deploy),
        ];
        let mut result = Self::finish(execute(actions).await);
        if let Ok(response) = &mut result {
            response.app.state = AppState::Started;
        }
        result
    }

    async fn restart(&self, deploy: &AppDeploy) -> Result<(), EngineError> {
        self.standard.restart(deploy).await
    }

    fn names(&self) -> &'static [&'static str] {
        &["blue-green", "blue-green-v3"]
    }

    fn is_create_new_app(&self) -> bool {
        true
    }
}
