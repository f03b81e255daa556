//! Route mapping, service binding, staging and start of applications

use std::sync::Arc;
use std::time::Duration;

use cf_resources::{
    App, BuildRequest, BuildState, CreateBindingRequest, DestinationApp, Droplet, DropletState,
    InstanceState, JobState, NewDestination, OperationState, PackageState, Process,
    ProcessScale, RelationshipData, ServiceCredentialBinding, WEB_PROCESS,
};
use tracing::{debug, info, warn};

use super::models::{ProcessSpec, RouteMapping, ServiceBinding};
use crate::cloud::CloudController;
use crate::errors::{EngineError, TimeoutKind};
use crate::http::log_cache::RecentLogs;
use crate::polling::{poll_for, poll_with_timeout, Poll, POLL_INTERVAL};

/// Pause after inserting a destination, the route emitter is eventually consistent
const ROUTE_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Drives an application to a running state and attaches it to routes and services
pub struct RunBinder {
    cloud: Arc<dyn CloudController>,
    logs: Arc<dyn RecentLogs>,
}

impl RunBinder {
    pub fn new(cloud: Arc<dyn CloudController>, logs: Arc<dyn RecentLogs>) -> Self {
        Self { cloud, logs }
    }

    /// Make `app` a destination of every route. Mappings are issued one after another.
    pub async fn map_routes(
        &self,
        app: &App,
        routes: &[RouteMapping],
    ) -> Result<Vec<RouteMapping>, EngineError> {
        let mut mapped = Vec::with_capacity(routes.len());
        for route in routes {
            if let Some(existing) = self.find_destination(&app.guid, route).await? {
                debug!("App {} already mapped to route {}", app.name, route.route_guid);
                mapped.push(existing);
                continue;
            }

            self.cloud
                .insert_route_destinations(
                    &route.route_guid,
                    vec![NewDestination {
                        app: DestinationApp {
                            guid: app.guid.clone(),
                            process: None,
                        },
                        port: route.port,
                    }],
                )
                .await?;
            tokio::time::sleep(ROUTE_SETTLE_DELAY).await;

            match self.find_destination(&app.guid, route).await? {
                Some(realized) => {
                    info!("Mapped route {} to app {}", route.route_guid, app.name);
                    mapped.push(realized);
                }
                None => {
                    return Err(EngineError::AsyncFailure(format!(
                        "Failed to map route {}",
                        route.route_guid
                    )))
                }
            }
        }
        Ok(mapped)
    }

    async fn find_destination(
        &self,
        app_guid: &str,
        route: &RouteMapping,
    ) -> Result<Option<RouteMapping>, EngineError> {
        let destinations = self.cloud.list_route_destinations(&route.route_guid).await?;
        Ok(destinations
            .into_iter()
            .find(|d| d.app.guid == app_guid && (route.port.is_none() || d.port == route.port))
            .map(|d| RouteMapping {
                route_guid: route.route_guid.clone(),
                port: d.port.or(route.port),
                destination_guid: d.guid,
            }))
    }

    /// Bind `app` to every service instance, one binding at a time
    pub async fn bind_services(
        &self,
        app: &App,
        bindings: &[ServiceBinding],
        timeout: Duration,
    ) -> Result<Vec<ServiceCredentialBinding>, EngineError> {
        let mut bound = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let existing = self
                .cloud
                .list_bindings(&app.guid, &binding.service_instance_guid)
                .await?;
            if let Some(existing) = existing.into_iter().next() {
                debug!(
                    "App {} already bound to service instance {}",
                    app.name, binding.service_instance_guid
                );
                bound.push(existing);
                continue;
            }
            bound.push(self.bind_service(app, binding, timeout).await?);
        }
        Ok(bound)
    }

    async fn bind_service(
        &self,
        app: &App,
        binding: &ServiceBinding,
        timeout: Duration,
    ) -> Result<ServiceCredentialBinding, EngineError> {
        let label = binding
            .name
            .clone()
            .unwrap_or_else(|| binding.service_instance_guid.clone());
        let request = CreateBindingRequest::app(
            &app.guid,
            &binding.service_instance_guid,
            binding.name.clone(),
            binding.parameters.clone(),
        );
        let job_url = self.cloud.create_binding(&request).await?;
        info!("Binding service instance {} to app {}", label, app.name);

        let cloud = self.cloud.as_ref();
        let job_url = job_url.as_deref();
        let label = label.as_str();
        poll_for(POLL_INTERVAL, timeout, TimeoutKind::Bind, move || async move {
            if let Some(url) = job_url {
                let job = cloud.get_job(url).await?;
                match job.state {
                    JobState::Failed => {
                        return Err(EngineError::AsyncFailure(format!(
                            "Binding {} failed for app {}, reason: async job failed",
                            label, app.name
                        )))
                    }
                    JobState::Complete => {}
                    _ => return Ok(None),
                }
            }

            let created = cloud
                .list_bindings(&app.guid, &binding.service_instance_guid)
                .await?;
            let Some(created) = created.into_iter().next() else {
                return Ok(None);
            };
            match created.operation_state() {
                OperationState::Succeeded => Ok(Some(created)),
                OperationState::Failed => {
                    let reason = created
                        .last_operation
                        .as_ref()
                        .and_then(|op| op.description.clone())
                        .unwrap_or_default();
                    Err(EngineError::AsyncFailure(format!(
                        "Binding {} failed for app {}, reason: {}",
                        label, app.name, reason
                    )))
                }
                _ => Ok(None),
            }
        })
        .await
    }

    /// Wait until one instance of the app runs.
    ///
    /// Returns at once when `desired_instances` is zero. Fails when an instance is crashed and
    /// no other instance is on its way up.
    pub async fn wait_start(
        &self,
        app: &App,
        desired_instances: u32,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        if desired_instances == 0 {
            debug!("App {} has no instance to wait for", app.name);
            return Ok(());
        }
        let cloud = self.cloud.as_ref();
        poll_with_timeout(POLL_INTERVAL, timeout, TimeoutKind::Start, move || async move {
            let processes = cloud.get_app_processes(&app.guid).await?;
            let mut pending = false;
            let mut failed = None;
            for process in &processes {
                for instance in cloud.get_process_instances(&process.guid).await? {
                    match instance.state {
                        InstanceState::Running => return Ok(Poll::Done),
                        InstanceState::Starting | InstanceState::Down => pending = true,
                        state => {
                            failed.get_or_insert((instance.index, state));
                        }
                    }
                }
            }
            match failed {
                Some((index, state)) if !pending => Err(EngineError::AsyncFailure(format!(
                    "Instance {} failed with state {} for app {}",
                    index, state, app.name
                ))),
                _ => Ok(Poll::Pending),
            }
        })
        .await
    }

    /// Wait until the newest package of the app has a staged droplet
    pub async fn wait_staging(&self, app: &App, timeout: Duration) -> Result<(), EngineError> {
        let cloud = self.cloud.as_ref();
        let result = poll_with_timeout(POLL_INTERVAL, timeout, TimeoutKind::Stage, move || async move {
            let Some(package) = cloud.list_packages(&app.guid, &[]).await?.into_iter().next() else {
                return Ok(Poll::Pending);
            };
            if matches!(package.state, PackageState::Failed | PackageState::Expired) {
                return Err(staging_failed(app));
            }
            let droplets = cloud.list_package_droplets(&package.guid, &[]).await?;
            match droplets.first().map(|d| d.state) {
                Some(DropletState::Staged) => Ok(Poll::Done),
                Some(DropletState::Failed) => Err(staging_failed(app)),
                _ => Ok(Poll::Pending),
            }
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.with_logs(app, e).await),
        }
    }

    /// Stage `package_guid` through a new build and return the droplet
    pub async fn stage_package(
        &self,
        package_guid: &str,
        timeout: Duration,
    ) -> Result<Droplet, EngineError> {
        let build = self
            .cloud
            .create_build(&BuildRequest {
                package: RelationshipData::new(package_guid),
                lifecycle: None,
            })
            .await?;
        info!("Staging package {} in build {}", package_guid, build.guid);

        let cloud = self.cloud.as_ref();
        let build_guid = build.guid.as_str();
        let staged = poll_for(POLL_INTERVAL, timeout, TimeoutKind::Stage, move || async move {
            let build = cloud.get_build(build_guid).await?;
            match build.state {
                BuildState::Staged => Ok(Some(build)),
                BuildState::Failed => Err(EngineError::AsyncFailure(match &build.error {
                    Some(reason) if !reason.is_empty() => {
                        format!("Package staging failed: {}", reason)
                    }
                    _ => "Package staging failed".to_string(),
                })),
                BuildState::Staging => Ok(None),
            }
        })
        .await?;

        let droplet_guid = staged.droplet_guid().ok_or_else(|| {
            EngineError::AsyncFailure(format!("Build {} staged without a droplet", staged.guid))
        })?;
        self.cloud.get_droplet(droplet_guid).await
    }

    /// Droplet of the newest ready package, staging it when it has none yet
    pub async fn stage_newest_package(
        &self,
        app_guid: &str,
        timeout: Duration,
    ) -> Result<Droplet, EngineError> {
        let package = self
            .cloud
            .list_packages(app_guid, &[PackageState::Ready])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::AsyncFailure("No READY package found".to_string()))?;

        let staged = self
            .cloud
            .list_package_droplets(&package.guid, &[DropletState::Staged])
            .await?;
        if let Some(droplet) = staged.into_iter().next() {
            debug!("Package {} already staged as droplet {}", package.guid, droplet.guid);
            return Ok(droplet);
        }
        self.stage_package(&package.guid, timeout).await
    }

    /// Stage, scale and start the app, then wait for one running instance.
    ///
    /// Failures carry the tail of the application logs.
    pub async fn start(
        &self,
        app: &App,
        process: &ProcessSpec,
        stage_timeout: Duration,
        start_timeout: Duration,
    ) -> Result<(App, Process), EngineError> {
        match self.try_start(app, process, stage_timeout, start_timeout).await {
            Ok(started) => Ok(started),
            Err(e) => Err(self.with_logs(app, e).await),
        }
    }

    async fn try_start(
        &self,
        app: &App,
        process: &ProcessSpec,
        stage_timeout: Duration,
        start_timeout: Duration,
    ) -> Result<(App, Process), EngineError> {
        info!("Starting app {}", app.name);
        let droplet = self.stage_newest_package(&app.guid, stage_timeout).await?;
        self.cloud.set_current_droplet(&app.guid, &droplet.guid).await?;

        let scale = process.scale();
        if scale != ProcessScale::default() {
            self.cloud.scale_process(&app.guid, WEB_PROCESS, &scale).await?;
        }

        let started = self.cloud.start_app(&app.guid).await?;
        let web = self.cloud.get_app_process(&app.guid, WEB_PROCESS).await?;
        self.wait_start(&started, web.instances, start_timeout).await?;
        Ok((started, web))
    }

    pub async fn stop(&self, app: &App) -> Result<App, EngineError> {
        let stopped = self.cloud.stop_app(&app.guid).await?;
        debug!("App {} is {:?}", stopped.name, stopped.state);
        Ok(stopped)
    }

    pub async fn restart(
        &self,
        app: &App,
        process: &ProcessSpec,
        stage_timeout: Duration,
        start_timeout: Duration,
    ) -> Result<(App, Process), EngineError> {
        self.stop(app).await?;
        self.start(app, process, stage_timeout, start_timeout).await
    }

    /// Append the recent logs of `app` to `err`
    pub async fn with_logs(&self, app: &App, err: EngineError) -> EngineError {
        let logs = match self.logs.recent_logs(&app.guid).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!("Could not read logs of app {}: {}", app.name, e);
                format!("Error occurred when recolting app {} logs: {}", app.name, e)
            }
        };
        EngineError::Partial {
            app: app.name.clone(),
            cause: Box::new(err),
            logs,
        }
    }
}

fn staging_failed(app: &App) -> EngineError {
    EngineError::AsyncFailure(format!("Staging failed for app {}", app.guid))
}
