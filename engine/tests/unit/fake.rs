//! In-memory platform used by the strategy tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cf_resources::{
    App, AppFeature, AppRequest, AppState, Build, BuildRequest, BuildState,
    CreateBindingRequest, CreateDeploymentRequest, Deployment, DeploymentStatus,
    DeploymentStatusValue, Destination, DestinationApp, Droplet, DropletState, InstanceState, Job,
    JobState, LastOperation, Metadata, NewDestination, OperationState, Package, PackageRequest,
    PackageState, Process, ProcessInstance, ProcessScale, ProcessUpdate, RelationshipData,
    Revision, ServiceCredentialBinding, V2Job, V2JobStatus, WEB_PROCESS,
};
use serde_json::{Map, Value};

use cfdeployer::archive::{ArchiveFetcher, ZipStream};
use cfdeployer::bits::BitsManager;
use cfdeployer::cloud::CloudController;
use cfdeployer::deploy::steps::Steps;
use cfdeployer::deploy::RunBinder;
use cfdeployer::errors::EngineError;
use cfdeployer::http::log_cache::RecentLogs;

#[derive(Default)]
pub struct State {
    next_id: u32,
    pub apps: BTreeMap<String, App>,
    env: HashMap<String, Map<String, Value>>,
    ssh: HashMap<String, bool>,
    pub metadata: HashMap<String, Metadata>,
    processes: HashMap<String, Process>,
    /// (app guid, package), newest first
    packages: Vec<(String, Package)>,
    builds: HashMap<String, Build>,
    /// (package guid, droplet), newest first
    droplets: Vec<(String, Droplet)>,
    pub current_droplet: HashMap<String, String>,
    pub destinations: HashMap<String, Vec<Destination>>,
    bindings: Vec<(String, String, ServiceCredentialBinding)>,
    pub deployments: Vec<Deployment>,
    revisions: HashMap<String, Vec<Revision>>,
    /// Build error reported by the next builds
    pub staging_error: Option<String>,
    /// Reason the next deployment is finalized with instead of `DEPLOYED`
    pub deployment_failure: Option<String>,
    /// Route whose inserted destinations never show up
    pub lost_route: Option<String>,
    /// State of binding jobs, complete when unset
    pub bind_job_state: Option<JobState>,
    /// Last operation description of new bindings, which then fail
    pub binding_failure: Option<String>,
    /// Instances of started apps crash
    pub crashing: bool,
    /// State packages settle in once their bits are in, ready when unset
    pub package_state: Option<PackageState>,
    /// Apps (guid, name) seen when each app was created
    pub names_at_create: Vec<Vec<(String, String)>>,
    pub uploads: Vec<(String, u64)>,
    pub calls: Vec<String>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn app(&self, guid: &str) -> Result<App, EngineError> {
        self.apps
            .get(guid)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("app {}", guid)))
    }

    fn app_of_process(&self, process_guid: &str) -> Option<String> {
        self.processes
            .iter()
            .find(|(_, p)| p.guid == process_guid)
            .map(|(app, _)| app.clone())
    }

    /// Existing app named `name`, started, with a staged droplet and a revision
    pub fn seed_running_app(&mut self, name: &str, space: &str) -> String {
        let guid = self.id("app");
        self.apps.insert(
            guid.clone(),
            App {
                guid: guid.clone(),
                name: name.to_string(),
                state: AppState::Started,
                relationships: cf_resources::AppRelationships {
                    space: cf_resources::Relationship::to(space),
                },
                ..Default::default()
            },
        );
        let process_guid = self.id("process");
        self.processes.insert(
            guid.clone(),
            Process {
                guid: process_guid,
                instances: 1,
                ..Default::default()
            },
        );
        let package_guid = self.id("package");
        self.packages.push((
            guid.clone(),
            Package {
                guid: package_guid.clone(),
                state: PackageState::Ready,
                ..Default::default()
            },
        ));
        let droplet_guid = self.id("droplet");
        self.droplets.push((
            package_guid,
            Droplet {
                guid: droplet_guid.clone(),
                state: DropletState::Staged,
                ..Default::default()
            },
        ));
        self.current_droplet.insert(guid.clone(), droplet_guid);
        let revision = self.id("revision");
        self.revisions.insert(
            guid.clone(),
            vec![Revision {
                guid: revision,
                version: 1,
                deployable: true,
                ..Default::default()
            }],
        );
        self.metadata.insert(
            guid.clone(),
            Metadata {
                labels: [("team".to_string(), Some("payments".to_string()))].into(),
                ..Default::default()
            },
        );
        guid
    }

    pub fn map_route(&mut self, route_guid: &str, app_guid: &str) {
        let guid = self.id("destination");
        self.destinations
            .entry(route_guid.to_string())
            .or_default()
            .push(Destination {
                guid,
                app: DestinationApp {
                    guid: app_guid.to_string(),
                    process: None,
                },
                port: Some(8080),
                protocol: None,
            });
    }

    pub fn app_names(&self) -> Vec<(String, String)> {
        self.apps
            .values()
            .map(|a| (a.guid.clone(), a.name.clone()))
            .collect()
    }
}

#[derive(Default, Clone)]
pub struct FakeCloud {
    pub state: Arc<Mutex<State>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Components wired on top of this platform
    pub fn steps(&self) -> Steps {
        let cloud: Arc<dyn CloudController> = Arc::new(self.clone());
        let bits = BitsManager::new(cloud.clone(), ArchiveFetcher::new(reqwest::Client::new()));
        let binder = Arc::new(RunBinder::new(cloud.clone(), Arc::new(FakeLogs)));
        Steps::new(cloud, bits, binder)
    }
}

pub struct FakeLogs;

#[async_trait]
impl RecentLogs for FakeLogs {
    async fn recent_logs(&self, _app_guid: &str) -> Result<String, EngineError> {
        Ok("2024-01-01T00:00:00.000+0000 [STG/0] ERR buildpack not found".to_string())
    }
}

#[async_trait]
impl CloudController for FakeCloud {
    async fn get_app(&self, guid: &str) -> Result<App, EngineError> {
        self.with(|s| s.app(guid))
    }

    async fn create_app(&self, request: &AppRequest) -> Result<App, EngineError> {
        let mut s = self.state.lock().unwrap();
        let names = s.app_names();
        s.names_at_create.push(names);
        let guid = s.id("app");
        let name = request.name.clone().unwrap_or_default();
        s.calls.push(format!("create_app {}", name));
        let app = App {
            guid: guid.clone(),
            name,
            state: AppState::Stopped,
            relationships: request.relationships.clone().unwrap_or_default(),
            lifecycle: request.lifecycle.clone().unwrap_or_default(),
            ..Default::default()
        };
        s.apps.insert(guid.clone(), app.clone());
        let process_guid = s.id("process");
        s.processes.insert(
            guid,
            Process {
                guid: process_guid,
                instances: 1,
                ..Default::default()
            },
        );
        Ok(app)
    }

    async fn update_app(&self, guid: &str, request: &AppRequest) -> Result<App, EngineError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!(
            "update_app {} {}",
            guid,
            request.name.clone().unwrap_or_default()
        ));
        let app = s
            .apps
            .get_mut(guid)
            .ok_or_else(|| EngineError::NotFound(format!("app {}", guid)))?;
        if let Some(name) = &request.name {
            app.name = name.clone();
        }
        if let Some(lifecycle) = &request.lifecycle {
            app.lifecycle = lifecycle.clone();
        }
        Ok(app.clone())
    }

    async fn delete_app(&self, guid: &str) -> Result<Option<String>, EngineError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("delete_app {}", guid));
        if s.apps.remove(guid).is_none() {
            return Err(EngineError::NotFound(format!("app {}", guid)));
        }
        for destinations in s.destinations.values_mut() {
            destinations.retain(|d| d.app.guid != guid);
        }
        Ok(Some(format!("https://api.example.com/v3/jobs/delete-{}", guid)))
    }

    async fn start_app(&self, guid: &str) -> Result<App, EngineError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("start_app {}", guid));
        let app = s
            .apps
            .get_mut(guid)
            .ok_or_else(|| EngineError::NotFound(format!("app {}", guid)))?;
        app.state = AppState::Started;
        Ok(app.clone())
    }

    async fn stop_app(&self, guid: &str) -> Result<App, EngineError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("stop_app {}", guid));
        let app = s
            .apps
            .get_mut(guid)
            .ok_or_else(|| EngineError::NotFound(format!("app {}", guid)))?;
        app.state = AppState::Stopped;
        Ok(app.clone())
    }

    async fn get_env_vars(&self, guid: &str) -> Result<Map<String, Value>, EngineError> {
        Ok(self.with(|s| s.env.get(guid).cloned().unwrap_or_default()))
    }

    async fn patch_env_vars(
        &self,
        guid: &str,
        vars: Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError> {
        self.record(format!("patch_env {}", guid));
        self.with(|s| {
            let env = s.env.entry(guid.to_string()).or_default();
            for (k, v) in vars {
                if v.is_null() {
                    env.remove(&k);
                } else {
                    env.insert(k, v);
                }
            }
            Ok(env.clone())
        })
    }

    async fn get_app_feature(&self, guid: &str, name: &str) -> Result<AppFeature, EngineError> {
        let enabled = self.with(|s| s.ssh.get(guid).copied().unwrap_or(true));
        Ok(AppFeature {
            name: name.to_string(),
            enabled,
            ..Default::default()
        })
    }

    async fn update_app_feature(
        &self,
        guid: &str,
        name: &str,
        enabled: bool,
    ) -> Result<AppFeature, EngineError> {
        self.with(|s| s.ssh.insert(guid.to_string(), enabled));
        Ok(AppFeature {
            name: name.to_string(),
            enabled,
            ..Default::default()
        })
    }

    async fn get_app_metadata(&self, guid: &str) -> Result<Metadata, EngineError> {
        Ok(self.with(|s| s.metadata.get(guid).cloned().unwrap_or_default()))
    }

    async fn update_app_metadata(&self, guid: &str, metadata: &Metadata) -> Result<(), EngineError> {
        self.record(format!("update_metadata {}", guid));
        self.with(|s| s.metadata.insert(guid.to_string(), metadata.clone()));
        Ok(())
    }

    async fn list_packages(
        &self,
        app_guid: &str,
        states: &[PackageState],
    ) -> Result<Vec<Package>, EngineError> {
        Ok(self.with(|s| {
            s.packages
                .iter()
                .filter(|(app, p)| app == app_guid && (states.is_empty() || states.contains(&p.state)))
                .map(|(_, p)| p.clone())
                .collect()
        }))
    }

    async fn create_package(&self, request: &PackageRequest) -> Result<Package, EngineError> {
        let app_guid = request
            .relationships
            .app
            .guid()
            .unwrap_or_default()
            .to_string();
        self.record(format!("create_package {}", app_guid));
        self.with(|s| {
            let package = Package {
                guid: s.id("package"),
                kind: request.kind,
                state: if request.data.is_some() {
                    s.package_state.unwrap_or(PackageState::Ready)
                } else {
                    PackageState::AwaitingUpload
                },
                data: request.data.clone().unwrap_or_default(),
                ..Default::default()
            };
            s.packages.insert(0, (app_guid, package.clone()));
            Ok(package)
        })
    }

    async fn get_package(&self, guid: &str) -> Result<Package, EngineError> {
        self.with(|s| {
            s.packages
                .iter()
                .find(|(_, p)| p.guid == guid)
                .map(|(_, p)| p.clone())
                .ok_or_else(|| EngineError::NotFound(format!("package {}", guid)))
        })
    }

    async fn upload_package_bits(
        &self,
        package_guid: &str,
        zip: ZipStream,
    ) -> Result<Package, EngineError> {
        self.record(format!("upload {}", package_guid));
        let size = zip.size();
        zip.close()?;
        self.with(|s| {
            s.uploads.push((package_guid.to_string(), size));
            let (_, package) = s
                .packages
                .iter_mut()
                .find(|(_, p)| p.guid == package_guid)
                .ok_or_else(|| EngineError::NotFound(format!("package {}", package_guid)))?;
            package.state = s.package_state.unwrap_or(PackageState::Ready);
            Ok(package.clone())
        })
    }

    async fn copy_package(
        &self,
        source_package_guid: &str,
        target_app_guid: &str,
    ) -> Result<Package, EngineError> {
        self.record(format!("copy_package {} {}", source_package_guid, target_app_guid));
        self.with(|s| {
            let package = Package {
                guid: s.id("package"),
                state: PackageState::Ready,
                ..Default::default()
            };
            s.packages
                .insert(0, (target_app_guid.to_string(), package.clone()));
            Ok(package)
        })
    }

    async fn create_build(&self, request: &BuildRequest) -> Result<Build, EngineError> {
        let package_guid = request.package.guid.clone();
        self.record(format!("create_build {}", package_guid));
        self.with(|s| {
            let guid = s.id("build");
            let build = match s.staging_error.clone() {
                Some(error) => Build {
                    guid: guid.clone(),
                    state: BuildState::Failed,
                    error: Some(error),
                    ..Default::default()
                },
                None => {
                    let droplet = Droplet {
                        guid: s.id("droplet"),
                        state: DropletState::Staged,
                        ..Default::default()
                    };
                    s.droplets.insert(0, (package_guid.clone(), droplet.clone()));
                    Build {
                        guid: guid.clone(),
                        state: BuildState::Staged,
                        package: Some(RelationshipData::new(package_guid)),
                        droplet: Some(RelationshipData::new(droplet.guid)),
                        ..Default::default()
                    }
                }
            };
            s.builds.insert(guid, build.clone());
            Ok(build)
        })
    }

    async fn get_build(&self, guid: &str) -> Result<Build, EngineError> {
        self.with(|s| {
            s.builds
                .get(guid)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("build {}", guid)))
        })
    }

    async fn get_droplet(&self, guid: &str) -> Result<Droplet, EngineError> {
        self.with(|s| {
            s.droplets
                .iter()
                .find(|(_, d)| d.guid == guid)
                .map(|(_, d)| d.clone())
                .ok_or_else(|| EngineError::NotFound(format!("droplet {}", guid)))
        })
    }

    async fn list_package_droplets(
        &self,
        package_guid: &str,
        states: &[DropletState],
    ) -> Result<Vec<Droplet>, EngineError> {
        Ok(self.with(|s| {
            s.droplets
                .iter()
                .filter(|(p, d)| p == package_guid && (states.is_empty() || states.contains(&d.state)))
                .map(|(_, d)| d.clone())
                .collect()
        }))
    }

    async fn get_current_droplet(&self, app_guid: &str) -> Result<Droplet, EngineError> {
        let guid = self.with(|s| s.current_droplet.get(app_guid).cloned());
        match guid {
            Some(guid) => self.get_droplet(&guid).await,
            None => Err(EngineError::NotFound(format!("current droplet of {}", app_guid))),
        }
    }

    async fn set_current_droplet(&self, app_guid: &str, droplet_guid: &str) -> Result<(), EngineError> {
        self.record(format!("set_droplet {} {}", app_guid, droplet_guid));
        self.with(|s| {
            s.current_droplet
                .insert(app_guid.to_string(), droplet_guid.to_string())
        });
        Ok(())
    }

    async fn get_app_processes(&self, app_guid: &str) -> Result<Vec<Process>, EngineError> {
        Ok(self.with(|s| s.processes.get(app_guid).cloned().into_iter().collect()))
    }

    async fn get_app_process(&self, app_guid: &str, kind: &str) -> Result<Process, EngineError> {
        assert_eq!(kind, WEB_PROCESS);
        self.with(|s| {
            s.processes
                .get(app_guid)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("process of {}", app_guid)))
        })
    }

    async fn get_process_instances(
        &self,
        process_guid: &str,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        self.with(|s| {
            let app_guid = s
                .app_of_process(process_guid)
                .ok_or_else(|| EngineError::NotFound(format!("process {}", process_guid)))?;
            let started = s.apps.get(&app_guid).map(|a| a.state) == Some(AppState::Started);
            let instances = s.processes[&app_guid].instances;
            let state = match (started, s.crashing) {
                (true, true) => InstanceState::Crashed,
                (true, false) => InstanceState::Running,
                (false, _) => InstanceState::Down,
            };
            Ok((0..instances)
                .map(|index| ProcessInstance {
                    index,
                    state,
                    uptime: 0,
                    details: None,
                })
                .collect())
        })
    }

    async fn scale_process(
        &self,
        app_guid: &str,
        _kind: &str,
        scale: &ProcessScale,
    ) -> Result<Process, EngineError> {
        self.record(format!("scale {}", app_guid));
        self.with(|s| {
            let process = s
                .processes
                .get_mut(app_guid)
                .ok_or_else(|| EngineError::NotFound(format!("process of {}", app_guid)))?;
            if let Some(instances) = scale.instances {
                process.instances = instances;
            }
            if let Some(memory) = scale.memory_in_mb {
                process.memory_in_mb = memory;
            }
            if let Some(disk) = scale.disk_in_mb {
                process.disk_in_mb = disk;
            }
            Ok(process.clone())
        })
    }

    async fn update_process(
        &self,
        process_guid: &str,
        update: &ProcessUpdate,
    ) -> Result<Process, EngineError> {
        self.with(|s| {
            let app_guid = s
                .app_of_process(process_guid)
                .ok_or_else(|| EngineError::NotFound(format!("process {}", process_guid)))?;
            let process = s.processes.get_mut(&app_guid).expect("process");
            if update.command.is_some() {
                process.command = update.command.clone();
            }
            if update.health_check.is_some() {
                process.health_check = update.health_check.clone();
            }
            Ok(process.clone())
        })
    }

    async fn list_route_destinations(&self, route_guid: &str) -> Result<Vec<Destination>, EngineError> {
        Ok(self.with(|s| s.destinations.get(route_guid).cloned().unwrap_or_default()))
    }

    async fn insert_route_destinations(
        &self,
        route_guid: &str,
        destinations: Vec<NewDestination>,
    ) -> Result<Vec<Destination>, EngineError> {
        self.record(format!("map_route {}", route_guid));
        self.with(|s| {
            if s.lost_route.as_deref() == Some(route_guid) {
                return Ok(s.destinations.get(route_guid).cloned().unwrap_or_default());
            }
            for new in destinations {
                let guid = s.id("destination");
                s.destinations
                    .entry(route_guid.to_string())
                    .or_default()
                    .push(Destination {
                        guid,
                        app: new.app,
                        port: new.port.or(Some(8080)),
                        protocol: None,
                    });
            }
            Ok(s.destinations[route_guid].clone())
        })
    }

    async fn list_bindings(
        &self,
        app_guid: &str,
        service_instance_guid: &str,
    ) -> Result<Vec<ServiceCredentialBinding>, EngineError> {
        Ok(self.with(|s| {
            s.bindings
                .iter()
                .filter(|(a, si, _)| a == app_guid && si == service_instance_guid)
                .map(|(_, _, b)| b.clone())
                .collect()
        }))
    }

    async fn create_binding(
        &self,
        request: &CreateBindingRequest,
    ) -> Result<Option<String>, EngineError> {
        let app = request.relationships.app.guid().unwrap_or_default().to_string();
        let si = request
            .relationships
            .service_instance
            .guid()
            .unwrap_or_default()
            .to_string();
        self.record(format!("bind {} {}", app, si));
        let guid = self.with(|s| {
            let guid = s.id("binding");
            let (state, description) = match s.binding_failure.clone() {
                Some(reason) => (OperationState::Failed, Some(reason)),
                None => (OperationState::Succeeded, None),
            };
            let binding = ServiceCredentialBinding {
                guid: guid.clone(),
                name: request.name.clone(),
                kind: "app".to_string(),
                last_operation: Some(LastOperation {
                    kind: "create".to_string(),
                    state,
                    description,
                }),
                relationships: request.relationships.clone(),
            };
            s.bindings.push((app, si, binding));
            guid
        });
        Ok(Some(format!("https://api.example.com/v3/jobs/bind-{}", guid)))
    }

    async fn get_job(&self, url: &str) -> Result<Job, EngineError> {
        let guid = url.rsplit('/').next().unwrap_or_default().to_string();
        let state = if guid.starts_with("bind-") {
            self.with(|s| s.bind_job_state.unwrap_or(JobState::Complete))
        } else {
            JobState::Complete
        };
        Ok(Job {
            guid,
            state,
            ..Default::default()
        })
    }

    async fn get_v2_job(&self, url: &str) -> Result<V2Job, EngineError> {
        Ok(V2Job {
            guid: url.to_string(),
            status: V2JobStatus::Finished,
            error_details: None,
        })
    }

    async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<Deployment, EngineError> {
        let app_guid = request
            .relationships
            .app
            .guid()
            .unwrap_or_default()
            .to_string();
        self.with(|s| {
            let reason = s
                .deployment_failure
                .take()
                .unwrap_or_else(|| DeploymentStatus::DEPLOYED.to_string());
            let deployed = reason == DeploymentStatus::DEPLOYED;
            let deployment = Deployment {
                guid: s.id("deployment"),
                status: DeploymentStatus {
                    value: DeploymentStatusValue::Finalized,
                    reason: Some(reason),
                },
                droplet: request.droplet.clone(),
                revision: request.revision.clone(),
                relationships: request.relationships.clone(),
            };
            s.calls.push(format!(
                "deploy {} {}",
                app_guid,
                request
                    .droplet
                    .as_ref()
                    .or(request.revision.as_ref())
                    .map(|r| r.guid.as_str())
                    .unwrap_or_default()
            ));
            if deployed {
                if let Some(app) = s.apps.get_mut(&app_guid) {
                    app.state = AppState::Started;
                }
                let revision = s.id("revision");
                s.revisions.entry(app_guid).or_default().insert(
                    0,
                    Revision {
                        guid: revision,
                        deployable: true,
                        ..Default::default()
                    },
                );
            }
            s.deployments.push(deployment.clone());
            Ok(deployment)
        })
    }

    async fn get_deployment(&self, guid: &str) -> Result<Deployment, EngineError> {
        self.with(|s| {
            s.deployments
                .iter()
                .find(|d| d.guid == guid)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("deployment {}", guid)))
        })
    }

    async fn list_deployed_revisions(&self, app_guid: &str) -> Result<Vec<Revision>, EngineError> {
        Ok(self.with(|s| s.revisions.get(app_guid).cloned().unwrap_or_default()))
    }

    async fn upload_app_bits(&self, app_guid: &str, zip: ZipStream) -> Result<(), EngineError> {
        self.record(format!("upload_app {}", app_guid));
        zip.close()
    }

    async fn upload_buildpack_bits(&self, buildpack_guid: &str, zip: ZipStream) -> Result<(), EngineError> {
        self.record(format!("upload_buildpack {} {}", buildpack_guid, zip.name()));
        zip.close()
    }

    async fn copy_app_bits(
        &self,
        source_app_guid: &str,
        target_app_guid: &str,
    ) -> Result<V2Job, EngineError> {
        self.record(format!("copy_bits {} {}", source_app_guid, target_app_guid));
        Ok(V2Job {
            guid: "copy".to_string(),
            status: V2JobStatus::Running,
            error_details: None,
        })
    }
}
