//! Deployment intent and observed result

use std::time::Duration;

use cf_resources::{
    App, AppRelationships, AppRequest, AppState, HealthCheck, Lifecycle, Package, Process,
    ProcessScale, ProcessUpdate, Relationship, ServiceCredentialBinding,
};
use serde_json::{Map, Value};

use crate::errors::EngineError;

pub const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const VENERABLE_SUFFIX: &str = "-venerable";

/// Name the previous application carries during a blue-green cutover
pub fn venerable_name(name: &str) -> String {
    format!("{}{}", name, VENERABLE_SUFFIX)
}

/// Route the application must be a destination of
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMapping {
    pub route_guid: String,

    /// Application port, platform default when unset
    pub port: Option<u16>,

    /// Destination identifier, assigned once mapped
    pub destination_guid: String,
}

impl RouteMapping {
    pub fn new(route_guid: impl Into<String>) -> Self {
        Self {
            route_guid: route_guid.into(),
            ..Default::default()
        }
    }
}

/// Service instance the application must be bound to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceBinding {
    pub service_instance_guid: String,
    pub name: Option<String>,
    pub parameters: Option<Map<String, Value>>,
}

impl ServiceBinding {
    pub fn new(service_instance_guid: impl Into<String>) -> Self {
        Self {
            service_instance_guid: service_instance_guid.into(),
            ..Default::default()
        }
    }
}

/// Desired web process configuration. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub instances: Option<u32>,
    pub memory_in_mb: Option<u64>,
    pub disk_in_mb: Option<u64>,
    pub command: Option<String>,
    pub health_check: Option<HealthCheck>,
}

impl ProcessSpec {
    /// Scale request. Zero memory and disk mean "platform default" and are not sent.
    pub fn scale(&self) -> ProcessScale {
        ProcessScale {
            instances: self.instances,
            memory_in_mb: self.memory_in_mb.filter(|m| *m > 0),
            disk_in_mb: self.disk_in_mb.filter(|d| *d > 0),
        }
    }

    pub fn update(&self) -> ProcessUpdate {
        ProcessUpdate {
            command: self.command.clone(),
            health_check: self.health_check.clone(),
        }
    }
}

/// Container image source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerImage {
    pub image: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Deployment intent for one application
#[derive(Debug, Clone)]
pub struct AppDeploy {
    /// Identifier of the existing application, empty for a new one
    pub guid: String,
    pub name: String,
    pub space_guid: String,
    pub state: AppState,

    pub buildpacks: Vec<String>,
    pub stack: Option<String>,
    pub process: ProcessSpec,

    /// Explicit ssh toggle, left untouched when unset
    pub enable_ssh: Option<bool>,

    /// Local path, URL or git URL of the bits
    pub path: String,
    pub docker: Option<DockerImage>,

    pub env: Map<String, Value>,
    pub routes: Vec<RouteMapping>,
    pub bindings: Vec<ServiceBinding>,

    pub bind_timeout: Duration,
    pub stage_timeout: Duration,
    pub start_timeout: Duration,
}

impl AppDeploy {
    pub fn new(name: impl Into<String>, space_guid: impl Into<String>) -> Self {
        Self {
            guid: String::new(),
            name: name.into(),
            space_guid: space_guid.into(),
            state: AppState::Started,
            buildpacks: Vec::new(),
            stack: None,
            process: ProcessSpec::default(),
            enable_ssh: None,
            path: String::new(),
            docker: None,
            env: Map::new(),
            routes: Vec::new(),
            bindings: Vec::new(),
            bind_timeout: DEFAULT_BIND_TIMEOUT,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            start_timeout: DEFAULT_START_TIMEOUT,
        }
    }

    pub fn is_docker(&self) -> bool {
        self.docker.as_ref().is_some_and(|d| !d.image.is_empty())
    }

    pub fn is_new(&self) -> bool {
        self.guid.is_empty()
    }

    pub fn wants_started(&self) -> bool {
        self.state == AppState::Started
    }

    /// Check the intent before anything is sent to the platform
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("application name is empty".to_string()));
        }
        if self.is_new() && self.space_guid.is_empty() {
            return Err(EngineError::Validation(format!(
                "space is required to create application {}",
                self.name
            )));
        }
        if let Some(docker) = &self.docker {
            if docker.image.is_empty() {
                return Err(EngineError::Validation(format!(
                    "docker image of application {} is empty",
                    self.name
                )));
            }
            if !self.path.is_empty() {
                return Err(EngineError::Validation(format!(
                    "application {} sets both a docker image and a path",
                    self.name
                )));
            }
        } else if self.is_new() && self.path.is_empty() {
            return Err(EngineError::Validation(format!(
                "path is required to create buildpack application {}",
                self.name
            )));
        }
        for (name, timeout) in [
            ("bind", self.bind_timeout),
            ("stage", self.stage_timeout),
            ("start", self.start_timeout),
        ] {
            if timeout.is_zero() {
                return Err(EngineError::Validation(format!("{} timeout must be positive", name)));
            }
        }
        Ok(())
    }

    /// Lifecycle to send, if any. A buildpack lifecycle is only sent when buildpacks are named.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        if self.is_docker() {
            return Some(Lifecycle::docker());
        }
        let buildpacks: Vec<String> = self
            .buildpacks
            .iter()
            .filter(|b| !b.is_empty())
            .cloned()
            .collect();
        if buildpacks.is_empty() {
            return None;
        }
        Some(Lifecycle::buildpack(buildpacks, self.stack.clone()))
    }

    /// Create body, or update body without the space when `update` is set
    pub fn app_request(&self, update: bool) -> AppRequest {
        AppRequest {
            name: Some(self.name.clone()),
            relationships: (!update).then(|| AppRelationships {
                space: Relationship::to(self.space_guid.clone()),
            }),
            lifecycle: self.lifecycle(),
            metadata: None,
        }
    }

    /// Same intent targeting a fresh application
    pub fn as_new_app(&self) -> Self {
        let mut deploy = self.clone();
        deploy.guid = String::new();
        for route in &mut deploy.routes {
            route.destination_guid.clear();
        }
        deploy
    }

    /// Application as known before any platform call
    pub fn app(&self) -> App {
        App {
            guid: self.guid.clone(),
            name: self.name.clone(),
            state: self.state,
            relationships: AppRelationships {
                space: Relationship::to(self.space_guid.clone()),
            },
            lifecycle: self.lifecycle().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Observed state after a deployment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppDeployResponse {
    pub app: App,
    pub process: Option<Process>,
    pub routes: Vec<RouteMapping>,
    pub bindings: Vec<ServiceCredentialBinding>,
    pub enable_ssh: Option<bool>,
    pub env: Map<String, Value>,
    pub package: Option<Package>,
}

impl AppDeployResponse {
    /// Response seeded from the intent, before anything was realized
    pub fn from_intent(deploy: &AppDeploy) -> Self {
        Self {
            app: deploy.app(),
            enable_ssh: deploy.enable_ssh,
            env: deploy.env.clone(),
            routes: deploy.routes.clone(),
            ..Default::default()
        }
    }

    pub fn app_guid(&self) -> &str {
        &self.app.guid
    }
}
