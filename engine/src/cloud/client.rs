use async_trait::async_trait;
use cf_resources::{
    App, AppFeature, AppRequest, Build, BuildRequest, CreateBindingRequest,
    CreateDeploymentRequest, Deployment, Destination, DestinationList, Droplet, DropletState,
    EnvVars, InsertDestinations, Job, Metadata, MetadataRequest, NewDestination,
    OrganizationQuota, Package, PackageCopyRequest, PackageRelationships, PackageRequest,
    PackageState, Process, ProcessInstance, ProcessScale, ProcessStats, ProcessUpdate,
    Relationship, Revision, ServiceCredentialBinding, V2Job, V2Resource,
};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::CloudController;
use crate::archive::ZipStream;
use crate::bits::multipart::{join_producer, MultipartUpload};
use crate::errors::EngineError;
use crate::http::client::{status_error, ApiClient};
use crate::http::connection::{ApiResponse, RequestBody};

/// Cloud controller client over the v2 and v3 APIs
#[derive(Clone)]
pub struct CloudClient {
    api: ApiClient,
}

fn joined_states<S>(states: &[S], as_str: impl Fn(&S) -> &'static str) -> String {
    states.iter().map(as_str).collect::<Vec<_>>().join(",")
}

impl CloudClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn app_action(&self, guid: &str, action: &str) -> Result<App, EngineError> {
        let url = self.api.url(&format!("/v3/apps/{}/actions/{}", guid, action))?;
        self.api
            .send(self.api.request(Method::POST, url))
            .await?
            .json()
    }

    async fn upload(
        &self,
        method: Method,
        path: &str,
        upload: MultipartUpload,
    ) -> Result<ApiResponse, EngineError> {
        let url = self.api.url(path)?;
        let content_type = HeaderValue::from_str(&upload.content_type())
            .map_err(|e| EngineError::Internal(format!("invalid multipart content type: {}", e)))?;
        let length = upload.content_length();
        debug!("Uploading {} bytes to {}", length, path);

        let (body, producer) = upload.into_body();
        let mut request = self.api.request(method, url);
        request.headers.insert(CONTENT_TYPE, content_type);
        request.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        request.body = RequestBody::stream(body);

        let sent = self.api.send(request).await;
        let produced = join_producer(producer).await;
        let response = sent?;
        produced?;
        Ok(response)
    }

    async fn patch_json<T: serde::de::DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, EngineError> {
        self.api.patch(self.api.url(path)?, body).await
    }

    /// Organization quota named `name`, used as the default quota of created organizations
    pub async fn find_organization_quota(&self, name: &str) -> Result<OrganizationQuota, EngineError> {
        let url = self
            .api
            .url_with_query("/v3/organization_quotas", &[("names", name)])?;
        self.api
            .list_first(url)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Can't found default quota '{}'", name)))
    }
}

#[async_trait]
impl CloudController for CloudClient {
    async fn get_app(&self, guid: &str) -> Result<App, EngineError> {
        self.api.get(self.api.url(&format!("/v3/apps/{}", guid))?).await
    }

    async fn create_app(&self, request: &AppRequest) -> Result<App, EngineError> {
        self.api.post(self.api.url("/v3/apps")?, request).await
    }

    async fn update_app(&self, guid: &str, request: &AppRequest) -> Result<App, EngineError> {
        self.patch_json(&format!("/v3/apps/{}", guid), request).await
    }

    async fn delete_app(&self, guid: &str) -> Result<Option<String>, EngineError> {
        self.api.delete(self.api.url(&format!("/v3/apps/{}", guid))?).await
    }

    async fn start_app(&self, guid: &str) -> Result<App, EngineError> {
        self.app_action(guid, "start").await
    }

    async fn stop_app(&self, guid: &str) -> Result<App, EngineError> {
        self.app_action(guid, "stop").await
    }

    async fn get_env_vars(&self, guid: &str) -> Result<Map<String, Value>, EngineError> {
        let url = self
            .api
            .url(&format!("/v3/apps/{}/environment_variables", guid))?;
        let vars: EnvVars = self.api.get(url).await?;
        Ok(vars.var)
    }

    async fn patch_env_vars(
        &self,
        guid: &str,
        vars: Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError> {
        let vars: EnvVars = self
            .patch_json(
                &format!("/v3/apps/{}/environment_variables", guid),
                &EnvVars { var: vars },
            )
            .await?;
        Ok(vars.var)
    }

    async fn get_app_feature(&self, guid: &str, name: &str) -> Result<AppFeature, EngineError> {
        let url = self.api.url(&format!("/v3/apps/{}/features/{}", guid, name))?;
        self.api.get(url).await
    }

    async fn update_app_feature(
        &self,
        guid: &str,
        name: &str,
        enabled: bool,
    ) -> Result<AppFeature, EngineError> {
        self.patch_json(
            &format!("/v3/apps/{}/features/{}", guid, name),
            &json!({ "enabled": enabled }),
        )
        .await
    }

    async fn get_app_metadata(&self, guid: &str) -> Result<Metadata, EngineError> {
        match self.get_app(guid).await {
            Ok(app) => Ok(app.metadata),
            Err(e) if e.is_not_found() => Ok(Metadata::default()),
            Err(e) => Err(e),
        }
    }

    async fn update_app_metadata(&self, guid: &str, metadata: &Metadata) -> Result<(), EngineError> {
        if metadata.is_empty() {
            return Ok(());
        }
        let url = self.api.url(&format!("/v3/apps/{}", guid))?;
        let request = self.api.request(Method::PATCH, url).json(&MetadataRequest {
            metadata: metadata.clone(),
        })?;
        let response = self.api.send_unchecked(request).await?;
        match response.status {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(status_error(&response)),
        }
    }

    async fn list_packages(
        &self,
        app_guid: &str,
        states: &[PackageState],
    ) -> Result<Vec<Package>, EngineError> {
        let states = joined_states(states, PackageState::as_str);
        let mut query = vec![("order_by", "-created_at")];
        if !states.is_empty() {
            query.push(("states", states.as_str()));
        }
        let url = self
            .api
            .url_with_query(&format!("/v3/apps/{}/packages", app_guid), &query)?;
        self.api.list_all(url).await
    }

    async fn create_package(&self, request: &PackageRequest) -> Result<Package, EngineError> {
        self.api.post(self.api.url("/v3/packages")?, request).await
    }

    async fn get_package(&self, guid: &str) -> Result<Package, EngineError> {
        self.api
            .get(self.api.url(&format!("/v3/packages/{}", guid))?)
            .await
    }

    async fn upload_package_bits(
        &self,
        package_guid: &str,
        zip: ZipStream,
    ) -> Result<Package, EngineError> {
        let upload = MultipartUpload::new(&[("resources", "[]")], "bits", "application.zip", zip);
        self.upload(
            Method::POST,
            &format!("/v3/packages/{}/upload", package_guid),
            upload,
        )
        .await?
        .json()
    }

    async fn copy_package(
        &self,
        source_package_guid: &str,
        target_app_guid: &str,
    ) -> Result<Package, EngineError> {
        let url = self
            .api
            .url_with_query("/v3/packages", &[("source_guid", source_package_guid)])?;
        let body = PackageCopyRequest {
            relationships: PackageRelationships {
                app: Relationship::to(target_app_guid),
            },
        };
        self.api.post(url, &body).await
    }

    async fn create_build(&self, request: &BuildRequest) -> Result<Build, EngineError> {
        self.api.post(self.api.url("/v3/builds")?, request).await
    }

    async fn get_build(&self, guid: &str) -> Result<Build, EngineError> {
        self.api
            .get(self.api.url(&format!("/v3/builds/{}", guid))?)
            .await
    }

    async fn get_droplet(&self, guid: &str) -> Result<Droplet, EngineError> {
        self.api
            .get(self.api.url(&format!("/v3/droplets/{}", guid))?)
            .await
    }

    async fn list_package_droplets(
        &self,
        package_guid: &str,
        states: &[DropletState],
    ) -> Result<Vec<Droplet>, EngineError> {
        let states = joined_states(states, DropletState::as_str);
        let mut query = vec![("order_by", "-created_at")];
        if !states.is_empty() {
            query.push(("states", states.as_str()));
        }
        let url = self
            .api
            .url_with_query(&format!("/v3/packages/{}/droplets", package_guid), &query)?;
        self.api.list_all(url).await
    }

    async fn get_current_droplet(&self, app_guid: &str) -> Result<Droplet, EngineError> {
        let url = self
            .api
            .url(&format!("/v3/apps/{}/droplets/current", app_guid))?;
        self.api.get(url).await
    }

    async fn set_current_droplet(
        &self,
        app_guid: &str,
        droplet_guid: &str,
    ) -> Result<(), EngineError> {
        let _: Relationship = self
            .patch_json(
                &format!("/v3/apps/{}/relationships/current_droplet", app_guid),
                &Relationship::to(droplet_guid),
            )
            .await?;
        Ok(())
    }

    async fn get_app_processes(&self, app_guid: &str) -> Result<Vec<Process>, EngineError> {
        let url = self.api.url(&format!("/v3/apps/{}/processes", app_guid))?;
        self.api.list_all(url).await
    }

    async fn get_app_process(&self, app_guid: &str, kind: &str) -> Result<Process, EngineError> {
        let url = self
            .api
            .url(&format!("/v3/apps/{}/processes/{}", app_guid, kind))?;
        self.api.get(url).await
    }

    async fn get_process_instances(
        &self,
        process_guid: &str,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        let url = self
            .api
            .url(&format!("/v3/processes/{}/stats", process_guid))?;
        let stats: ProcessStats = self.api.get(url).await?;
        Ok(stats.resources)
    }

    async fn scale_process(
        &self,
        app_guid: &str,
        kind: &str,
        scale: &ProcessScale,
    ) -> Result<Process, EngineError> {
        let url = self.api.url(&format!(
            "/v3/apps/{}/processes/{}/actions/scale",
            app_guid, kind
        ))?;
        self.api.post(url, scale).await
    }

    async fn update_process(
        &self,
        process_guid: &str,
        update: &ProcessUpdate,
    ) -> Result<Process, EngineError> {
        self.patch_json(&format!("/v3/processes/{}", process_guid), update)
            .await
    }

    async fn list_route_destinations(
        &self,
        route_guid: &str,
    ) -> Result<Vec<Destination>, EngineError> {
        let url = self
            .api
            .url(&format!("/v3/routes/{}/destinations", route_guid))?;
        let list: DestinationList = self.api.get(url).await?;
        Ok(list.destinations)
    }

    async fn insert_route_destinations(
        &self,
        route_guid: &str,
        destinations: Vec<NewDestination>,
    ) -> Result<Vec<Destination>, EngineError> {
        let url = self
            .api
            .url(&format!("/v3/routes/{}/destinations", route_guid))?;
        let list: DestinationList = self
            .api
            .post(url, &InsertDestinations { destinations })
            .await?;
        Ok(list.destinations)
    }

    async fn list_bindings(
        &self,
        app_guid: &str,
        service_instance_guid: &str,
    ) -> Result<Vec<ServiceCredentialBinding>, EngineError> {
        let url = self.api.url_with_query(
            "/v3/service_credential_bindings",
            &[
                ("type", "app"),
                ("app_guids", app_guid),
                ("service_instance_guids", service_instance_guid),
            ],
        )?;
        self.api.list_all(url).await
    }

    async fn create_binding(
        &self,
        request: &CreateBindingRequest,
    ) -> Result<Option<String>, EngineError> {
        let url = self.api.url("/v3/service_credential_bindings")?;
        Ok(self.api.post_raw(url, request).await?.location())
    }

    async fn get_job(&self, url: &str) -> Result<Job, EngineError> {
        self.api.get(self.api.url(url)?).await
    }

    async fn get_v2_job(&self, url: &str) -> Result<V2Job, EngineError> {
        let resource: V2Resource<V2Job> = self.api.get(self.api.url(url)?).await?;
        let mut job = resource.entity;
        if job.guid.is_empty() {
            job.guid = resource.metadata.guid;
        }
        Ok(job)
    }

    async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<Deployment, EngineError> {
        self.api.post(self.api.url("/v3/deployments")?, request).await
    }

    async fn get_deployment(&self, guid: &str) -> Result<Deployment, EngineError> {
        self.api
            .get(self.api.url(&format!("/v3/deployments/{}", guid))?)
            .await
    }

    async fn list_deployed_revisions(&self, app_guid: &str) -> Result<Vec<Revision>, EngineError> {
        let url = self.api.url_with_query(
            &format!("/v3/apps/{}/revisions/deployed", app_guid),
            &[("order_by", "-created_at")],
        )?;
        self.api.list_all(url).await
    }

    async fn upload_app_bits(&self, app_guid: &str, zip: ZipStream) -> Result<(), EngineError> {
        let upload =
            MultipartUpload::new(&[("resources", "[]")], "application", "application.zip", zip);
        self.upload(Method::PUT, &format!("/v2/apps/{}/bits", app_guid), upload)
            .await?;
        Ok(())
    }

    async fn upload_buildpack_bits(
        &self,
        buildpack_guid: &str,
        zip: ZipStream,
    ) -> Result<(), EngineError> {
        let mut filename = zip.name().to_string();
        if !filename.to_ascii_lowercase().ends_with(".zip") {
            filename.push_str(".zip");
        }
        let upload = MultipartUpload::new(&[], "buildpack", &filename, zip);
        self.upload(
            Method::PUT,
            &format!("/v2/buildpacks/{}/bits", buildpack_guid),
            upload,
        )
        .await?;
        Ok(())
    }

    async fn copy_app_bits(
        &self,
        source_app_guid: &str,
        target_app_guid: &str,
    ) -> Result<V2Job, EngineError> {
        let url = self
            .api
            .url(&format!("/v2/apps/{}/copy_bits", target_app_guid))?;
        let resource: V2Resource<V2Job> = self
            .api
            .post(url, &json!({ "source_app_guid": source_app_guid }))
            .await?;
        let mut job = resource.entity;
        if job.guid.is_empty() {
            job.guid = resource.metadata.guid;
        }
        Ok(job)
    }
}
