//! Route, binding and start failures of a standard deployment

use std::time::Duration;

use cf_resources::{AppState, JobState, PackageData, PackageRequest, PackageState};
use cfdeployer::deploy::models::{AppDeploy, ServiceBinding};
use cfdeployer::deploy::{Standard, Strategy};
use cfdeployer::errors::{EngineError, TimeoutKind};

use crate::fake::FakeCloud;
use crate::test_standard::{new_app, source_dir};

fn with_binding(deploy: &mut AppDeploy, name: Option<&str>) {
    let mut binding = ServiceBinding::new("si-1");
    binding.name = name.map(str::to_string);
    deploy.bindings = vec![binding];
}

/// The failed deployment left nothing behind
fn assert_app_deleted(fake: &FakeCloud) {
    fake.with(|s| assert!(s.apps.is_empty()));
    assert!(fake.calls().iter().any(|c| c.starts_with("delete_app")));
}

#[tokio::test(start_paused = true)]
async fn test_route_never_mapped_fails() {
    let fake = FakeCloud::new();
    fake.with(|s| s.lost_route = Some("route-1".to_string()));
    let source = source_dir();

    let failure = Standard::new(fake.steps())
        .deploy(&new_app(&source))
        .await
        .unwrap_err();

    assert_eq!(failure.error.to_string(), "Failed to map route route-1");
    assert_eq!(failure.response.app.state, AppState::Stopped);
    assert!(fake.calls().contains(&"map_route route-1".to_string()));
    assert!(!fake.calls().iter().any(|c| c.starts_with("bind")));
    assert_app_deleted(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_binding_job_failure() {
    let fake = FakeCloud::new();
    fake.with(|s| s.bind_job_state = Some(JobState::Failed));
    let source = source_dir();
    let mut deploy = new_app(&source);
    with_binding(&mut deploy, Some("db"));

    let failure = Standard::new(fake.steps()).deploy(&deploy).await.unwrap_err();

    assert_eq!(
        failure.error.to_string(),
        "Binding db failed for app demo, reason: async job failed"
    );
    assert!(!fake.calls().iter().any(|c| c.starts_with("create_package")));
    assert_app_deleted(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_binding_last_operation_failure() {
    let fake = FakeCloud::new();
    fake.with(|s| s.binding_failure = Some("service broker rejected the binding".to_string()));
    let source = source_dir();
    let mut deploy = new_app(&source);
    with_binding(&mut deploy, None);

    let failure = Standard::new(fake.steps()).deploy(&deploy).await.unwrap_err();

    assert_eq!(
        failure.error.to_string(),
        "Binding si-1 failed for app demo, reason: service broker rejected the binding"
    );
    assert_app_deleted(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_binding_times_out() {
    let fake = FakeCloud::new();
    fake.with(|s| s.bind_job_state = Some(JobState::Processing));
    let source = source_dir();
    let mut deploy = new_app(&source);
    with_binding(&mut deploy, Some("db"));
    deploy.bind_timeout = Duration::from_secs(30);

    let failure = Standard::new(fake.steps()).deploy(&deploy).await.unwrap_err();

    assert!(matches!(failure.error, EngineError::Timeout(TimeoutKind::Bind)));
    assert_eq!(failure.error.to_string(), "Timeout reached waiting for bind");
    assert_app_deleted(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_existing_binding_is_kept() {
    let fake = FakeCloud::new();
    let source = source_dir();
    let mut deploy = new_app(&source);
    with_binding(&mut deploy, Some("db"));

    let first = Standard::new(fake.steps()).deploy(&deploy).await.unwrap();
    deploy.guid = first.app.guid.clone();
    let second = Standard::new(fake.steps()).deploy(&deploy).await.unwrap();

    assert_eq!(second.bindings.len(), 1);
    assert_eq!(first.bindings[0].guid, second.bindings[0].guid);
    let binds = fake.calls().iter().filter(|c| c.starts_with("bind ")).count();
    assert_eq!(binds, 1);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_instance_fails_start() {
    let fake = FakeCloud::new();
    fake.with(|s| s.crashing = true);
    let source = source_dir();

    let failure = Standard::new(fake.steps())
        .deploy(&new_app(&source))
        .await
        .unwrap_err();

    let message = failure.error.to_string();
    assert!(message.contains("Instance 0 failed with state CRASHED for app demo"));
    assert!(message.contains("buildpack not found"));
    assert!(matches!(failure.error.root_cause(), EngineError::AsyncFailure(_)));
    assert_eq!(failure.response.app.state, AppState::Stopped);
    assert_app_deleted(&fake);
}

#[tokio::test(start_paused = true)]
async fn test_zero_instances_start_without_waiting() {
    let fake = FakeCloud::new();
    // nothing would ever run, waiting could only time out
    fake.with(|s| s.crashing = true);
    let source = source_dir();
    let mut deploy = new_app(&source);
    deploy.process.instances = Some(0);

    let response = Standard::new(fake.steps()).deploy(&deploy).await.unwrap();

    assert_eq!(response.app.state, AppState::Started);
    assert_eq!(response.process.as_ref().map(|p| p.instances), Some(0));
    fake.with(|s| assert_eq!(s.apps[&response.app.guid].state, AppState::Started));
}

#[tokio::test(start_paused = true)]
async fn test_wait_staging_staged_droplet() {
    let fake = FakeCloud::new();
    let guid = fake.with(|s| s.seed_running_app("demo", "space-1"));
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.guid = guid;

    let steps = fake.steps();
    let result = steps
        .binder()
        .wait_staging(&deploy.app(), Duration::from_secs(60))
        .await;

    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_wait_staging_failed_package() {
    let fake = FakeCloud::new();
    let guid = fake.with(|s| {
        s.package_state = Some(PackageState::Failed);
        s.seed_running_app("demo", "space-1")
    });
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.guid = guid.clone();
    let steps = fake.steps();
    let data = PackageData {
        image: Some("nginx:1.27".to_string()),
        ..Default::default()
    };
    steps
        .cloud()
        .create_package(&PackageRequest::docker(&guid, data))
        .await
        .unwrap();

    let err = steps
        .binder()
        .wait_staging(&deploy.app(), Duration::from_secs(60))
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with(&format!("Staging failed for app {}", guid)));
    assert!(err.to_string().contains("buildpack not found"));
}
