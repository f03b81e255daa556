//! Standard strategy tests

use cf_resources::AppState;
use cfdeployer::deploy::models::{AppDeploy, ProcessSpec, RouteMapping};
use cfdeployer::deploy::{Standard, Strategy};
use cfdeployer::errors::EngineError;
use serde_json::json;
use tempfile::TempDir;

use crate::fake::FakeCloud;

pub fn source_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "demo\n").unwrap();
    dir
}

pub fn new_app(source: &TempDir) -> AppDeploy {
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.path = source.path().display().to_string();
    deploy.routes = vec![RouteMapping::new("route-1")];
    deploy.process = ProcessSpec {
        instances: Some(1),
        ..Default::default()
    };
    deploy.env.insert("GREETING".to_string(), json!("hello"));
    deploy
}

#[tokio::test(start_paused = true)]
async fn test_standard_deploy_creates_and_starts() {
    let fake = FakeCloud::new();
    let source = source_dir();
    let standard = Standard::new(fake.steps());

    let response = standard.deploy(&new_app(&source)).await.unwrap();

    assert_eq!(response.app.state, AppState::Started);
    assert_eq!(response.app.name, "demo");
    assert_eq!(response.env.get("GREETING"), Some(&json!("hello")));
    assert_eq!(response.enable_ssh, Some(true));
    assert_eq!(response.routes.len(), 1);
    assert!(!response.routes[0].destination_guid.is_empty());
    assert_eq!(response.process.as_ref().map(|p| p.instances), Some(1));

    let guid = response.app.guid.clone();
    fake.with(|s| {
        assert_eq!(s.apps[&guid].state, AppState::Started);
        assert!(s.current_droplet.contains_key(&guid));
        assert_eq!(s.destinations["route-1"][0].app.guid, guid);
        assert_eq!(s.uploads.len(), 1);
        assert!(s.uploads[0].1 > 0);
    });
}

#[tokio::test(start_paused = true)]
async fn test_standard_staging_failure_deletes_app() {
    let fake = FakeCloud::new();
    fake.with(|s| s.staging_error = Some("NoAppDetectedError".to_string()));
    let source = source_dir();
    let standard = Standard::new(fake.steps());

    let failure = standard.deploy(&new_app(&source)).await.unwrap_err();

    assert_eq!(failure.response.app.state, AppState::Stopped);
    let message = failure.error.to_string();
    assert!(message.contains("Package staging failed: NoAppDetectedError"));
    assert!(message.contains("buildpack not found"));
    assert!(matches!(failure.error.root_cause(), EngineError::AsyncFailure(_)));

    fake.with(|s| {
        assert!(s.apps.is_empty());
        assert!(s.destinations["route-1"].is_empty());
    });
    assert!(fake.calls().iter().any(|c| c.starts_with("delete_app")));
}

#[tokio::test(start_paused = true)]
async fn test_standard_deploy_stopped_leaves_app_stopped() {
    let fake = FakeCloud::new();
    let source = source_dir();
    let mut deploy = new_app(&source);
    deploy.state = AppState::Stopped;

    let response = Standard::new(fake.steps()).deploy(&deploy).await.unwrap();

    assert_eq!(response.app.state, AppState::Stopped);
    assert!(!fake.calls().iter().any(|c| c.starts_with("start_app")));
    assert!(!fake.calls().iter().any(|c| c.starts_with("create_build")));
}

#[tokio::test(start_paused = true)]
async fn test_standard_restage_stages_ready_package() {
    let fake = FakeCloud::new();
    let guid = fake.with(|s| s.seed_running_app("demo", "space-1"));
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.guid = guid.clone();

    let response = Standard::new(fake.steps()).restage(&deploy).await.unwrap();

    assert_eq!(response.app.state, AppState::Started);
    assert!(response.package.is_some());
    let calls = fake.calls();
    let stop = calls.iter().position(|c| c == &format!("stop_app {}", guid));
    let start = calls.iter().position(|c| c == &format!("start_app {}", guid));
    assert!(stop.is_some() && start.is_some() && stop < start);
    assert!(calls.iter().any(|c| c.starts_with("create_build")));
}

#[tokio::test(start_paused = true)]
async fn test_standard_restage_without_package_fails() {
    let fake = FakeCloud::new();
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.guid = "app-unknown".to_string();

    let failure = Standard::new(fake.steps()).restage(&deploy).await.unwrap_err();

    assert_eq!(failure.response.app.state, AppState::Stopped);
    assert_eq!(failure.error.to_string(), "No READY package found");
}

#[tokio::test(start_paused = true)]
async fn test_standard_update_stops_app_before_changes() {
    let fake = FakeCloud::new();
    let guid = fake.with(|s| s.seed_running_app("demo", "space-1"));
    let source = source_dir();
    let mut deploy = new_app(&source);
    deploy.guid = guid.clone();

    let response = Standard::new(fake.steps()).deploy(&deploy).await.unwrap();

    assert_eq!(response.app.guid, guid);
    assert_eq!(response.app.state, AppState::Started);
    let calls = fake.calls();
    let update = calls.iter().position(|c| c == &format!("update_app {} demo", guid));
    let stop = calls.iter().position(|c| c == &format!("stop_app {}", guid));
    let env = calls.iter().position(|c| c == &format!("patch_env {}", guid));
    assert!(update.is_some() && stop.is_some() && env.is_some());
    assert!(update < stop && stop < env);
}
