//! Package creation and upload tests

use cf_resources::{AppState, PackageState};
use cfdeployer::deploy::models::DockerImage;
use cfdeployer::deploy::{Standard, Strategy};

use crate::fake::FakeCloud;
use crate::test_standard::{new_app, source_dir};

#[tokio::test(start_paused = true)]
async fn test_failed_package_processing() {
    let fake = FakeCloud::new();
    fake.with(|s| s.package_state = Some(PackageState::Failed));
    let source = source_dir();

    let failure = Standard::new(fake.steps())
        .deploy(&new_app(&source))
        .await
        .unwrap_err();

    assert_eq!(failure.error.to_string(), "Package processing failed");
    assert_eq!(failure.response.app.state, AppState::Stopped);
    fake.with(|s| {
        assert_eq!(s.uploads.len(), 1);
        assert!(s.apps.is_empty());
    });
    assert!(!fake.calls().iter().any(|c| c.starts_with("create_build")));
}

#[tokio::test(start_paused = true)]
async fn test_expired_package() {
    let fake = FakeCloud::new();
    fake.with(|s| s.package_state = Some(PackageState::Expired));
    let source = source_dir();

    let failure = Standard::new(fake.steps())
        .deploy(&new_app(&source))
        .await
        .unwrap_err();

    assert_eq!(failure.error.to_string(), "Package expired");
    fake.with(|s| assert!(s.apps.is_empty()));
    assert!(fake.calls().iter().any(|c| c.starts_with("delete_app")));
}

#[tokio::test(start_paused = true)]
async fn test_empty_path_uploads_nothing() {
    let fake = FakeCloud::new();
    let source = source_dir();
    let mut deploy = new_app(&source);
    deploy.path = String::new();
    deploy.state = AppState::Stopped;

    let response = Standard::new(fake.steps()).deploy(&deploy).await.unwrap();

    assert!(response.package.is_none());
    assert_eq!(response.app.state, AppState::Stopped);
    let calls = fake.calls();
    assert!(!calls.iter().any(|c| c.starts_with("create_package")));
    assert!(!calls.iter().any(|c| c.starts_with("upload")));
    fake.with(|s| assert!(s.uploads.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_expired_docker_package() {
    let fake = FakeCloud::new();
    fake.with(|s| s.package_state = Some(PackageState::Expired));
    let source = source_dir();
    let mut deploy = new_app(&source);
    deploy.path = String::new();
    deploy.docker = Some(DockerImage {
        image: "nginx:1.27".to_string(),
        ..Default::default()
    });

    let failure = Standard::new(fake.steps()).deploy(&deploy).await.unwrap_err();

    let message = failure.error.to_string();
    assert!(message.starts_with("Package package-"));
    assert!(message.ends_with(", state: EXPIRED"));
    assert!(fake.calls().iter().any(|c| c.starts_with("create_package")));
    fake.with(|s| {
        assert!(s.uploads.is_empty());
        assert!(s.apps.is_empty());
    });
}
