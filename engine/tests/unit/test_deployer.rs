//! Strategy dispatch tests

use cf_resources::AppState;
use cfdeployer::deploy::models::AppDeploy;
use cfdeployer::errors::EngineError;
use cfdeployer::session::build_deployer;

use crate::fake::FakeCloud;
use crate::test_standard::{new_app, source_dir};

#[test]
fn test_every_strategy_is_registered() {
    let deployer = build_deployer(FakeCloud::new().steps());

    let mut names = deployer.names();
    names.sort_unstable();
    assert_eq!(
        names,
        vec!["blue-green", "blue-green-v3", "default", "rolling", "standard", "v2"]
    );
    assert!(deployer.is_create_new_app("Blue-Green"));
    assert!(!deployer.is_create_new_app("rolling"));
    assert_eq!(deployer.strategy("canary").unwrap().names()[0], "standard");
}

#[tokio::test(start_paused = true)]
async fn test_invalid_intent_never_reaches_platform() {
    let fake = FakeCloud::new();
    let deployer = build_deployer(fake.steps());
    let deploy = AppDeploy::new("demo", "space-1");

    let failure = deployer.deploy("rolling", &deploy).await.unwrap_err();

    assert!(matches!(failure.error, EngineError::Validation(_)));
    assert_eq!(failure.response.app.name, "demo");
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_strategy_deploys_with_default() {
    let fake = FakeCloud::new();
    let source = source_dir();
    let deployer = build_deployer(fake.steps());

    let response = deployer.deploy("canary", &new_app(&source)).await.unwrap();

    assert_eq!(response.app.state, AppState::Started);
    assert!(fake.with(|s| s.deployments.is_empty()));
}
