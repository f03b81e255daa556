//! Rolling strategy tests

use cf_resources::AppState;
use cfdeployer::deploy::models::AppDeploy;
use cfdeployer::deploy::{Rolling, Strategy};
use tokio_test::assert_ok;

use crate::fake::FakeCloud;
use crate::test_standard::{new_app, source_dir};

fn existing(fake: &FakeCloud) -> AppDeploy {
    let guid = fake.with(|s| s.seed_running_app("demo", "space-1"));
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.guid = guid;
    deploy
}

fn deploy_calls(fake: &FakeCloud) -> Vec<String> {
    fake.calls()
        .into_iter()
        .filter(|c| c.starts_with("deploy "))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_rolling_deploy_rolls_out_staged_droplet() {
    let fake = FakeCloud::new();
    let source = source_dir();

    let response = Rolling::new(fake.steps())
        .deploy(&new_app(&source))
        .await
        .unwrap();

    assert_eq!(response.app.state, AppState::Started);
    let guid = response.app.guid.clone();
    let droplet = fake.with(|s| {
        assert_eq!(s.deployments.len(), 1);
        s.deployments[0].droplet.clone().unwrap().guid
    });
    assert_eq!(deploy_calls(&fake), vec![format!("deploy {} {}", guid, droplet)]);
}

#[tokio::test(start_paused = true)]
async fn test_rolling_restart_redeploys_current_revision() {
    let fake = FakeCloud::new();
    let deploy = existing(&fake);

    assert_ok!(Rolling::new(fake.steps()).restart(&deploy).await);

    fake.with(|s| {
        assert_eq!(s.deployments.len(), 1);
        let revision = s.deployments[0].revision.clone().unwrap();
        assert!(revision.guid.starts_with("revision-"));
        assert!(s.deployments[0].droplet.is_none());
    });
    assert!(!fake.calls().iter().any(|c| c.starts_with("create_build")));
}

#[tokio::test(start_paused = true)]
async fn test_rolling_failed_restage_reverts_to_revision() {
    let fake = FakeCloud::new();
    let deploy = existing(&fake);
    fake.with(|s| s.deployment_failure = Some("CANCELED".to_string()));

    let failure = Rolling::new(fake.steps())
        .restage(&deploy)
        .await
        .unwrap_err();

    assert!(failure.error.to_string().contains("finalized with reason CANCELED"));
    assert_eq!(failure.response.app.state, AppState::Stopped);
    fake.with(|s| {
        assert_eq!(s.deployments.len(), 2);
        assert!(s.deployments[0].droplet.is_some());
        assert!(s.deployments[1].revision.is_some());
        assert!(s.deployments[1].status.is_deployed());
        assert!(s.apps.contains_key(&deploy.guid));
    });
}

#[tokio::test(start_paused = true)]
async fn test_rolling_stopped_app_gets_droplet_only() {
    let fake = FakeCloud::new();
    let mut deploy = existing(&fake);
    deploy.state = AppState::Stopped;

    let response = Rolling::new(fake.steps()).restage(&deploy).await.unwrap();

    assert_eq!(response.app.state, AppState::Stopped);
    fake.with(|s| {
        assert!(s.deployments.is_empty());
        assert_eq!(s.apps[&deploy.guid].state, AppState::Stopped);
    });
    assert!(fake
        .calls()
        .iter()
        .any(|c| c.starts_with(&format!("set_droplet {}", deploy.guid))));
}

#[tokio::test(start_paused = true)]
async fn test_rolling_update_keeps_app_running() {
    let fake = FakeCloud::new();
    let source = source_dir();
    let mut deploy = new_app(&source);
    deploy.guid = existing(&fake).guid;

    let response = Rolling::new(fake.steps()).deploy(&deploy).await.unwrap();

    assert_eq!(response.app.state, AppState::Started);
    assert!(!fake.calls().iter().any(|c| c.starts_with("stop_app")));
    assert_eq!(deploy_calls(&fake).len(), 1);
}
