//! Blue-green strategy tests

use cf_resources::AppState;
use cfdeployer::deploy::models::AppDeploy;
use cfdeployer::deploy::{BlueGreen, Standard, Strategy};

use crate::fake::FakeCloud;
use crate::test_standard::{new_app, source_dir};

fn blue_green(fake: &FakeCloud) -> BlueGreen {
    let steps = fake.steps();
    BlueGreen::new(steps.clone(), Standard::new(steps))
}

/// Running app `demo` mapped to `route-1`
fn seed(fake: &FakeCloud) -> String {
    fake.with(|s| {
        let guid = s.seed_running_app("demo", "space-1");
        s.map_route("route-1", &guid);
        guid
    })
}

fn update_of(guid: &str, source: &tempfile::TempDir) -> AppDeploy {
    let mut deploy = new_app(source);
    deploy.guid = guid.to_string();
    deploy
}

#[tokio::test(start_paused = true)]
async fn test_blue_green_replaces_app() {
    let fake = FakeCloud::new();
    let old = seed(&fake);
    let source = source_dir();

    let response = blue_green(&fake)
        .deploy(&update_of(&old, &source))
        .await
        .unwrap();

    let new = response.app.guid.clone();
    assert_ne!(new, old);
    assert_eq!(response.app.state, AppState::Started);

    fake.with(|s| {
        // the old app was out of the way when the new one was created
        assert!(s.names_at_create[0].contains(&(old.clone(), "demo-venerable".to_string())));

        assert_eq!(s.app_names(), vec![(new.clone(), "demo".to_string())]);
        let destinations: Vec<&str> = s.destinations["route-1"]
            .iter()
            .map(|d| d.app.guid.as_str())
            .collect();
        assert_eq!(destinations, vec![new.as_str()]);
        assert_eq!(
            s.metadata[&new].labels.get("team"),
            Some(&Some("payments".to_string()))
        );
    });

    let calls = fake.calls();
    let stopped = calls.iter().position(|c| c == &format!("stop_app {}", old));
    let deleted = calls.iter().position(|c| c == &format!("delete_app {}", old));
    assert!(stopped.is_some() && deleted.is_some() && stopped < deleted);
}

#[tokio::test(start_paused = true)]
async fn test_blue_green_failure_restores_old_app() {
    let fake = FakeCloud::new();
    let old = seed(&fake);
    fake.with(|s| s.staging_error = Some("NoAppDetectedError".to_string()));
    let source = source_dir();

    let failure = blue_green(&fake)
        .deploy(&update_of(&old, &source))
        .await
        .unwrap_err();

    assert!(failure
        .error
        .to_string()
        .contains("Package staging failed: NoAppDetectedError"));
    assert_eq!(failure.response.app.state, AppState::Stopped);

    fake.with(|s| {
        assert_eq!(s.app_names(), vec![(old.clone(), "demo".to_string())]);
        assert_eq!(s.apps[&old].state, AppState::Started);
        assert_eq!(s.destinations["route-1"].len(), 1);
        assert_eq!(s.destinations["route-1"][0].app.guid, old);
    });
    let calls = fake.calls();
    assert!(!calls.contains(&format!("delete_app {}", old)));
    assert_eq!(calls.last(), Some(&format!("update_app {} demo", old)));
}

#[tokio::test(start_paused = true)]
async fn test_blue_green_new_app_uses_standard() {
    let fake = FakeCloud::new();
    let source = source_dir();

    let response = blue_green(&fake).deploy(&new_app(&source)).await.unwrap();

    assert_eq!(response.app.state, AppState::Started);
    assert!(!fake.calls().iter().any(|c| c.contains("venerable")));
    fake.with(|s| assert_eq!(s.names_at_create, vec![Vec::new()]));
}

#[tokio::test(start_paused = true)]
async fn test_blue_green_restage_copies_package() {
    let fake = FakeCloud::new();
    let old = seed(&fake);
    let mut deploy = AppDeploy::new("demo", "space-1");
    deploy.guid = old.clone();

    let response = blue_green(&fake).restage(&deploy).await.unwrap();

    let new = response.app.guid.clone();
    assert_ne!(new, old);
    assert_eq!(response.app.state, AppState::Started);
    assert!(fake
        .calls()
        .iter()
        .any(|c| c.starts_with("copy_package") && c.ends_with(&new)));
    fake.with(|s| {
        assert_eq!(s.app_names(), vec![(new.clone(), "demo".to_string())]);
        assert!(s.current_droplet.contains_key(&new));
    });
}
