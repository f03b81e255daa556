//! Token manager tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use http::{HeaderMap, StatusCode};
use secrecy::SecretString;
use tokio_test::{assert_err, assert_ok};
use url::Url;

use cfdeployer::authn::grant::{ClientCredentials, Grant};
use cfdeployer::authn::token_mngr::{TokenManager, TokenManagerExt};
use cfdeployer::authn::uaa::UaaClient;
use cfdeployer::errors::EngineError;
use cfdeployer::http::connection::{ApiRequest, ApiResponse, Connection};

/// Token endpoint handing out `t1`, `t2`, ... and recording the form bodies
struct FakeUaa {
    rotate_refresh: bool,
    bodies: Mutex<Vec<String>>,
}

impl FakeUaa {
    fn new(rotate_refresh: bool) -> Arc<Self> {
        Arc::new(Self {
            rotate_refresh,
            bodies: Mutex::new(Vec::new()),
        })
    }

    fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for FakeUaa {
    async fn make(&self, request: &mut ApiRequest) -> Result<ApiResponse, EngineError> {
        let body = String::from_utf8(request.body.as_bytes().unwrap().to_vec()).unwrap();
        let n = {
            let mut bodies = self.bodies.lock().unwrap();
            bodies.push(body);
            bodies.len()
        };
        // let concurrent callers pile up on the refresh lock
        tokio::task::yield_now().await;
        let payload = if self.rotate_refresh {
            format!(r#"{{"access_token": "t{n}", "refresh_token": "r{n}"}}"#)
        } else {
            format!(r#"{{"access_token": "t{n}"}}"#)
        };
        Ok(ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(payload),
        })
    }
}

async fn login(uaa: &Arc<FakeUaa>, grant: Grant) -> Result<TokenManager, EngineError> {
    let client = UaaClient::new(uaa.clone(), &Url::parse("https://uaa.example.com").unwrap())?;
    TokenManager::login(client, ClientCredentials::cf_cli(), Some(grant), None).await
}

#[tokio::test]
async fn test_concurrent_refresh_hits_uaa_once() {
    let uaa = FakeUaa::new(false);
    let tokens = Arc::new(login(&uaa, Grant::ClientCredentials).await.unwrap());
    assert_eq!(tokens.authorization().await.unwrap(), "bearer t1");

    let refreshes = (0..8).map(|_| {
        let tokens = tokens.clone();
        async move { tokens.refresh_token("bearer t1").await }
    });
    let results = join_all(refreshes).await;

    for result in results {
        assert_eq!(assert_ok!(result), "bearer t2");
    }
    assert_eq!(uaa.bodies().len(), 2);
}

#[tokio::test]
async fn test_refresh_prefers_refresh_token() {
    let uaa = FakeUaa::new(true);
    let tokens = login(
        &uaa,
        Grant::Password {
            username: "admin".to_string(),
            password: SecretString::from("secret".to_string()),
            origin: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(tokens.refresh_token("bearer t1").await.unwrap(), "bearer t2");

    let bodies = uaa.bodies();
    assert!(bodies[0].starts_with("grant_type=password"));
    assert_eq!(bodies[1], "grant_type=refresh_token&refresh_token=r1");
}

#[tokio::test]
async fn test_passcode_is_not_replayed() {
    let uaa = FakeUaa::new(false);
    let tokens = login(
        &uaa,
        Grant::Passcode {
            passcode: SecretString::from("abc123".to_string()),
        },
    )
    .await
    .unwrap();

    let err = assert_err!(tokens.refresh_token("bearer t1").await);

    match err {
        EngineError::Auth { grant, message } => {
            assert_eq!(grant, "passcode");
            assert!(message.contains("cannot be replayed"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(uaa.bodies().len(), 1);
}

#[tokio::test]
async fn test_stale_value_from_older_token_returns_current() {
    let uaa = FakeUaa::new(false);
    let tokens = login(&uaa, Grant::ClientCredentials).await.unwrap();

    assert_eq!(tokens.refresh_token("bearer t0").await.unwrap(), "bearer t1");
    assert_eq!(uaa.bodies().len(), 1);
}
