//! Session construction steps: transport, endpoint discovery, authentication

use std::sync::Arc;
use std::time::Duration;

use cf_resources::{Link, RootInfo};
use http::Method;
use secrecy::SecretString;
use tracing::{debug, info};
use url::Url;

use crate::authn::grant::{ClientCredentials, Grant};
use crate::authn::token_mngr::TokenManager;
use crate::authn::uaa::UaaClient;
use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::http::auth::AuthConnection;
use crate::http::client::ApiClient;
use crate::http::connection::{build_http_client, Connection, HttpConnection, TransportOptions};
use crate::http::logger::RequestLogger;
use crate::http::retry::{self, RetryConnection};
use crate::logs::LogLevel;
use crate::storage::settings::Settings;

/// Clients produced by [`connect`]
pub struct Clients {
    /// Pooled client without authentication, used for archive downloads
    pub http: reqwest::Client,
    /// Authenticated cloud controller client
    pub api: ApiClient,
    pub log_cache: ApiClient,
    pub routing: Option<ApiClient>,
    pub uaa_admin: Option<ApiClient>,
}

/// Unauthenticated chain: retry, then the optional request logger, then the wire
fn base_chain(http: &reqwest::Client, settings: &Settings) -> Arc<dyn Connection> {
    let mut conn: Arc<dyn Connection> = Arc::new(HttpConnection::new(http.clone()));
    let level = LogLevel::from_env().unwrap_or_else(|| settings.log_level.clone());
    if level.dumps_requests() {
        conn = Arc::new(RequestLogger::new(conn));
    }
    Arc::new(RetryConnection::new(
        conn,
        retry::Options {
            max_retries: settings.max_retries,
            ..Default::default()
        },
    ))
}

fn link_url(link: Option<&Link>) -> Option<Result<Url, EngineError>> {
    link.filter(|l| !l.href.is_empty())
        .map(|l| Url::parse(&l.href).map_err(EngineError::from))
}

/// Endpoint guessed from the API one by swapping the host prefix
fn sibling_endpoint(api: &Url, prefix: &str) -> Result<Url, EngineError> {
    let host = api
        .host_str()
        .ok_or_else(|| EngineError::Config(format!("api url {} has no host", api)))?;
    let domain = host.strip_prefix("api.").unwrap_or(host);
    Ok(Url::parse(&format!("{}://{}.{}", api.scheme(), prefix, domain))?)
}

/// Client identity and grant derived from the settings.
///
/// A passcode wins over user credentials, which win over client credentials. User
/// credentials without a client id use the public `cf` client.
pub fn select_grant(settings: &Settings) -> (ClientCredentials, Option<Grant>) {
    let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
    let client_id = present(&settings.cf_client_id);
    let client_secret = present(&settings.cf_client_secret).unwrap_or_default();

    let client = match &client_id {
        Some(id) => ClientCredentials::new(id.clone(), client_secret.clone()),
        None => ClientCredentials::cf_cli(),
    };

    if let Some(passcode) = present(&settings.sso_passcode) {
        return (
            client,
            Some(Grant::Passcode {
                passcode: SecretString::from(passcode),
            }),
        );
    }
    if let (Some(username), Some(password)) = (present(&settings.user), present(&settings.password)) {
        return (
            client,
            Some(Grant::Password {
                username,
                password: SecretString::from(password),
                origin: present(&settings.origin),
            }),
        );
    }
    if client_id.is_some() && !client_secret.is_empty() {
        return (client, Some(Grant::ClientCredentials));
    }
    (client, None)
}

/// Fetch the root document listing the platform endpoints
pub async fn discover(conn: Arc<dyn Connection>, api_url: &Url) -> Result<RootInfo, EngineError> {
    let api = ApiClient::new(conn, api_url.clone());
    let request = api.request(Method::GET, api.url("/")?);
    let root: RootInfo = api.send(request).await?.json()?;
    debug!("Discovered endpoints: {:?}", root.links);
    Ok(root)
}

/// Build the transport, discover the endpoints, log in and assemble the authenticated clients
pub async fn connect(settings: &Settings) -> Result<Clients, EngineError> {
    let http = build_http_client(&TransportOptions {
        skip_ssl_validation: settings.skip_ssl_validation,
        dial_timeout: Duration::from_secs(settings.dial_timeout_secs),
        keepalive: Duration::from_secs(settings.keepalive_secs),
        ..Default::default()
    })?;
    let base = base_chain(&http, settings);

    let api_url = Url::parse(&settings.api_url)?;
    let root = discover(base.clone(), &api_url).await?;

    let uaa_url = link_url(root.links.uaa.as_ref())
        .or_else(|| link_url(root.links.login.as_ref()))
        .ok_or_else(|| EngineError::Config("platform advertises no authorization endpoint".to_string()))??;

    let (client, grant) = select_grant(settings);
    let store = settings
        .store_tokens_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(File::new);
    let uaa = UaaClient::new(base.clone(), &uaa_url)?;
    let tokens = Arc::new(TokenManager::login(uaa, client, grant, store).await?);
    info!("Authenticated against {}", uaa_url);

    let authed: Arc<dyn Connection> = Arc::new(AuthConnection::new(base.clone(), tokens));

    let log_cache_url = match link_url(root.links.log_cache.as_ref()) {
        Some(url) => url?,
        None => sibling_endpoint(&api_url, "log-cache")?,
    };
    let routing = link_url(root.links.routing.as_ref())
        .transpose()?
        .map(|url| ApiClient::new(authed.clone(), url));

    let uaa_admin = match admin_credentials(settings) {
        Some(admin) => {
            let uaa = UaaClient::new(base.clone(), &uaa_url)?;
            let admin_tokens =
                Arc::new(TokenManager::login(uaa, admin, Some(Grant::ClientCredentials), None).await?);
            Some(ApiClient::new(
                Arc::new(AuthConnection::new(base, admin_tokens)),
                uaa_url,
            ))
        }
        None => None,
    };

    Ok(Clients {
        http,
        api: ApiClient::new(authed.clone(), api_url),
        log_cache: ApiClient::new(authed, log_cache_url),
        routing,
        uaa_admin,
    })
}

fn admin_credentials(settings: &Settings) -> Option<ClientCredentials> {
    let id = settings.uaa_client_id.as_deref().filter(|s| !s.is_empty())?;
    let secret = settings.uaa_client_secret.clone().unwrap_or_default();
    Some(ClientCredentials::new(id, secret))
}
