//! Backend client gateway
//!
//! A single handle to the hosted auth and data service. It is built once at
//! startup and handed to whatever needs backend access.

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::auth::{AuthSession, AuthUser};

/// Backend URL used when none is configured
pub const PLACEHOLDER_URL: &str = "https://placeholder.supabase.co";

/// Access key used when none is configured
pub const PLACEHOLDER_KEY: &str = "placeholder-anon-key";

/// Sessions closer than this to expiry are refreshed by `ensure_fresh`
const REFRESH_MARGIN_SECS: i64 = 60;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("Backend answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Where the gateway is running
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeContext {
    /// Interactive client that keeps sessions between runs
    Browser,
    /// Build or server-side rendering; nothing is persisted
    Server,
}

impl RuntimeContext {
    pub fn is_browser(self) -> bool {
        matches!(self, RuntimeContext::Browser)
    }
}

/// Read-only gateway configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GatewayConfig {
    pub url: String,
    #[serde(serialize_with = "serialize_masked")]
    pub key: String,
    pub persist_session: bool,
    pub auto_refresh_token: bool,
}

impl GatewayConfig {
    /// Resolve configuration from optional credentials.
    ///
    /// Returns the configuration and whether real credentials were used.
    pub fn resolve(url: Option<&str>, key: Option<&str>, context: RuntimeContext) -> (Self, bool) {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let key = key.map(str::trim).filter(|k| !k.is_empty());

        let (url, key, configured) = match (url, key) {
            (Some(url), Some(key)) if is_http_url(url) => (url, key, true),
            (Some(url), Some(_)) => {
                warn!("Backend URL {} is not a valid http(s) URL, using placeholder", url);
                (PLACEHOLDER_URL, PLACEHOLDER_KEY, false)
            }
            _ => {
                warn!("Backend URL or key missing, using placeholder configuration");
                (PLACEHOLDER_URL, PLACEHOLDER_KEY, false)
            }
        };

        let config = Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            persist_session: context.is_browser(),
            auto_refresh_token: context.is_browser(),
        };

        (config, configured)
    }
}

fn is_http_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    if secret.chars().count() <= 6 {
        "*".repeat(secret.chars().count())
    } else {
        format!("{visible}…")
    }
}

fn serialize_masked<S: serde::Serializer>(key: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mask(key))
}

/// Query for a table read
#[derive(Clone, Debug, Default)]
pub struct SelectQuery {
    columns: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Add a filter such as `("stock", "gt.0")`
    pub fn filter(mut self, column: impl Into<String>, condition: impl Into<String>) -> Self {
        self.filters.push((column.into(), condition.into()));
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".to_string()),
        )];
        pairs.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Handle to the hosted backend
#[derive(Clone)]
pub struct BackendGateway {
    client: Client,
    config: GatewayConfig,
    configured: bool,
    timeout_secs: u64,
}

impl BackendGateway {
    /// Build the gateway. Never fails: missing credentials degrade to a
    /// placeholder configuration.
    pub fn new(url: Option<&str>, key: Option<&str>, context: RuntimeContext) -> Self {
        Self::with_timeout(url, key, context, DEFAULT_TIMEOUT_SECS)
    }

    /// Build the gateway with a custom request timeout
    pub fn with_timeout(
        url: Option<&str>,
        key: Option<&str>,
        context: RuntimeContext,
        timeout_secs: u64,
    ) -> Self {
        let (config, configured) = GatewayConfig::resolve(url, key, context);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client ({}), using defaults", e);
                Client::new()
            });

        debug!(
            "Backend gateway for {} (persist_session={}, auto_refresh_token={})",
            config.url, config.persist_session, config.auto_refresh_token
        );

        Self {
            client,
            config,
            configured,
            timeout_secs,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Whether real credentials were supplied
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Project reference: the first label of the backend host
    pub fn project_ref(&self) -> String {
        Url::parse(&self.config.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_string()))
            .unwrap_or_else(|| "placeholder".to_string())
    }

    /// Name of the cookie and storage entry holding the session
    pub fn storage_key(&self) -> String {
        format!("sb-{}-auth-token", self.project_ref())
    }

    /// Password grant
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, GatewayError> {
        let body = json!({ "email": email, "password": password });
        let session: AuthSession = self
            .request(
                Method::POST,
                "/auth/v1/token",
                &[("grant_type", "password")],
                None,
                Some(&body),
            )
            .await?;

        debug!("Signed in as {}", session.user_label());
        Ok(session.with_expiry_from(Utc::now()))
    }

    /// Refresh token grant
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, GatewayError> {
        let body = json!({ "refresh_token": refresh_token });
        let session: AuthSession = self
            .request(
                Method::POST,
                "/auth/v1/token",
                &[("grant_type", "refresh_token")],
                None,
                Some(&body),
            )
            .await?;

        Ok(session.with_expiry_from(Utc::now()))
    }

    /// Refresh the session if it is about to expire and auto refresh is on
    pub async fn ensure_fresh(&self, session: AuthSession) -> Result<AuthSession, GatewayError> {
        if !self.config.auto_refresh_token {
            return Ok(session);
        }
        if !session.expires_within(ChronoDuration::seconds(REFRESH_MARGIN_SECS), Utc::now()) {
            return Ok(session);
        }

        debug!("Session for {} is expiring, refreshing", session.user_label());
        self.refresh_session(&session.refresh_token).await
    }

    /// User owning an access token
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, GatewayError> {
        self.request(Method::GET, "/auth/v1/user", &[], Some(access_token), None)
            .await
    }

    /// Read rows from a table
    pub async fn select(
        &self,
        table: &str,
        query: &SelectQuery,
        access_token: Option<&str>,
    ) -> Result<Vec<Value>, GatewayError> {
        let pairs = query.to_pairs();
        let pairs: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        self.request(
            Method::GET,
            &format!("/rest/v1/{table}"),
            &pairs,
            access_token,
            None,
        )
        .await
    }

    /// Insert rows into a table, returning the stored representation
    pub async fn insert(
        &self,
        table: &str,
        rows: &Value,
        access_token: Option<&str>,
    ) -> Result<Vec<Value>, GatewayError> {
        self.request(
            Method::POST,
            &format!("/rest/v1/{table}"),
            &[],
            access_token,
            Some(rows),
        )
        .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        access_token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.url, path);
        debug!("Sending {} request to {}", method, url);

        let bearer = access_token.unwrap_or(&self.config.key);
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header("apikey", &self.config.key)
            .bearer_auth(bearer)
            .query(query);

        if let Some(body) = body {
            builder = builder.header("Prefer", "return=representation").json(body);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                GatewayError::ConnectionRefused(url.clone())
            } else {
                GatewayError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

/// Pull a human readable message out of an error body
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|field| v.get(field).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::auth::fixtures;
    use httpmock::prelude::*;

    fn gateway(server: &MockServer, context: RuntimeContext) -> BackendGateway {
        BackendGateway::new(Some(&server.base_url()), Some("anon-key-123"), context)
    }

    #[test]
    fn test_missing_credentials_degrade_to_placeholder() {
        let gateway = BackendGateway::new(None, None, RuntimeContext::Server);

        assert!(!gateway.is_configured());
        assert_eq!(gateway.config().url, PLACEHOLDER_URL);
        assert_eq!(gateway.config().key, PLACEHOLDER_KEY);
        assert_eq!(gateway.project_ref(), "placeholder");
    }

    #[test]
    fn test_missing_key_or_bad_url_degrade() {
        let gateway = BackendGateway::new(Some("https://abc.supabase.co"), None, RuntimeContext::Browser);
        assert!(!gateway.is_configured());

        let gateway = BackendGateway::new(Some("not a url"), Some("key"), RuntimeContext::Browser);
        assert!(!gateway.is_configured());
        assert_eq!(gateway.config().url, PLACEHOLDER_URL);

        let gateway = BackendGateway::new(Some("  "), Some("key"), RuntimeContext::Browser);
        assert!(!gateway.is_configured());
    }

    #[test]
    fn test_runtime_context_switches() {
        let url = Some("https://abcdefgh.supabase.co/");
        let browser = BackendGateway::new(url, Some("k"), RuntimeContext::Browser);
        assert!(browser.config().persist_session);
        assert!(browser.config().auto_refresh_token);
        assert_eq!(browser.config().url, "https://abcdefgh.supabase.co");

        let server = BackendGateway::new(url, Some("k"), RuntimeContext::Server);
        assert!(!server.config().persist_session);
        assert!(!server.config().auto_refresh_token);
        assert!(server.is_configured());
    }

    #[test]
    fn test_storage_key() {
        let gateway = BackendGateway::new(
            Some("https://xyzcompany.supabase.co"),
            Some("k"),
            RuntimeContext::Browser,
        );
        assert_eq!(gateway.project_ref(), "xyzcompany");
        assert_eq!(gateway.storage_key(), "sb-xyzcompany-auth-token");
    }

    #[test]
    fn test_key_is_masked_when_serialized() {
        let (config, _) = GatewayConfig::resolve(
            Some("https://a.supabase.co"),
            Some("eyJhbGciOiJIUzI1NiJ9.payload"),
            RuntimeContext::Server,
        );
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["key"], "eyJhbG…");
        assert_eq!(mask("abc"), "***");
    }

    #[test]
    fn test_select_query_pairs() {
        let pairs = SelectQuery::new()
            .columns("id,name,price")
            .filter("stock", "gt.0")
            .order("name.asc")
            .limit(20)
            .to_pairs();

        assert_eq!(pairs[0], ("select".to_string(), "id,name,price".to_string()));
        assert_eq!(pairs[1], ("stock".to_string(), "gt.0".to_string()));
        assert_eq!(pairs[3], ("limit".to_string(), "20".to_string()));
        assert_eq!(SelectQuery::new().to_pairs()[0].1, "*");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message(r#"{"message":"JWT expired"}"#), "JWT expired");
        assert_eq!(error_message("Bad Gateway "), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_sign_in_with_password() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password")
                .header("apikey", "anon-key-123")
                .json_body(serde_json::json!({
                    "email": "cajero@kiosco.test",
                    "password": "secreto"
                }));
            then.status(200)
                .header("content-type", "application/json")
                .body(fixtures::session_json("tok-1", 3600));
        });

        let session = gateway(&server, RuntimeContext::Browser)
            .sign_in_with_password("cajero@kiosco.test", "secreto")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(session.access_token, "tok-1");
        assert!(session.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_sign_in_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400).body(
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
            );
        });

        let err = gateway(&server, RuntimeContext::Browser)
            .sign_in_with_password("x@y.z", "wrong")
            .await
            .unwrap_err();

        assert!(
            matches!(err, GatewayError::Status { status: 400, ref message } if message == "Invalid login credentials"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_ensure_fresh_refreshes_expiring_session() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "refresh_token")
                .json_body(serde_json::json!({ "refresh_token": "refresh-old" }));
            then.status(200).body(fixtures::session_json("new", 3600));
        });

        let expiring = fixtures::session("old", Utc::now().timestamp() + 5);
        let session = gateway(&server, RuntimeContext::Browser)
            .ensure_fresh(expiring)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(session.access_token, "new");
    }

    #[tokio::test]
    async fn test_ensure_fresh_keeps_session_when_disabled_or_valid() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200).body(fixtures::session_json("new", 3600));
        });

        let expiring = fixtures::session("old", Utc::now().timestamp() + 5);
        let kept = gateway(&server, RuntimeContext::Server)
            .ensure_fresh(expiring.clone())
            .await
            .unwrap();
        assert_eq!(kept, expiring);

        let valid = fixtures::session("valid", Utc::now().timestamp() + 3600);
        let kept = gateway(&server, RuntimeContext::Browser)
            .ensure_fresh(valid.clone())
            .await
            .unwrap();
        assert_eq!(kept, valid);

        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn test_get_user_uses_access_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/auth/v1/user")
                .header("authorization", "Bearer tok-9");
            then.status(200)
                .body(r#"{"id":"u-9","email":"dueno@kiosco.test"}"#);
        });

        let user = gateway(&server, RuntimeContext::Server)
            .get_user("tok-9")
            .await
            .unwrap();
        assert_eq!(user.id, "u-9");
        assert_eq!(user.email.as_deref(), Some("dueno@kiosco.test"));
    }

    #[tokio::test]
    async fn test_select_and_insert() {
        let server = MockServer::start();
        let select = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/v1/productos")
                .query_param("select", "id,nombre")
                .query_param("stock", "gt.0")
                .header("authorization", "Bearer anon-key-123");
            then.status(200)
                .body(r#"[{"id":1,"nombre":"Alfajor"},{"id":2,"nombre":"Chicle"}]"#);
        });
        let insert = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/ventas")
                .header("prefer", "return=representation");
            then.status(201).body(r#"[{"id":10,"total":1500}]"#);
        });

        let gateway = gateway(&server, RuntimeContext::Server);
        let rows = gateway
            .select(
                "productos",
                &SelectQuery::new().columns("id,nombre").filter("stock", "gt.0"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["nombre"], "Chicle");

        let stored = gateway
            .insert("ventas", &serde_json::json!([{ "total": 1500 }]), Some("tok"))
            .await
            .unwrap();
        assert_eq!(stored[0]["id"], 10);

        select.assert();
        insert.assert();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let gateway = BackendGateway::new(
            Some("http://127.0.0.1:9"),
            Some("k"),
            RuntimeContext::Server,
        );
        let err = gateway.get_user("tok").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ConnectionRefused(_) | GatewayError::RequestFailed(_)
        ));
    }
}
