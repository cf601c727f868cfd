//! Session bootstrap procedure
//!
//! Signs the test identity in against the deployed app and persists the
//! resulting browser session so later browser checks start authenticated.

use reqwest::header::COOKIE;
use reqwest::{redirect, Client, Url};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

use super::pattern::UrlPattern;
use super::state::{SessionStore, StateError, StorageState};
use crate::config::{AppConfig, TestCredentials};
use crate::gateway::{AuthSession, BackendGateway, GatewayError};
use crate::utils::PhaseTimer;

/// Redirect hops followed by a single probe
const MAX_REDIRECTS: usize = 10;

/// Bootstrap errors
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid bootstrap configuration: {0}")]
    Config(String),

    #[error("Login page {url} answered {status}")]
    LoginPage { url: String, status: u16 },

    #[error("Request to the application failed: {0}")]
    App(#[from] reqwest::Error),

    #[error("Sign-in failed: {0}")]
    SignIn(#[from] GatewayError),

    #[error("Timed out after {}s waiting for a redirect matching {pattern} (last URL: {last_url})", .waited.as_secs_f64())]
    Timeout {
        pattern: String,
        waited: Duration,
        last_url: String,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Bootstrap states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    Skipped,
    Authenticating,
    Persisted,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::Skipped => "skipped",
            BootstrapState::Authenticating => "authenticating",
            BootstrapState::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Terminal result of a bootstrap run
#[derive(Clone, Debug, PartialEq)]
pub enum BootstrapOutcome {
    /// No credentials configured; nothing was touched
    Skipped,
    /// Session written to `path`
    Persisted {
        path: PathBuf,
        user: String,
        landed_on: String,
    },
}

impl BootstrapOutcome {
    pub fn state(&self) -> BootstrapState {
        match self {
            BootstrapOutcome::Skipped => BootstrapState::Skipped,
            BootstrapOutcome::Persisted { .. } => BootstrapState::Persisted,
        }
    }
}

/// Resolved bootstrap settings
#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    pub login_url: Url,
    pub landing_url: Url,
    pub pattern: UrlPattern,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl BootstrapConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, BootstrapError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| BootstrapError::Config(format!("base_url {}: {e}", config.base_url)))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| BootstrapError::Config(format!("path {path}: {e}")))
        };
        let pattern = UrlPattern::glob(&config.post_login_pattern).map_err(|e| {
            BootstrapError::Config(format!("pattern {}: {e}", config.post_login_pattern))
        })?;

        Ok(Self {
            login_url: join(&config.login_path)?,
            landing_url: join(&config.landing_path)?,
            pattern,
            timeout: Duration::from_secs(config.login_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// One-shot authenticate-and-persist procedure
pub struct SessionBootstrap {
    gateway: BackendGateway,
    config: BootstrapConfig,
    store: SessionStore,
    browser: Client,
}

impl SessionBootstrap {
    pub fn new(
        gateway: BackendGateway,
        config: BootstrapConfig,
        store: SessionStore,
    ) -> Result<Self, BootstrapError> {
        let browser = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            gateway,
            config,
            store,
            browser,
        })
    }

    /// Run the bootstrap. Without credentials it is skipped and the session
    /// file is left untouched.
    pub async fn run(
        &self,
        credentials: Option<&TestCredentials>,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        let Some(credentials) = credentials else {
            info!(
                "Test credentials not set, bootstrap {}",
                BootstrapState::Skipped
            );
            return Ok(BootstrapOutcome::Skipped);
        };

        info!(
            "Bootstrap {} as {} against {}",
            BootstrapState::Authenticating,
            credentials.email,
            self.config.login_url
        );
        if !self.gateway.is_configured() {
            debug!("Backend gateway is using placeholder credentials");
        }

        let mut timer = PhaseTimer::start("bootstrap");

        self.open_login_page().await?;
        timer.lap("login page");

        let session = self
            .gateway
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await?;
        timer.lap("sign in");

        let state = StorageState::for_session(
            &self.config.login_url,
            &self.gateway.storage_key(),
            &session,
            self.gateway.config().persist_session,
        )?;
        let landed_on = self.wait_for_redirect(&state).await?;
        timer.lap("redirect");

        let path = self.store.save(&state)?;
        timer.lap("persist");
        timer.finish();

        info!(
            "Bootstrap {}: {} at {}",
            BootstrapState::Persisted,
            session.user_label(),
            path.display()
        );

        Ok(BootstrapOutcome::Persisted {
            path,
            user: session.user_label().to_string(),
            landed_on,
        })
    }

    async fn open_login_page(&self) -> Result<(), BootstrapError> {
        let response = self
            .browser
            .get(self.config.login_url.clone())
            .send()
            .await?;
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            return Err(BootstrapError::LoginPage {
                url: self.config.login_url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!("Login page answered {}", status.as_u16());
        Ok(())
    }

    /// Poll the landing page as the signed-in browser until it ends up on a
    /// URL matching the post-login pattern.
    async fn wait_for_redirect(&self, state: &StorageState) -> Result<String, BootstrapError> {
        let cookie = state.cookie_header();
        let deadline = Instant::now() + self.config.timeout;
        let mut last_url: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out(last_url));
            }

            match timeout(remaining, self.probe(&cookie)).await {
                Ok(Ok(url)) if self.config.pattern.matches(&url) => {
                    info!("Redirected to {}", url);
                    return Ok(url);
                }
                Ok(Ok(url)) => {
                    debug!("Landed on {}, waiting for {}", url, self.config.pattern);
                    last_url = Some(url);
                }
                Ok(Err(e)) => debug!("Probe failed: {}", e),
                Err(_) => return Err(self.timed_out(last_url)),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.config.poll_interval.min(remaining)).await;
        }
    }

    fn timed_out(&self, last_url: Option<String>) -> BootstrapError {
        BootstrapError::Timeout {
            pattern: self.config.pattern.to_string(),
            waited: self.config.timeout,
            last_url: last_url.unwrap_or_else(|| "none".to_string()),
        }
    }

    async fn probe(&self, cookie: &str) -> Result<String, reqwest::Error> {
        let response = self
            .browser
            .get(self.config.landing_url.clone())
            .header(COOKIE, cookie)
            .send()
            .await?;
        Ok(response.url().to_string())
    }
}

/// Refresh a persisted session in place.
///
/// Returns the refreshed session, or `None` when the stored one is still
/// fresh (or auto refresh is disabled for the gateway).
pub async fn refresh_persisted(
    gateway: &BackendGateway,
    store: &SessionStore,
    force: bool,
) -> Result<Option<AuthSession>, BootstrapError> {
    let (mut state, session) = store.load_session()?;

    let refreshed = if force {
        gateway.refresh_session(&session.refresh_token).await?
    } else {
        gateway.ensure_fresh(session.clone()).await?
    };

    if refreshed == session {
        debug!("Stored session is still fresh");
        return Ok(None);
    }

    state.replace_session(&refreshed)?;
    store.save(&state)?;
    Ok(Some(refreshed))
}
