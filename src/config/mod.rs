//! Configuration module
//!
//! Handles loading and managing configuration. Values come from defaults,
//! then a config file, then `KIOSCO_*` environment overrides.

mod env;

pub use env::{print_env_help, EnvConfig, TestCredentials};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./kiosco.yaml",
    "./kiosco.yml",
    "./.kiosco.yaml",
    "~/.config/kiosco/config.yaml",
];

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// URL of the deployed application
    pub base_url: String,

    /// Path of the login page
    pub login_path: String,

    /// Path probed after sign-in; the app redirects signed-in users from here
    pub landing_path: String,

    /// Glob the URL must match once login succeeded
    pub post_login_pattern: String,

    /// Where the session state is written
    pub state_path: PathBuf,

    /// How long to wait for the post-login redirect, in seconds
    pub login_timeout_secs: u64,

    /// Delay between redirect probes, in milliseconds
    pub poll_interval_ms: u64,

    /// HTTP timeout for a single request, in seconds
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            login_path: "/login".to_string(),
            landing_path: "/".to_string(),
            post_login_pattern: "**/dashboard**".to_string(),
            state_path: PathBuf::from("playwright/.auth/user.json"),
            login_timeout_secs: 15,
            poll_interval_ms: 500,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Resolve configuration: explicit or discovered file, then env overrides
    pub fn resolve(env: &EnvConfig) -> Result<Self> {
        let mut config = match &env.config_file {
            Some(path) => Self::load(path)?,
            None => match Self::find() {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env(env);
        config
            .validate()
            .context("Invalid configuration after KIOSCO_* overrides")?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(base_url) = &env.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(state_path) = &env.state_path {
            self.state_path = PathBuf::from(state_path);
        }
        if let Some(timeout) = env.timeout {
            self.login_timeout_secs = timeout;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must be an http(s) URL: {}", self.base_url);
        }
        if !self.login_path.starts_with('/') {
            anyhow::bail!("login_path must start with '/': {}", self.login_path);
        }
        if !self.landing_path.starts_with('/') {
            anyhow::bail!("landing_path must start with '/': {}", self.landing_path);
        }
        if self.post_login_pattern.is_empty() {
            anyhow::bail!("post_login_pattern must not be empty");
        }
        if self.login_timeout_secs == 0 {
            anyhow::bail!("login_timeout_secs must be greater than zero");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.state_path, PathBuf::from("playwright/.auth/user.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kiosco.yaml");

        let config = AppConfig {
            base_url: "https://kiosco.example.com".to_string(),
            login_timeout_secs: 20,
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosco.json");
        std::fs::write(&path, r#"{"base_url": "https://app.example.com"}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "https://app.example.com");
        assert_eq!(config.login_timeout_secs, 15);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosco.yaml");
        std::fs::write(&path, "base_url: ftp://nope\n").unwrap();

        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvConfig {
            base_url: Some("https://staging.example.com".to_string()),
            state_path: Some("/tmp/auth.json".to_string()),
            timeout: Some(5),
            ..Default::default()
        };

        let mut config = AppConfig::default();
        config.apply_env(&env);

        assert_eq!(config.base_url, "https://staging.example.com");
        assert_eq!(config.state_path, PathBuf::from("/tmp/auth.json"));
        assert_eq!(config.login_timeout_secs, 5);
        assert_eq!(config.login_path, "/login");
    }

    #[test]
    fn test_resolve_with_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "login_path: /ingresar\n").unwrap();

        let env = EnvConfig {
            config_file: Some(path.display().to_string()),
            timeout: Some(9),
            ..Default::default()
        };
        let config = AppConfig::resolve(&env).unwrap();

        assert_eq!(config.login_path, "/ingresar");
        assert_eq!(config.login_timeout_secs, 9);
    }

    #[test]
    fn test_resolve_rejects_invalid_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosco.yaml");
        AppConfig::default().save(&path).unwrap();

        let env = EnvConfig {
            config_file: Some(path.display().to_string()),
            base_url: Some("notaurl".to_string()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&env).is_err());

        let env = EnvConfig {
            config_file: Some(path.display().to_string()),
            timeout: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&env).is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("./kiosco.yaml"), PathBuf::from("./kiosco.yaml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x.yaml"), home.join("x.yaml"));
        }
    }
}
