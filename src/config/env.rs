//! Environment variable configuration
//!
//! Backend credentials, test credentials and `KIOSCO_*` overrides.

use std::env;

/// Prefix for tool overrides
const ENV_PREFIX: &str = "KIOSCO";

/// Backend URL variables, in order of precedence
const BACKEND_URL_VARS: &[&str] = &["NEXT_PUBLIC_SUPABASE_URL", "SUPABASE_URL"];

/// Backend key variables, in order of precedence
const BACKEND_KEY_VARS: &[&str] = &["NEXT_PUBLIC_SUPABASE_ANON_KEY", "SUPABASE_ANON_KEY"];

const TEST_EMAIL_VAR: &str = "TEST_USER_EMAIL";
const TEST_PASSWORD_VAR: &str = "TEST_USER_PASSWORD";

/// Configuration taken from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Backend URL from NEXT_PUBLIC_SUPABASE_URL or SUPABASE_URL
    pub backend_url: Option<String>,
    /// Backend anon key from NEXT_PUBLIC_SUPABASE_ANON_KEY or SUPABASE_ANON_KEY
    pub backend_key: Option<String>,
    /// Test user email from TEST_USER_EMAIL
    pub test_user_email: Option<String>,
    /// Test user password from TEST_USER_PASSWORD
    pub test_user_password: Option<String>,
    /// Application URL from KIOSCO_BASE_URL
    pub base_url: Option<String>,
    /// Session state path from KIOSCO_STATE_PATH
    pub state_path: Option<String>,
    /// Login wait timeout in seconds from KIOSCO_TIMEOUT
    pub timeout: Option<u64>,
    /// Log level from KIOSCO_LOG_LEVEL
    pub log_level: Option<String>,
    /// Config file from KIOSCO_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            backend_url: first_set(BACKEND_URL_VARS),
            backend_key: first_set(BACKEND_KEY_VARS),
            test_user_email: get_var(TEST_EMAIL_VAR),
            test_user_password: get_var(TEST_PASSWORD_VAR),
            base_url: get_env("BASE_URL"),
            state_path: get_env("STATE_PATH"),
            timeout: get_env_parse("TIMEOUT"),
            log_level: get_env("LOG_LEVEL"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Test credentials, present only when both email and password are set
    pub fn test_credentials(&self) -> Option<TestCredentials> {
        TestCredentials::from_parts(
            self.test_user_email.as_deref(),
            self.test_user_password.as_deref(),
        )
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        let set = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };

        println!("Environment Configuration:");
        println!("  Backend URL:          {:?}", self.backend_url);
        println!("  Backend key:          {}", set(&self.backend_key));
        println!("  {TEST_EMAIL_VAR}:      {:?}", self.test_user_email);
        println!("  {TEST_PASSWORD_VAR}:   {}", set(&self.test_user_password));
        println!("  {ENV_PREFIX}_BASE_URL:     {:?}", self.base_url);
        println!("  {ENV_PREFIX}_STATE_PATH:   {:?}", self.state_path);
        println!("  {ENV_PREFIX}_TIMEOUT:      {:?}", self.timeout);
        println!("  {ENV_PREFIX}_LOG_LEVEL:    {:?}", self.log_level);
        println!("  {ENV_PREFIX}_CONFIG:       {:?}", self.config_file);
    }
}

/// Credentials of the identity used by browser checks
#[derive(Clone)]
pub struct TestCredentials {
    pub email: String,
    pub password: String,
}

impl TestCredentials {
    /// Build credentials when both parts are present and non-empty
    pub fn from_parts(email: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (email, password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some(Self {
                    email: email.to_string(),
                    password: password.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for TestCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read a variable, treating empty values as unset
fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn first_set(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| get_var(name))
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    get_var(&format!("{ENV_PREFIX}_{name}"))
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Builder for setting environment variables in tests
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set an arbitrary variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    pub fn base_url(self, url: impl Into<String>) -> Self {
        self.var(format!("{ENV_PREFIX}_BASE_URL"), url)
    }

    pub fn state_path(self, path: impl Into<String>) -> Self {
        self.var(format!("{ENV_PREFIX}_STATE_PATH"), path)
    }

    pub fn timeout(self, timeout: u64) -> Self {
        self.var(format!("{ENV_PREFIX}_TIMEOUT"), timeout.to_string())
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

#[cfg(test)]
impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print the variables the tool reads
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  NEXT_PUBLIC_SUPABASE_URL       Backend URL (fallback: SUPABASE_URL)");
    println!("  NEXT_PUBLIC_SUPABASE_ANON_KEY  Backend anon key (fallback: SUPABASE_ANON_KEY)");
    println!("  {TEST_EMAIL_VAR}                Email of the test identity");
    println!("  {TEST_PASSWORD_VAR}             Password of the test identity");
    println!("  {ENV_PREFIX}_BASE_URL               Deployed application URL");
    println!("  {ENV_PREFIX}_STATE_PATH             Where the session state is written");
    println!("  {ENV_PREFIX}_TIMEOUT                Post-login redirect timeout in seconds");
    println!("  {ENV_PREFIX}_LOG_LEVEL              trace, debug, info, warn or error");
    println!("  {ENV_PREFIX}_CONFIG                 Path to configuration file");
    println!();
    println!("Without {TEST_EMAIL_VAR} and {TEST_PASSWORD_VAR} the bootstrap is skipped.");
}
