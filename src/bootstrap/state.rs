//! Persisted session state
//!
//! Browser storage snapshot (cookies plus per-origin local storage) in the
//! JSON layout browser automation tools load as their storage state.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::gateway::AuthSession;

/// Prefix of encoded auth cookie values
const COOKIE_PREFIX: &str = "base64-";

/// Lifetime of the auth cookie
const COOKIE_MAX_AGE_DAYS: i64 = 400;

/// Session state errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access session state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid session state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid auth cookie value: {0}")]
    InvalidCookie(String),

    #[error("No auth session found in {0}")]
    MissingSession(PathBuf),
}

impl StateError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serialized browser storage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    pub cookies: Vec<Cookie>,
    pub origins: Vec<OriginState>,
}

/// Browser cookie
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix time in seconds, -1 for session cookies
    pub expires: f64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: String,
}

/// Local storage of one origin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    pub local_storage: Vec<StorageEntry>,
}

/// Local storage entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

impl StorageState {
    /// Snapshot of a browser signed in to `app_url`.
    ///
    /// The auth cookie is always present; the local storage copy only when
    /// `persist_local` is set.
    pub fn for_session(
        app_url: &Url,
        storage_key: &str,
        session: &AuthSession,
        persist_local: bool,
    ) -> Result<Self, StateError> {
        let domain = app_url.host_str().unwrap_or("localhost").to_string();
        let expires = (Utc::now() + Duration::days(COOKIE_MAX_AGE_DAYS)).timestamp() as f64;

        let cookie = Cookie {
            name: storage_key.to_string(),
            value: encode_cookie_value(session)?,
            domain,
            path: "/".to_string(),
            expires,
            http_only: false,
            secure: app_url.scheme() == "https",
            same_site: "Lax".to_string(),
        };

        let origins = if persist_local {
            vec![OriginState {
                origin: app_url.origin().ascii_serialization(),
                local_storage: vec![StorageEntry {
                    name: storage_key.to_string(),
                    value: serde_json::to_string(session)?,
                }],
            }]
        } else {
            Vec::new()
        };

        Ok(Self {
            cookies: vec![cookie],
            origins,
        })
    }

    /// Extract the auth session, preferring local storage over the cookie
    pub fn session(&self) -> Result<Option<AuthSession>, StateError> {
        let local = self
            .origins
            .iter()
            .flat_map(|o| &o.local_storage)
            .find(|entry| is_auth_key(&entry.name));
        if let Some(entry) = local {
            return Ok(Some(serde_json::from_str(&entry.value)?));
        }

        self.cookies
            .iter()
            .find(|cookie| is_auth_key(&cookie.name))
            .map(|cookie| decode_cookie_value(&cookie.value))
            .transpose()
    }

    /// Replace the stored session everywhere it appears
    pub fn replace_session(&mut self, session: &AuthSession) -> Result<(), StateError> {
        let cookie_value = encode_cookie_value(session)?;
        let local_value = serde_json::to_string(session)?;

        for cookie in self.cookies.iter_mut().filter(|c| is_auth_key(&c.name)) {
            cookie.value = cookie_value.clone();
        }
        for entry in self
            .origins
            .iter_mut()
            .flat_map(|o| o.local_storage.iter_mut())
            .filter(|e| is_auth_key(&e.name))
        {
            entry.value = local_value.clone();
        }
        Ok(())
    }

    /// Cookie header a browser would send to the app
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn is_auth_key(name: &str) -> bool {
    name.starts_with("sb-") && name.ends_with("-auth-token")
}

/// Encode a session the way the auth cookie stores it
pub fn encode_cookie_value(session: &AuthSession) -> Result<String, StateError> {
    let json = serde_json::to_vec(session)?;
    Ok(format!("{COOKIE_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Decode an auth cookie value; plain JSON values are accepted too
pub fn decode_cookie_value(value: &str) -> Result<AuthSession, StateError> {
    match value.strip_prefix(COOKIE_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded.trim_end_matches('='))
                .map_err(|e| StateError::InvalidCookie(e.to_string()))?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        None => Ok(serde_json::from_str(value)?),
    }
}

/// Session state file on disk
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the state. The existing file is replaced only once the new
    /// content is fully written.
    pub fn save(&self, state: &StorageState) -> Result<PathBuf, StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let result = self.write_to(&tmp, state).and_then(|()| {
            fs::rename(&tmp, &self.path).map_err(|e| StateError::io(&self.path, e))
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        info!("Saved session state to {}", self.path.display());
        Ok(self.path.clone())
    }

    fn write_to(&self, path: &Path, state: &StorageState) -> Result<(), StateError> {
        let file = File::create(path).map_err(|e| StateError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush().map_err(|e| StateError::io(path, e))?;
        debug!("Wrote session state to {}", path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<StorageState, StateError> {
        let file = File::open(&self.path).map_err(|e| StateError::io(&self.path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Load the state and the session inside it
    pub fn load_session(&self) -> Result<(StorageState, AuthSession), StateError> {
        let state = self.load()?;
        let session = state
            .session()?
            .ok_or_else(|| StateError::MissingSession(self.path.clone()))?;
        Ok((state, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fixtures;

    fn app_url() -> Url {
        Url::parse("https://kiosco.example.com/login").unwrap()
    }

    #[test]
    fn test_cookie_value_roundtrip() {
        let session = fixtures::session("tok", 1_700_000_000);
        let encoded = encode_cookie_value(&session).unwrap();

        assert!(encoded.starts_with("base64-"));
        assert!(!encoded.contains('='));
        assert_eq!(decode_cookie_value(&encoded).unwrap(), session);

        let plain = serde_json::to_string(&session).unwrap();
        assert_eq!(decode_cookie_value(&plain).unwrap(), session);
        assert!(matches!(
            decode_cookie_value("base64-@@@"),
            Err(StateError::InvalidCookie(_))
        ));
    }

    #[test]
    fn test_for_session_with_local_storage() {
        let session = fixtures::session("tok", 1_700_000_000);
        let state =
            StorageState::for_session(&app_url(), "sb-abc-auth-token", &session, true).unwrap();

        assert_eq!(state.cookies.len(), 1);
        let cookie = &state.cookies[0];
        assert_eq!(cookie.domain, "kiosco.example.com");
        assert!(cookie.secure);
        assert!(cookie.expires > Utc::now().timestamp() as f64);

        assert_eq!(state.origins[0].origin, "https://kiosco.example.com");
        assert_eq!(state.origins[0].local_storage[0].name, "sb-abc-auth-token");
        assert_eq!(state.session().unwrap(), Some(session));
    }

    #[test]
    fn test_for_session_without_local_storage() {
        let session = fixtures::session("tok", 1_700_000_000);
        let url = Url::parse("http://localhost:3000").unwrap();
        let state = StorageState::for_session(&url, "sb-abc-auth-token", &session, false).unwrap();

        assert!(state.origins.is_empty());
        assert!(!state.cookies[0].secure);
        assert_eq!(state.session().unwrap(), Some(session));
        assert!(state.cookie_header().starts_with("sb-abc-auth-token=base64-"));
    }

    #[test]
    fn test_serialized_layout() {
        let session = fixtures::session("tok", 1_700_000_000);
        let state =
            StorageState::for_session(&app_url(), "sb-abc-auth-token", &session, true).unwrap();
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["cookies"][0]["httpOnly"], false);
        assert_eq!(json["cookies"][0]["sameSite"], "Lax");
        assert!(json["origins"][0]["localStorage"].is_array());
    }

    #[test]
    fn test_replace_session() {
        let old = fixtures::session("old", 1_700_000_000);
        let new = fixtures::session("new", 1_800_000_000);
        let mut state =
            StorageState::for_session(&app_url(), "sb-abc-auth-token", &old, true).unwrap();

        state.replace_session(&new).unwrap();

        assert_eq!(state.session().unwrap(), Some(new.clone()));
        assert_eq!(decode_cookie_value(&state.cookies[0].value).unwrap(), new);
    }

    #[test]
    fn test_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join(".auth").join("user.json"));
        assert!(!store.exists());

        let session = fixtures::session("tok", 1_700_000_000);
        let state =
            StorageState::for_session(&app_url(), "sb-abc-auth-token", &session, true).unwrap();

        let path = store.save(&state).unwrap();
        assert!(store.exists());
        assert!(fs::metadata(&path).unwrap().len() > 0);
        assert!(!dir.path().join(".auth").join("user.json.tmp").exists());

        let (loaded, loaded_session) = store.load_session().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded_session, session);
    }

    #[test]
    fn test_store_missing_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("user.json"));
        store.save(&StorageState::default()).unwrap();

        assert!(matches!(
            store.load_session(),
            Err(StateError::MissingSession(_))
        ));
    }

    #[test]
    fn test_store_load_missing_file() {
        let store = SessionStore::new("/nonexistent/dir/user.json");
        assert!(matches!(store.load(), Err(StateError::Io { .. })));
    }
}
