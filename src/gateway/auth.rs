//! Auth session types
//!
//! Shapes returned by the backend's token and user endpoints.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Session returned by a successful token grant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for authenticated requests
    pub access_token: String,

    /// Token type, normally "bearer"
    pub token_type: String,

    /// Lifetime of the access token in seconds
    pub expires_in: i64,

    /// Absolute expiry as a unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Token used to obtain a new session
    pub refresh_token: String,

    /// Signed in user
    pub user: AuthUser,
}

/// User attached to a session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: Option<String>,
}

impl AuthSession {
    /// Fill in `expires_at` from `expires_in` when the backend omitted it.
    ///
    /// An `expires_in` too large to represent leaves the expiry unknown.
    pub fn with_expiry_from(mut self, issued: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Duration::try_seconds(self.expires_in)
                .and_then(|lifetime| issued.checked_add_signed(lifetime))
                .map(|expiry| expiry.timestamp());
        }
        self
    }

    /// Absolute expiry time, if known
    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    /// Check whether the session expires within `margin` of `now`.
    ///
    /// A session without a known expiry is treated as expiring.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at_time() {
            Some(expiry) => expiry - margin <= now,
            None => true,
        }
    }

    /// Email of the signed in user, or its id
    pub fn user_label(&self) -> &str {
        self.user.email.as_deref().unwrap_or(&self.user.id)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_ignores_extra_fields() {
        let session: AuthSession =
            serde_json::from_str(&fixtures::session_json("tok", 3600)).unwrap();

        assert_eq!(session.access_token, "tok");
        assert_eq!(session.refresh_token, "refresh-tok");
        assert!(session.expires_at.is_none());
        assert_eq!(session.user_label(), "cajero@kiosco.test");
    }

    #[test]
    fn test_with_expiry_from() {
        let issued = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let session: AuthSession =
            serde_json::from_str(&fixtures::session_json("tok", 3600)).unwrap();
        let session = session.with_expiry_from(issued);

        assert_eq!(session.expires_at, Some(1_700_003_600));

        // An existing expiry is kept.
        let later = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        assert_eq!(
            session.with_expiry_from(later).expires_at,
            Some(1_700_003_600)
        );
    }

    #[test]
    fn test_with_expiry_from_out_of_range_lifetime() {
        let issued = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let session: AuthSession =
            serde_json::from_str(&fixtures::session_json("tok", i64::MAX)).unwrap();

        let session = session.with_expiry_from(issued);
        assert!(session.expires_at.is_none());
        assert!(session.expires_within(Duration::seconds(60), issued));
    }

    #[test]
    fn test_expires_within() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let session = fixtures::session("tok", 1_700_000_030);

        assert!(session.expires_within(Duration::seconds(60), now));
        assert!(!session.expires_within(Duration::seconds(10), now));

        let unknown = AuthSession {
            expires_at: None,
            ..session
        };
        assert!(unknown.expires_within(Duration::seconds(0), now));
    }
}
