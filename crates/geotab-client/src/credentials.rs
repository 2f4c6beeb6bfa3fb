//! Account credentials and the session established with the service.
//!
//! A `Credentials` value is immutable. Authentication does not mutate
//! the existing value; it produces a fresh instance (session id set,
//! password dropped) that replaces the client's held copy, so any
//! caller still holding the old value is unaffected.

use std::env;
use std::fmt;

use crate::error::{GeotabClientError, Result};
use crate::types::CredentialsParam;

/// Default API host, used when no server is configured. Authentication
/// normally redirects to the federation server that owns the database.
pub const DEFAULT_SERVER: &str = "my.geotab.com";

/// MyGeotab account credentials.
///
/// Two states:
/// - unauthenticated: `session_id` absent, `password` present — only
///   `authenticate` is meaningful;
/// - authenticated: `session_id` present — any call is legal. The only
///   way back is the server rejecting the session, which triggers a
///   fresh authentication.
#[derive(Clone, Debug)]
pub struct Credentials {
    username: String,
    password: Option<String>,
    database: Option<String>,
    session_id: Option<String>,
    server: String,
}

impl Credentials {
    /// Create credentials for a MyGeotab account.
    ///
    /// `username` is usually an email address and must be non-empty.
    /// `password` may be omitted when `session_id` carries a session
    /// from a previous authentication; at least one of the two is
    /// required. `database` and `server` are resolved by the server
    /// during authentication when omitted.
    pub fn new(
        username: &str,
        password: Option<&str>,
        database: Option<&str>,
        session_id: Option<&str>,
        server: Option<&str>,
    ) -> Result<Self> {
        if username.trim().is_empty() {
            return Err(GeotabClientError::MissingUsername);
        }
        if password.is_none() && session_id.is_none() {
            return Err(GeotabClientError::MissingSecret);
        }
        let server = server
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SERVER);
        Ok(Self {
            username: username.to_string(),
            password: password.map(str::to_string),
            database: database.map(str::to_string),
            session_id: session_id.map(str::to_string),
            server: server.to_string(),
        })
    }

    /// Read credentials from `GEOTAB_USERNAME`, `GEOTAB_PASSWORD`,
    /// `GEOTAB_DATABASE`, `GEOTAB_SESSION_ID` and `GEOTAB_SERVER`.
    pub fn from_env() -> Result<Self> {
        let username = env::var("GEOTAB_USERNAME").unwrap_or_default();
        let password = env::var("GEOTAB_PASSWORD").ok();
        let database = env::var("GEOTAB_DATABASE").ok();
        let session_id = env::var("GEOTAB_SESSION_ID").ok();
        let server = env::var("GEOTAB_SERVER").ok();
        Self::new(
            &username,
            password.as_deref(),
            database.as_deref(),
            session_id.as_deref(),
            server.as_deref(),
        )
    }

    /// Credentials as returned by a successful `Authenticate` call.
    /// The password is dropped; the session id authorizes from here on.
    pub(crate) fn authenticated(
        username: String,
        session_id: Option<String>,
        database: Option<String>,
        server: String,
    ) -> Self {
        Self {
            username,
            password: None,
            database,
            session_id,
            server,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Projection attached to server calls: `{userName, sessionId,
    /// database}`. The password is never sent after authentication.
    pub fn as_param(&self) -> CredentialsParam {
        CredentialsParam {
            user_name: self.username.clone(),
            session_id: self.session_id.clone(),
            database: self.database.clone(),
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}/{}",
            self.username,
            self.server,
            self.database.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_shows_user_at_server_and_database() {
        let credentials =
            Credentials::new("u@example.com", Some("pw"), Some("acme"), None, None).unwrap();
        assert_eq!(credentials.to_string(), "u@example.com @ my.geotab.com/acme");
    }

    #[test]
    fn server_defaults_when_omitted_or_blank() {
        let credentials =
            Credentials::new("u@example.com", Some("pw"), None, None, Some("  ")).unwrap();
        assert_eq!(credentials.server(), DEFAULT_SERVER);
    }

    #[test]
    fn param_projection_never_carries_the_password() {
        let credentials =
            Credentials::new("u@example.com", Some("pw"), Some("acme"), Some("s-1"), None).unwrap();
        let param = serde_json::to_value(credentials.as_param()).unwrap();
        assert_eq!(
            param,
            json!({ "userName": "u@example.com", "sessionId": "s-1", "database": "acme" })
        );
    }

    #[test]
    fn session_only_credentials_are_accepted() {
        let credentials = Credentials::new("u@example.com", None, None, Some("s-1"), None);
        assert!(credentials.is_ok());
    }

    #[test]
    fn whitespace_username_is_rejected() {
        let result = Credentials::new("   ", Some("pw"), None, None, None);
        assert!(matches!(result, Err(GeotabClientError::MissingUsername)));
    }

    #[test]
    fn missing_password_and_session_is_rejected() {
        let result = Credentials::new("u@example.com", None, Some("acme"), None, None);
        assert!(matches!(result, Err(GeotabClientError::MissingSecret)));
    }

    #[test]
    fn authenticated_credentials_drop_the_password() {
        let fresh = Credentials::authenticated(
            "u@example.com".to_string(),
            Some("s-2".to_string()),
            Some("acme".to_string()),
            "my47.geotab.com".to_string(),
        );
        assert!(fresh.password().is_none());
        assert_eq!(fresh.session_id(), Some("s-2"));
        assert_eq!(fresh.server(), "my47.geotab.com");
    }
}
