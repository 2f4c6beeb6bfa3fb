//! Error types for MyGeotab client operations

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::types::ErrorEnvelope;

/// Result type alias for MyGeotab client operations
pub type Result<T> = std::result::Result<T, GeotabClientError>;

/// An application error reported by the service inside a successful
/// HTTP response, as opposed to a transport-level failure.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub name: String,
    pub message: String,
    pub stack_trace: String,
}

impl ServerError {
    /// Whether this is the session-rejection error that triggers the
    /// one-shot reauthentication retry.
    pub fn is_invalid_user(&self) -> bool {
        self.name == "InvalidUserException"
    }

    /// Build a `ServerError` from the `error` value of a response
    /// envelope (`{"errors": [{name, message, stackTrace}, ...]}`).
    pub fn from_envelope(error: &Value) -> Result<Self> {
        let envelope: ErrorEnvelope = serde_json::from_value(error.clone())
            .map_err(|e| GeotabClientError::Parse(format!("malformed error envelope: {e}")))?;
        let first = envelope.errors.into_iter().next().ok_or_else(|| {
            GeotabClientError::Parse("error envelope carries no error records".to_string())
        })?;
        Ok(Self {
            name: first.name,
            message: first.message,
            stack_trace: first.stack_trace,
        })
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Errors that can occur during MyGeotab client operations
#[derive(Error, Debug)]
pub enum GeotabClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid server URL
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Username missing or empty at construction
    #[error("`username` must not be empty")]
    MissingUsername,

    /// Neither a password nor a session id was supplied
    #[error("either `password` or `session_id` must be provided")]
    MissingSecret,

    /// `call` was invoked without a method name
    #[error("method name must not be empty")]
    EmptyMethod,

    /// The server reported an application error
    #[error("server error: {0}")]
    Server(ServerError),

    /// The server rejected the login during `authenticate`
    #[error("cannot authenticate '{username} @ {server}/{database}'")]
    Authentication {
        username: String,
        database: String,
        server: String,
    },

    /// Failed to parse a response
    #[error("failed to parse response: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_error_reads_the_first_record() {
        let error = ServerError::from_envelope(&json!({
            "errors": [
                { "name": "InvalidUserException", "message": "m", "stackTrace": "s" },
                { "name": "SecondaryException", "message": "ignored", "stackTrace": "" }
            ]
        }))
        .unwrap();
        assert_eq!(error.name, "InvalidUserException");
        assert_eq!(error.message, "m");
        assert_eq!(error.stack_trace, "s");
        assert!(error.is_invalid_user());
    }

    #[test]
    fn empty_error_list_is_a_parse_error() {
        let result = ServerError::from_envelope(&json!({ "errors": [] }));
        assert!(matches!(result, Err(GeotabClientError::Parse(_))));
    }

    #[test]
    fn non_object_envelope_is_a_parse_error() {
        let result = ServerError::from_envelope(&json!("boom"));
        assert!(matches!(result, Err(GeotabClientError::Parse(_))));
    }

    #[test]
    fn authentication_error_names_the_account() {
        let error = GeotabClientError::Authentication {
            username: "u@example.com".to_string(),
            database: "acme".to_string(),
            server: "my.geotab.com".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "cannot authenticate 'u@example.com @ my.geotab.com/acme'"
        );
    }
}
