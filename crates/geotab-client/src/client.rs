//! MyGeotab JSON-RPC client implementation

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use crate::credentials::Credentials;
use crate::error::{GeotabClientError, Result, ServerError};
use crate::types::{AuthResult, RpcRequest};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Every RPC goes to this path on the configured host.
const API_PATH: &str = "apiv1";

/// Literal `path` value meaning the current host already owns the
/// authenticated database.
const THIS_SERVER: &str = "ThisServer";

/// Build the request URL for a configured server.
///
/// A bare host like `my.geotab.com` gets the fixed `https` scheme; an
/// explicit scheme is honored so local development and test servers
/// can be reached over plain HTTP.
fn api_url(server: &str) -> Result<Url> {
    let trimmed = server.trim().trim_end_matches('/');
    let mut url = if trimmed.contains("://") {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("https://{trimmed}"))?
    };
    url.set_path(API_PATH);
    Ok(url)
}

/// Loopback hosts are development servers; only they may present
/// self-signed certificates.
fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("127.0.0.1" | "localhost"))
}

/// Interpret a decoded response body.
///
/// `error` → application error from `errors[0]`; `result` → that
/// value; empty → `Null`; anything else is an opaque result.
fn interpret_response(data: Value) -> Result<Value> {
    match data {
        Value::Null => Ok(Value::Null),
        Value::Object(mut map) => {
            if map.is_empty() {
                return Ok(Value::Null);
            }
            if let Some(error) = map.get("error") {
                return Err(GeotabClientError::Server(ServerError::from_envelope(error)?));
            }
            if let Some(result) = map.remove("result") {
                return Ok(result);
            }
            Ok(Value::Object(map))
        }
        other => Ok(other),
    }
}

/// MyGeotab JSON-RPC client.
///
/// Holds the current [`Credentials`] and re-authenticates once,
/// transparently, when the service rejects the session mid-call.
///
/// Credential replacement happens behind a mutex so the usual `&self`
/// methods work; the lock is held only while reading or swapping the
/// credentials, never across an HTTP round trip. Overlapping calls are
/// otherwise uncoordinated: two racing calls that both hit an expired
/// session will each re-authenticate once.
pub struct GeotabClient {
    client: Client,
    loopback_client: Client,
    credentials: Mutex<Credentials>,
}

impl GeotabClient {
    /// Create a new client for the given account credentials.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(credentials, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with custom timeouts.
    pub fn with_config(
        credentials: Credentials,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        // Separate client for loopback hosts: local development servers
        // run with self-signed certificates, so verification is off for
        // them and mandatory everywhere else.
        let loopback_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            loopback_client,
            credentials: Mutex::new(credentials),
        })
    }

    /// Create a client from `GEOTAB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Credentials::from_env()?)
    }

    /// Snapshot of the currently held credentials.
    pub async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    /// Make a call to the API.
    ///
    /// `type_name` is merged into `parameters` under `typeName` for the
    /// generic entity methods. The current session credentials are
    /// attached under `credentials` unless the caller already supplied
    /// that key; a client that has no session yet authenticates first.
    ///
    /// If the service rejects the session (`InvalidUserException`), the
    /// client re-authenticates and retries the identical parameters
    /// exactly once; a second rejection, or any other application
    /// error, propagates to the caller.
    #[instrument(skip(self, parameters))]
    pub async fn call(
        &self,
        method: &str,
        type_name: Option<&str>,
        parameters: Map<String, Value>,
    ) -> Result<Value> {
        if method.trim().is_empty() {
            return Err(GeotabClientError::EmptyMethod);
        }
        let mut parameters = parameters;
        if let Some(type_name) = type_name {
            parameters.insert(
                "typeName".to_string(),
                Value::String(type_name.to_string()),
            );
        }

        let needs_session = self.credentials.lock().await.session_id().is_none();
        if needs_session {
            self.authenticate().await?;
        }

        let caller_credentials = parameters.contains_key("credentials");
        let mut reauthorized = false;
        loop {
            let mut attempt = parameters.clone();
            let server = {
                let credentials = self.credentials.lock().await;
                if !caller_credentials {
                    attempt.insert("credentials".to_string(), json!(credentials.as_param()));
                }
                credentials.server().to_string()
            };
            match self.query(&server, method, &Value::Object(attempt)).await {
                Ok(result) => return Ok(result),
                Err(GeotabClientError::Server(error))
                    if error.is_invalid_user() && !reauthorized =>
                {
                    debug!(method, "session rejected, re-authenticating once");
                    reauthorized = true;
                    self.authenticate().await?;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Batch several logical calls into one `ExecuteMultiCall` request.
    ///
    /// `calls` are `(method, params)` pairs; the service executes them
    /// in order and returns one result per call, in the same order.
    #[instrument(skip(self, calls))]
    pub async fn multi_call(&self, calls: &[(&str, Value)]) -> Result<Value> {
        let formatted: Vec<Value> = calls
            .iter()
            .map(|(method, params)| json!({ "method": method, "params": params }))
            .collect();
        let mut parameters = Map::new();
        parameters.insert("calls".to_string(), Value::Array(formatted));
        self.call("ExecuteMultiCall", None, parameters).await
    }

    /// Get entities of a type. Shortcut for `call` with method `Get`.
    pub async fn get(&self, type_name: &str, parameters: Map<String, Value>) -> Result<Value> {
        self.call("Get", Some(type_name), parameters).await
    }

    /// Add an entity. Shortcut for `call` with method `Add`; returns
    /// the id assigned by the service.
    pub async fn add(&self, type_name: &str, entity: Value) -> Result<Value> {
        let mut parameters = Map::new();
        parameters.insert("entity".to_string(), entity);
        self.call("Add", Some(type_name), parameters).await
    }

    /// Update an entity. Shortcut for `call` with method `Set`.
    pub async fn set(&self, type_name: &str, entity: Value) -> Result<Value> {
        let mut parameters = Map::new();
        parameters.insert("entity".to_string(), entity);
        self.call("Set", Some(type_name), parameters).await
    }

    /// Remove an entity. Shortcut for `call` with method `Remove`.
    pub async fn remove(&self, type_name: &str, entity: Value) -> Result<Value> {
        let mut parameters = Map::new();
        parameters.insert("entity".to_string(), entity);
        self.call("Remove", Some(type_name), parameters).await
    }

    /// Authenticate against the API server.
    ///
    /// Issues the query directly, bypassing credential attachment — no
    /// session exists yet. On success the held credentials are replaced
    /// by a fresh instance carrying the server-issued session id, and
    /// the returned `path` becomes the new host unless it is the
    /// literal `"ThisServer"`. A rejected login surfaces as
    /// [`GeotabClientError::Authentication`].
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<Credentials> {
        let (params, username, database, server) = {
            let credentials = self.credentials.lock().await;
            let params = json!({
                "database": credentials.database(),
                "userName": credentials.username(),
                "password": credentials.password(),
                "global": true,
            });
            (
                params,
                credentials.username().to_string(),
                credentials.database().map(str::to_string),
                credentials.server().to_string(),
            )
        };

        debug!(username = %username, server = %server, "authenticating");
        match self.query(&server, "Authenticate", &params).await {
            Ok(result) => {
                let auth: AuthResult = serde_json::from_value(result).map_err(|e| {
                    GeotabClientError::Parse(format!("malformed authentication result: {e}"))
                })?;
                let server = if auth.path == THIS_SERVER {
                    server
                } else {
                    auth.path
                };
                let fresh = Credentials::authenticated(
                    auth.credentials.user_name,
                    auth.credentials.session_id,
                    auth.credentials.database,
                    server,
                );
                *self.credentials.lock().await = fresh.clone();
                Ok(fresh)
            }
            Err(GeotabClientError::Server(error)) if error.is_invalid_user() => {
                Err(GeotabClientError::Authentication {
                    username,
                    database: database.unwrap_or_default(),
                    server,
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Format and perform one query against the API: a single POST of
    /// the `{id, method, params}` envelope, and interpretation of the
    /// response envelope.
    async fn query(&self, server: &str, method: &str, params: &Value) -> Result<Value> {
        let url = api_url(server)?;
        let request = RpcRequest {
            id: -1,
            method,
            params,
        };

        debug!(%url, method, "dispatching RPC");
        let response = self
            .http_for(&url)
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .json(&request)
            .send()
            .await?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let data: Value = serde_json::from_str(&body)
            .map_err(|e| GeotabClientError::Parse(format!("response body is not JSON: {e}")))?;
        interpret_response(data)
    }

    fn http_for(&self, url: &Url) -> &Client {
        if is_loopback(url) {
            &self.loopback_client
        } else {
            &self.client
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_url_defaults_to_https() {
        let url = api_url("my.geotab.com").unwrap();
        assert_eq!(url.as_str(), "https://my.geotab.com/apiv1");
    }

    #[test]
    fn api_url_keeps_explicit_scheme_and_port() {
        let url = api_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/apiv1");
    }

    #[test]
    fn api_url_strips_trailing_slashes() {
        let url = api_url("https://my3.geotab.com/").unwrap();
        assert_eq!(url.as_str(), "https://my3.geotab.com/apiv1");
    }

    #[test]
    fn loopback_hosts_skip_certificate_verification() {
        assert!(is_loopback(&api_url("127.0.0.1").unwrap()));
        assert!(is_loopback(&api_url("http://localhost:9080").unwrap()));
        assert!(!is_loopback(&api_url("my.geotab.com").unwrap()));
        assert!(!is_loopback(&api_url("my47.geotab.com").unwrap()));
    }

    #[test]
    fn result_key_is_unwrapped() {
        let value = interpret_response(json!({ "result": { "id": "b1" } })).unwrap();
        assert_eq!(value, json!({ "id": "b1" }));
    }

    #[test]
    fn bodies_without_result_pass_through() {
        let value = interpret_response(json!({ "pong": true })).unwrap();
        assert_eq!(value, json!({ "pong": true }));
    }

    #[test]
    fn empty_bodies_decode_to_null() {
        assert_eq!(interpret_response(json!(null)).unwrap(), Value::Null);
        assert_eq!(interpret_response(json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn error_envelopes_become_server_errors() {
        let response = json!({
            "error": {
                "errors": [
                    { "name": "DbUnavailableException", "message": "down", "stackTrace": "at ..." }
                ]
            }
        });
        let error = interpret_response(response).unwrap_err();
        match error {
            GeotabClientError::Server(server_error) => {
                assert_eq!(server_error.name, "DbUnavailableException");
                assert_eq!(server_error.message, "down");
                assert_eq!(server_error.stack_trace, "at ...");
                assert!(!server_error.is_invalid_user());
            }
            other => panic!("expected server error, got {other}"),
        }
    }

    #[test]
    fn malformed_error_envelopes_are_parse_errors() {
        let error = interpret_response(json!({ "error": { "errors": [] } })).unwrap_err();
        assert!(matches!(error, GeotabClientError::Parse(_)));
    }
}
