//! Test utilities for geotab-client
//!
//! Provides a scripted JSON-RPC mock server and a self-shutting test
//! server wrapper for driving the real client over a local socket.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::{Credentials, GeotabClient, Result};

/// Wrap a payload in a success envelope: `{"result": ...}`.
pub fn result_body(result: Value) -> Value {
    json!({ "result": result })
}

/// Build an application-error envelope for `name`.
pub fn error_body(name: &str, message: &str) -> Value {
    json!({
        "error": {
            "errors": [{ "name": name, "message": message, "stackTrace": "" }]
        }
    })
}

/// One request received by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

#[derive(Default)]
struct MockRpcState {
    calls: Mutex<Vec<RecordedCall>>,
    scripts: Mutex<HashMap<String, VecDeque<Value>>>,
}

/// A scripted `/apiv1` endpoint.
///
/// Responses are queued per method with [`MockRpc::enqueue`] and served
/// in order; a method with an empty queue answers `{"result": null}`.
/// Every received request is recorded for later inspection.
#[derive(Clone, Default)]
pub struct MockRpc {
    state: Arc<MockRpcState>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response body for `method`.
    pub fn enqueue(&self, method: &str, body: Value) {
        self.state
            .scripts
            .lock()
            .expect("mock script lock poisoned")
            .entry(method.to_string())
            .or_default()
            .push_back(body);
    }

    /// All requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .calls
            .lock()
            .expect("mock call log lock poisoned")
            .clone()
    }

    /// Router serving `POST /apiv1`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/apiv1", post(handle))
            .with_state(self.state.clone())
    }
}

async fn handle(
    State(state): State<Arc<MockRpcState>>,
    Json(request): Json<Value>,
) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();
    state
        .calls
        .lock()
        .expect("mock call log lock poisoned")
        .push(RecordedCall {
            method: method.clone(),
            params,
        });

    let scripted = state
        .scripts
        .lock()
        .expect("mock script lock poisoned")
        .get_mut(&method)
        .and_then(|queue| queue.pop_front());
    Json(scripted.unwrap_or_else(|| json!({ "result": null })))
}

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Bind an ephemeral loopback port and serve `router` on it.
    pub async fn start(router: Router) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Server string for [`Credentials`], e.g. `http://127.0.0.1:41234`.
    pub fn server_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client already holding a session, pointed at this server.
    pub fn client_with_session(&self) -> Result<GeotabClient> {
        let credentials = Credentials::new(
            "test@example.com",
            None,
            Some("testdb"),
            Some("session-0"),
            Some(&self.server_url()),
        )?;
        GeotabClient::new(credentials)
    }

    /// Unauthenticated client (password only), pointed at this server.
    pub fn client_with_password(&self) -> Result<GeotabClient> {
        let credentials = Credentials::new(
            "test@example.com",
            Some("hunter2"),
            Some("testdb"),
            None,
            Some(&self.server_url()),
        )?;
        GeotabClient::new(credentials)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
