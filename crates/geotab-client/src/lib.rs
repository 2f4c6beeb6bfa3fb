//! MyGeotab Client Library
//!
//! A thin client for the MyGeotab JSON-RPC-over-HTTP fleet-management
//! API: it holds account credentials and a session, sends the
//! `{id, method, params}` envelope, interprets the response envelope,
//! and transparently re-authenticates once when the service rejects an
//! expired session.
//!
//! Entity payloads are opaque [`serde_json::Value`]s; this crate does
//! not model the service's entity schemas.
//!
//! # Example
//!
//! ```rust,no_run
//! use geotab_client::{Credentials, GeotabClient};
//! use serde_json::{json, Map};
//!
//! #[tokio::main]
//! async fn main() -> geotab_client::Result<()> {
//!     let credentials =
//!         Credentials::new("user@example.com", Some("passw0rd"), Some("acme"), None, None)?;
//!     let client = GeotabClient::new(credentials)?;
//!
//!     // Fetch a device by id
//!     let mut params = Map::new();
//!     params.insert("search".to_string(), json!({ "id": "b123" }));
//!     let device = client.get("Device", params).await?;
//!     println!("{device}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a scripted mock `/apiv1` server:
//!
//! ```rust,ignore
//! use geotab_client::testing::{result_body, MockRpc, TestServer};
//!
//! let mock = MockRpc::new();
//! mock.enqueue("Get", result_body(serde_json::json!([])));
//! let server = TestServer::start(mock.router()).await?;
//! let client = server.client_with_session()?;
//! ```

mod client;
mod credentials;
mod error;
pub mod testing;
mod types;

pub use client::GeotabClient;
pub use credentials::{Credentials, DEFAULT_SERVER};
pub use error::{GeotabClientError, Result, ServerError};
pub use types::*;
