//! Wire types for the MyGeotab JSON-RPC envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request envelope sent to `/apiv1`.
///
/// The `id` is fixed at `-1`; the service does not correlate requests
/// by id over plain HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub id: i32,
    pub method: &'a str,
    pub params: &'a Value,
}

/// One server-side error record inside an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack_trace: String,
}

/// The `error` value of a failed response: `{"errors": [...]}`.
///
/// Only `errors[0]` is meaningful to this client; the service always
/// puts the primary failure first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

/// Credential projection sent with every authenticated call, and
/// returned by a successful `Authenticate`. Never carries a password.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsParam {
    pub user_name: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

/// Successful `Authenticate` payload.
///
/// `path` is either a new server host to adopt for subsequent calls or
/// the literal `"ThisServer"`, meaning the current host already owns
/// the database.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResult {
    pub path: String,
    pub credentials: CredentialsParam,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_detail_reads_camel_case_stack_trace() {
        let detail: ErrorDetail = serde_json::from_value(json!({
            "name": "InvalidUserException",
            "message": "Incorrect login credentials",
            "stackTrace": "at Geotab.Checkmate..."
        }))
        .unwrap();
        assert_eq!(detail.name, "InvalidUserException");
        assert_eq!(detail.stack_trace, "at Geotab.Checkmate...");
    }

    #[test]
    fn error_detail_tolerates_missing_message_and_stack() {
        let detail: ErrorDetail =
            serde_json::from_value(json!({ "name": "DbUnavailableException" })).unwrap();
        assert!(detail.message.is_empty());
        assert!(detail.stack_trace.is_empty());
    }

    #[test]
    fn rpc_request_serializes_the_fixed_envelope() {
        let params = json!({ "typeName": "Device" });
        let request = RpcRequest {
            id: -1,
            method: "Get",
            params: &params,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "id": -1, "method": "Get", "params": { "typeName": "Device" } })
        );
    }

    #[test]
    fn auth_result_reads_the_authenticate_payload() {
        let auth: AuthResult = serde_json::from_value(json!({
            "path": "my47.geotab.com",
            "credentials": {
                "userName": "u@example.com",
                "sessionId": "s-1",
                "database": "acme"
            }
        }))
        .unwrap();
        assert_eq!(auth.path, "my47.geotab.com");
        assert_eq!(auth.credentials.session_id.as_deref(), Some("s-1"));
    }
}
