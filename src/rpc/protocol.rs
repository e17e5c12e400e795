//! # JSON-RPC 2.0 envelope types.
//!
//! Shared by the inbound `/rpc` surface and the outbound [`ServiceBroker`]:
//! both sides of the wire speak the same protocol.
//!
//! - [`RequestObject`] — incoming call envelope
//! - [`ResponseObject`] — outgoing reply envelope
//! - [`ErrorObject`] — structured error with `code`, `message`, `data`
//!
//! A response normally carries either `result` or `error`. `startTask` is the
//! one deliberate exception: on failure it replies with result `-1` *and* an
//! error object, so both fields are independently optional here.
//!
//! [`ServiceBroker`]: crate::broker::ServiceBroker

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parse error (invalid JSON was received).
pub const PARSE_ERROR_CODE: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST_CODE: i64 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS_CODE: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR_CODE: i64 = -32603;
/// A broker round-trip to a sibling service failed at the transport layer.
pub const BROKER_CALL_ERROR_CODE: i64 = -32100;

pub const PARSE_ERROR_MSG: &str = "Parse error";
pub const INVALID_REQUEST_MSG: &str = "Invalid Request";
pub const METHOD_NOT_FOUND_MSG: &str = "Method not found";
pub const INVALID_PARAMS_MSG: &str = "Invalid params";
pub const INTERNAL_ERROR_MSG: &str = "Internal error";
pub const SERVER_ERROR_MSG: &str = "Server error";

/// Incoming JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestObject {
    /// Protocol version marker, must be exactly `"2.0"`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Name of the method to invoke.
    #[serde(default)]
    pub method: String,
    /// Named (object) or positional (array) parameters.
    #[serde(default)]
    pub params: Option<Value>,
    /// Request id echoed back in the response. Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
}

impl RequestObject {
    /// Checks the envelope fields that make this a well-formed 2.0 request.
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == "2.0" && !self.method.is_empty()
    }
}

/// Outgoing JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseObject {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    #[serde(default)]
    pub id: Value,
}

impl ResponseObject {
    /// Builds a success response for the given request id.
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Builds an error response for the given request id.
    ///
    /// `result` is usually `None`; `startTask` passes `Some(-1)`.
    pub fn error(id: Value, result: Option<Value>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result,
            error: Some(error),
            id,
        }
    }
}

/// Structured JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error object without attached data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a data payload.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Invalid-params error with a human-readable reason in `data`.
    pub fn invalid_params(reason: impl Into<Value>) -> Self {
        Self::new(INVALID_PARAMS_CODE, INVALID_PARAMS_MSG).with_data(reason)
    }
}
