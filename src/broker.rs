//! # Service broker: one-shot JSON-RPC calls to sibling services.
//!
//! The controller coordinates three remote services (priority queue,
//! timetable, status-change notifier) through a single seam: [`ServiceBroker`].
//! The production implementation, [`JsonRpcBroker`], POSTs a JSON-RPC 2.0
//! request to `http://<host>/rpc` and hands back the raw `result` value.
//!
//! ## Rules
//! - One request, one response; no retries. The caller decides what a
//!   failure means for its own state.
//! - Transport failures surface as error code `-32100` with the underlying
//!   message in `data`, so they stay distinguishable from remote errors.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::rpc::protocol::{ErrorObject, ResponseObject, BROKER_CALL_ERROR_CODE, SERVER_ERROR_MSG};

/// Outbound call seam to sibling services.
///
/// Swappable for a scripted mock in tests; the controller never constructs
/// HTTP machinery itself.
#[async_trait]
pub trait ServiceBroker: Send + Sync {
    /// Invokes `method` with `params` on the service at `host`.
    ///
    /// Returns the response `result` value (possibly `null`) or the
    /// structured error from the remote or the transport.
    async fn call(&self, host: &str, method: &str, params: Value) -> Result<Value, ErrorObject>;
}

/// JSON-RPC 2.0 over HTTP broker.
pub struct JsonRpcBroker {
    http: reqwest::Client,
}

impl JsonRpcBroker {
    /// Creates a broker with its own HTTP client.
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }

    fn transport_error(err: &reqwest::Error) -> ErrorObject {
        ErrorObject::new(BROKER_CALL_ERROR_CODE, SERVER_ERROR_MSG).with_data(err.to_string())
    }
}

#[async_trait]
impl ServiceBroker for JsonRpcBroker {
    async fn call(&self, host: &str, method: &str, params: Value) -> Result<Value, ErrorObject> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 0,
        });
        let response = self
            .http
            .post(format!("http://{host}/rpc"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;
        let body: ResponseObject = response
            .json()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        match body.error {
            Some(err) => Err(err),
            None => Ok(body.result.unwrap_or(Value::Null)),
        }
    }
}
