//! # HTTP server exposing the JSON-RPC surface at `/rpc`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::api::ApiV1;
use super::protocol::{
    ErrorObject, RequestObject, ResponseObject, INVALID_REQUEST_CODE, INVALID_REQUEST_MSG,
    PARSE_ERROR_CODE, PARSE_ERROR_MSG,
};

/// Builds the `/rpc` router.
pub fn router(api: Arc<ApiV1>) -> Router {
    Router::new().route("/rpc", post(handle_rpc)).with_state(api)
}

/// Serves the RPC surface until the token is cancelled.
pub async fn serve(
    addr: SocketAddr,
    api: Arc<ApiV1>,
    token: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "rpc server listening");
    axum::serve(listener, router(api))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

async fn handle_rpc(State(api): State<Arc<ApiV1>>, body: String) -> Json<ResponseObject> {
    let raw: Value = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(err) => {
            return Json(ResponseObject::error(
                Value::Null,
                None,
                ErrorObject::new(PARSE_ERROR_CODE, PARSE_ERROR_MSG).with_data(err.to_string()),
            ));
        }
    };

    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let request: RequestObject = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(_) => {
            return Json(ResponseObject::error(
                id,
                None,
                ErrorObject::new(INVALID_REQUEST_CODE, INVALID_REQUEST_MSG),
            ));
        }
    };
    if !request.is_valid() {
        return Json(ResponseObject::error(
            id,
            None,
            ErrorObject::new(INVALID_REQUEST_CODE, INVALID_REQUEST_MSG),
        ));
    }

    Json(api.dispatch(request).await)
}
