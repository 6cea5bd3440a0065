use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse};

/// Header carrying the `/mcp` session id, in both directions
pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "asrai-mcp")]
    pub server: String,
    #[schema(example = "0.5.0")]
    pub version: String,
}

/// A freshly generated wallet
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// EIP-55 checksummed address
    #[schema(example = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")]
    pub address: String,
    /// `0x` followed by 64 hex characters
    pub private_key: String,
}

/// Plain-text error body
pub fn error_text(code: StatusCode, message: &str) -> Response {
    (code, message.to_string()).into_response()
}

/// JSON-RPC error body with a null id
pub fn error_jsonrpc(code: StatusCode, error: JsonRpcError) -> Response {
    (code, Json(JsonRpcResponse::error(None, error))).into_response()
}
