//! Session-oriented transport on `/mcp`
//!
//! A session starts with an initialize request carrying no `mcp-session-id`.
//! Later requests name it in that header and are answered inline.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use uuid::Uuid;

use crate::mcp::context;
use crate::mcp::protocol::{JsonRpcBody, JsonRpcError, JsonRpcResponse};
use crate::webapp::AppState;
use crate::webapp::auth::KeyQuery;
use crate::webapp::models::{SESSION_HEADER, error_jsonrpc, error_text};
use crate::webapp::sessions::StreamableTransport;

use super::message_events;

const UNKNOWN_SESSION: &str = "Invalid or missing session ID";

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// 200 with the reply, or 202 when only notifications were sent
fn respond(reply: Option<Value>, session_id: &str) -> Response {
    let mut response = match reply {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// `POST /mcp`
pub async fn post_handler(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = match session_id(&headers) {
        Some(id) => match state.streamable.get(id) {
            Some(session) => Some(session),
            None => return error_jsonrpc(StatusCode::NOT_FOUND, JsonRpcError::session("Session not found")),
        },
        None => None,
    };

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(JsonRpcResponse::parse_error(&e.to_string()))).into_response();
        }
    };
    let body = JsonRpcBody::from_value(value).ok();

    if let Some(session) = session {
        let Some(body) = body else {
            return error_jsonrpc(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request("Invalid JSON-RPC message"),
            );
        };
        let reply = context::run(session.context(), state.server.handle_body(body)).await;
        return respond(reply, &session.id);
    }

    let Some(body) = body.filter(|b| b.initialize().is_some()) else {
        return error_jsonrpc(StatusCode::BAD_REQUEST, JsonRpcError::session("No valid session ID"));
    };
    let credential = match state.credential(query.key.as_deref(), "/mcp") {
        Ok(credential) => credential,
        Err(rejection) => return rejection,
    };

    let id = Uuid::new_v4().to_string();
    let session = state
        .streamable
        .insert(state.new_session(id, credential, StreamableTransport::default()));
    tracing::info!(
        session = %session.id,
        transport = "streamable",
        wallet = %session.credential.address(),
        "Session opened"
    );

    let reply = context::run(session.context(), state.server.handle_body(body)).await;
    respond(reply, &session.id)
}

/// `GET /mcp`: server-push stream for an existing session
pub async fn get_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = session_id(&headers).and_then(|id| state.streamable.get(id)) else {
        return error_text(StatusCode::BAD_REQUEST, UNKNOWN_SESSION);
    };
    let Some(rx) = session.transport.attach_stream() else {
        return error_text(StatusCode::CONFLICT, "Conflict: Only one SSE stream is allowed per session");
    };
    tracing::debug!(session = %session.id, "Push stream opened");

    Sse::new(message_events(rx, ()))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `DELETE /mcp`: end a session
pub async fn delete_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = session_id(&headers).and_then(|id| state.streamable.remove(id)) else {
        return error_text(StatusCode::BAD_REQUEST, UNKNOWN_SESSION);
    };
    tracing::info!(
        session = %session.id,
        transport = "streamable",
        spent = session.budget.spent_usd(),
        "Session terminated"
    );
    StatusCode::OK.into_response()
}
