//! Legacy transport: one event stream per session plus `POST /messages`

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use futures::stream;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::mcp::context;
use crate::mcp::protocol::JsonRpcBody;
use crate::webapp::AppState;
use crate::webapp::auth::KeyQuery;
use crate::webapp::models::error_text;
use crate::webapp::sessions::{STREAM_BUFFER, SessionGuard, SseTransport};

use super::message_events;

/// `GET /sse?key=0x...`
///
/// The first event names the endpoint for posting messages. The session
/// lives exactly as long as this stream.
pub async fn sse_handler(State(state): State<AppState>, Query(query): Query<KeyQuery>) -> Response {
    let credential = match state.credential(query.key.as_deref(), "/sse") {
        Ok(credential) => credential,
        Err(rejection) => return rejection,
    };

    let id: Arc<str> = Uuid::new_v4().to_string().into();
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let session = state
        .sse
        .insert(state.new_session(id.clone(), credential, SseTransport { tx }));
    tracing::info!(session = %id, transport = "sse", wallet = %session.credential.address(), "Session opened");

    let guard = SessionGuard::new(state.sse.clone(), id.clone());
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?sessionId={id}"));
    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(message_events(rx, guard));

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `POST /messages?sessionId=...`
///
/// Accepts immediately. The message is handled in the background and the
/// reply goes out on the session's stream.
pub async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Response {
    let Some(session) = query.session_id.as_deref().and_then(|id| state.sse.get(id)) else {
        return error_text(StatusCode::BAD_REQUEST, "No active session found.");
    };
    let Some(body) = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| JsonRpcBody::from_value(v).ok())
    else {
        return error_text(StatusCode::BAD_REQUEST, "Invalid message");
    };

    let server = state.server.clone();
    let tx = session.transport.tx.clone();
    let session_id = session.id.clone();
    tokio::spawn(context::run(session.context(), async move {
        if let Some(reply) = server.handle_body(body).await
            && tx.send(reply).await.is_err()
        {
            tracing::debug!(session = %session_id, "Stream closed before reply was sent");
        }
    }));

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
