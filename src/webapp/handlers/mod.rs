pub mod health;
pub mod sse;
pub mod streamable;
pub mod wallet;

use axum::response::sse::Event;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::convert::Infallible;
use tokio::sync::mpsc;

/// Turn a channel of outbound JSON-RPC messages into `message` events.
///
/// `hold` lives as long as the stream, so its `Drop` runs on disconnect.
pub(crate) fn message_events<H: Send + 'static>(
    rx: mpsc::Receiver<Value>,
    hold: H,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold((rx, hold), |(mut rx, hold)| async move {
        let message = rx.recv().await?;
        let event = Event::default().event("message").data(message.to_string());
        Some((Ok(event), (rx, hold)))
    })
}
