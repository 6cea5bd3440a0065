//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{Instrument, info_span};

/// Short random hex ID
fn gen_id() -> String {
    format!("{:06x}", rand::random::<u32>() & 0xFFFFFF)
}

/// Wrap each request in a root span carrying a correlation ID.
///
/// Long-lived event streams keep the span of the request that opened them.
pub async fn trace_request(request: Request, next: Next) -> Response {
    let id = gen_id();
    let span = info_span!(parent: None, "httpd", %id);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    async move {
        let response = next.run(request).await;
        tracing::debug!(%method, %path, status = response.status().as_u16(), "Request");
        response
    }
    .instrument(span)
    .await
}
