//! The pay-and-fetch seam between tool dispatch and the network

use async_trait::async_trait;
use serde_json::Value;

/// One upstream request, addressed relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Get { path: String },
    Post { path: String, body: Value },
}

impl FetchRequest {
    pub fn get(path: impl Into<String>) -> Self {
        FetchRequest::Get { path: path.into() }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        FetchRequest::Post {
            path: path.into(),
            body,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FetchRequest::Get { path } | FetchRequest::Post { path, .. } => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("PRIVATE_KEY environment variable is required")]
    MissingCredential,
    #[error("Invalid private key format.")]
    InvalidCredential,
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
    #[error("Request failed: {0}")]
    Upstream(String),
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Perform one paid request.
///
/// The body comes back as JSON when it parses, otherwise as a JSON string
/// holding the raw text.
#[async_trait]
pub trait PayAndFetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<Value, FetchError>;
}

/// Parse a response body the way tools expect it
pub fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(r#"{"a":1}"#.to_string()), json!({"a": 1}));
        assert_eq!(parse_body("plain text".to_string()), json!("plain text"));
        assert_eq!(parse_body(String::new()), json!(""));
    }

    #[test]
    fn test_request_path() {
        assert_eq!(FetchRequest::get("/api/rsi/").path(), "/api/rsi/");
        assert_eq!(FetchRequest::post("/ai", json!({})).path(), "/ai");
    }
}
