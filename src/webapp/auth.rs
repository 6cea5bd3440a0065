//! Wallet key extraction for connecting clients

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::mcp::{Credential, CredentialError};

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

/// Parse a client key.
///
/// Missing keys answer 401 with a hint on how to connect, malformed ones 400.
pub fn extract_credential(raw: Option<&str>, endpoint: &str) -> Result<Credential, Response> {
    Credential::parse(raw).map_err(|e| {
        tracing::debug!(endpoint, error = %e, "Rejected connection");
        match e {
            CredentialError::Missing => (
                StatusCode::UNAUTHORIZED,
                format!("Missing wallet key. Connect with: {endpoint}?key=0x<private_key>"),
            )
                .into_response(),
            CredentialError::Malformed(_) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::EvmSigner;

    #[test]
    fn test_statuses() {
        let missing = extract_credential(None, "/sse").unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        let blank = extract_credential(Some("  "), "/mcp").unwrap_err();
        assert_eq!(blank.status(), StatusCode::UNAUTHORIZED);
        let malformed = extract_credential(Some("0x1234"), "/mcp").unwrap_err();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let signer = EvmSigner::random();
        let padded = format!("  {}  ", signer.to_hex());
        let credential = extract_credential(Some(&padded), "/mcp").unwrap();
        assert_eq!(credential.address(), signer.address());
    }
}
