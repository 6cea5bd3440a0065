//! Pay-and-fetch over HTTP with x402 payments
//!
//! The paying wallet is resolved per request: the active credential context
//! when there is one, otherwise the process-wide default key.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::GlobalConfig;
use crate::eth::EvmSigner;
use crate::mcp::context;
use crate::x402::fetch::{FetchError, FetchRequest, PayAndFetch, parse_body};
use crate::x402::middleware::X402Payments;
use crate::x402::types::MoneyAmount;

/// Headers the Asrai API expects on every x402 request
const X402_HEADERS: [(&str, &str); 2] = [("x-coinbase-402", "true"), ("x-payment-token", "usdc")];

#[derive(Clone)]
pub struct X402Fetcher {
    base_url: String,
    http: Client,
    timeout: Duration,
    max_payment: MoneyAmount,
    default_key: Option<String>,
}

impl X402Fetcher {
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let max_payment = MoneyAmount::try_from(config.max_payment())
            .map_err(|e| anyhow::anyhow!("Invalid max_payment: {}", e))?;
        let http = Client::builder()
            .user_agent(concat!("asrai-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.api_url().trim_end_matches('/').to_string(),
            http,
            timeout: config.request_timeout(),
            max_payment,
            default_key: config.default_key().map(ToOwned::to_owned),
        })
    }

    pub fn into_shared(self) -> Arc<dyn PayAndFetch> {
        Arc::new(self)
    }

    fn resolve_signer(&self) -> Result<EvmSigner, FetchError> {
        if let Some(ctx) = context::current() {
            return Ok(ctx.credential.signer().clone());
        }
        let key = self.default_key.as_deref().ok_or(FetchError::MissingCredential)?;
        EvmSigner::from_hex(key).map_err(|_| FetchError::InvalidCredential)
    }

    async fn exchange(&self, signer: EvmSigner, request: &FetchRequest) -> Result<Value, FetchError> {
        let client = X402Payments::new(Arc::new(signer))
            .max_usd(self.max_payment)
            .map_err(|e| FetchError::Upstream(e.to_string()))?
            .client(self.http.clone());

        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = match request {
            FetchRequest::Get { .. } => client.get(&url),
            FetchRequest::Post { body, .. } => client.post(&url).json(body),
        };
        for (name, value) in X402_HEADERS {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| match &e {
            reqwest_middleware::Error::Reqwest(inner) if inner.is_timeout() => {
                FetchError::Timeout(self.timeout.as_secs())
            }
            _ => FetchError::Upstream(e.to_string()),
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(parse_body(text))
    }
}

#[async_trait]
impl PayAndFetch for X402Fetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let signer = self.resolve_signer()?;
        tracing::debug!(path = request.path(), payer = %signer.address(), "Fetching");

        match tokio::time::timeout(self.timeout, self.exchange(signer, &request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(path = request.path(), "Upstream request timed out");
                Err(FetchError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::budget::SessionBudget;
    use crate::mcp::context::{Credential, CredentialContext};
    use crate::x402::middleware::PAYMENT_HEADER;
    use crate::x402::types::PaymentPayload;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;

    const BASE_USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

    fn challenge() -> axum::response::Response {
        (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "x402Version": 1,
                "accepts": [{
                    "scheme": "exact",
                    "network": "base",
                    "maxAmountRequired": "1000",
                    "payTo": "0x2222222222222222222222222222222222222222",
                    "maxTimeoutSeconds": 60,
                    "asset": BASE_USDC,
                    "extra": {"name": "USD Coin", "version": "2"}
                }]
            })),
        )
            .into_response()
    }

    /// Pays back the payer address so tests can see which wallet signed
    async fn paid_json(headers: HeaderMap) -> axum::response::Response {
        if headers.get("x-coinbase-402").map(|v| v.as_bytes()) != Some(b"true".as_slice()) {
            return StatusCode::BAD_REQUEST.into_response();
        }
        match headers
            .get(PAYMENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(PaymentPayload::from_header_value)
        {
            Some(payload) => Json(json!({"payer": payload.payload.authorization.from})).into_response(),
            None => challenge(),
        }
    }

    async fn echo_ai(Json(body): Json<Value>) -> impl IntoResponse {
        Json(json!({"answer": body["message"]}))
    }

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/api/paid/", get(paid_json))
            .route("/api/text/", get(|| async { "not json" }))
            .route("/api/broken/", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
            .route(
                "/api/slow/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route("/ai", post(echo_ai));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(base: &str, key: Option<&str>, timeout: u64) -> X402Fetcher {
        let config = GlobalConfig {
            api_url: Some(base.to_string()),
            key: key.map(ToOwned::to_owned),
            timeout_secs: Some(timeout),
            ..Default::default()
        };
        X402Fetcher::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_default_key_pays() {
        let base = spawn_upstream().await;
        let signer = EvmSigner::random();
        let f = fetcher(&base, Some(&signer.to_hex()), 10);

        let value = f.fetch(FetchRequest::get("/api/paid/")).await.unwrap();
        assert_eq!(value["payer"], json!(signer.address()));
    }

    #[tokio::test]
    async fn test_context_credential_wins_over_default() {
        let base = spawn_upstream().await;
        let default = EvmSigner::random();
        let session = EvmSigner::random();
        let f = fetcher(&base, Some(&default.to_hex()), 10);

        let ctx = CredentialContext::new(
            "s",
            Credential::from(session.clone()),
            Arc::new(SessionBudget::new(2.0)),
        );
        let value = context::run(ctx, f.fetch(FetchRequest::get("/api/paid/")))
            .await
            .unwrap();
        assert_eq!(value["payer"], json!(session.address()));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_default_key() {
        let f = fetcher("http://127.0.0.1:9", None, 10);
        assert!(matches!(
            f.fetch(FetchRequest::get("/x")).await,
            Err(FetchError::MissingCredential)
        ));

        let f = fetcher("http://127.0.0.1:9", Some("0x1234"), 10);
        assert!(matches!(
            f.fetch(FetchRequest::get("/x")).await,
            Err(FetchError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn test_raw_text_and_status() {
        let base = spawn_upstream().await;
        let f = fetcher(&base, Some(&EvmSigner::random().to_hex()), 10);

        let text = f.fetch(FetchRequest::get("/api/text/")).await.unwrap();
        assert_eq!(text, json!("not json"));

        match f.fetch(FetchRequest::get("/api/broken/")).await {
            Err(FetchError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_body() {
        let base = spawn_upstream().await;
        let f = fetcher(&base, Some(&EvmSigner::random().to_hex()), 10);
        let value = f
            .fetch(FetchRequest::post("/ai", json!({"message": "btc?"})))
            .await
            .unwrap();
        assert_eq!(value, json!({"answer": "btc?"}));
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = spawn_upstream().await;
        let f = fetcher(&base, Some(&EvmSigner::random().to_hex()), 1);
        assert!(matches!(
            f.fetch(FetchRequest::get("/api/slow/")).await,
            Err(FetchError::Timeout(1))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let f = fetcher("http://127.0.0.1:9", Some(&EvmSigner::random().to_hex()), 5);
        assert!(matches!(
            f.fetch(FetchRequest::get("/api/paid/")).await,
            Err(FetchError::Upstream(_))
        ));
    }
}
