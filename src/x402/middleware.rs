//! reqwest middleware that pays x402 challenges
//!
//! A request answered with `402 Payment Required` is retried exactly once with
//! an `X-Payment` header signed by the wallet this middleware was built for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTimeError;

use async_trait::async_trait;
use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Client, Request, Response};
use reqwest_middleware as rqm;
use rqm::ClientWithMiddleware;

use crate::eth::{Network, Signer, usdc};
use crate::x402::types::{
    MoneyAmount, MoneyAmountParseError, PaymentPayload, PaymentRequiredResponse,
    PaymentRequirements, PaymentSignError, SettlementReceipt, TokenAmount, TokenAsset,
};

pub const PAYMENT_HEADER: &str = "X-Payment";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";

#[derive(Debug, thiserror::Error)]
pub enum X402PaymentsError {
    #[error("Failed to convert payment cap to token units")]
    TokenAmountConversion(#[source] MoneyAmountParseError),
    #[error("Payment amount {requested} exceeds maximum allowed {allowed} for token {asset}")]
    PaymentAmountTooLarge {
        requested: TokenAmount,
        allowed: TokenAmount,
        asset: TokenAsset,
    },
    #[error("No spending cap configured for token {0}")]
    UncappedAsset(TokenAsset),
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    #[error("No supported payment method in 402 response")]
    NoSuitablePaymentMethod,
    #[error("Failed to get system clock")]
    ClockError(#[source] SystemTimeError),
    #[error("Failed to sign payment payload: {0}")]
    SigningError(String),
    #[error("Failed to encode payment payload to json")]
    JsonEncodeError(#[source] serde_json::Error),
    #[error("Failed to encode payment payload to HTTP header")]
    HeaderValueEncodeError(#[source] http::header::InvalidHeaderValue),
}

impl From<X402PaymentsError> for rqm::Error {
    fn from(error: X402PaymentsError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

impl From<PaymentSignError> for X402PaymentsError {
    fn from(error: PaymentSignError) -> Self {
        match error {
            PaymentSignError::Clock(e) => X402PaymentsError::ClockError(e),
            PaymentSignError::Signing(msg) => X402PaymentsError::SigningError(msg),
        }
    }
}

#[derive(Clone)]
pub struct X402Payments {
    signer: Arc<dyn Signer>,
    max_token_amount: HashMap<TokenAsset, TokenAmount>,
    prefer: Vec<TokenAsset>,
}

impl X402Payments {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            max_token_amount: HashMap::new(),
            prefer: vec![],
        }
    }

    /// Cap a single payment in `asset` at `amount` token units
    pub fn max(mut self, asset: TokenAsset, amount: TokenAmount) -> Self {
        self.max_token_amount.insert(asset, amount);
        self
    }

    /// Cap a single payment at `amount` USD on every known USDC deployment
    pub fn max_usd(mut self, amount: MoneyAmount) -> Result<Self, X402PaymentsError> {
        for network in Network::ALL {
            if let Some(deployment) = usdc::by_network(*network) {
                let units = amount
                    .as_token_amount(usdc::UsdcDeployment::DECIMALS)
                    .map_err(X402PaymentsError::TokenAmountConversion)?;
                self = self.max(deployment.asset(), units);
            }
        }
        Ok(self)
    }

    pub fn prefer<T: Into<Vec<TokenAsset>>>(mut self, prefer: T) -> Self {
        self.prefer.append(&mut prefer.into());
        self
    }

    /// Wrap a plain client so that it pays 402 challenges
    pub fn client(self, base: Client) -> ClientWithMiddleware {
        rqm::ClientBuilder::new(base).with(self).build()
    }

    /// Pick the preferred option, then Base mainnet, then whatever comes first
    pub fn select_payment_requirements(
        &self,
        payment_requirements: &[PaymentRequirements],
    ) -> Result<PaymentRequirements, X402PaymentsError> {
        payment_requirements
            .iter()
            .enumerate()
            .min_by_key(|(index, req)| {
                let pref_index = self
                    .prefer
                    .iter()
                    .position(|a| a == &req.token_asset())
                    .unwrap_or(usize::MAX);
                let base_priority = if req.network == Network::Base { 0 } else { 1 };
                (pref_index, base_priority, *index)
            })
            .map(|(_, req)| req.clone())
            .ok_or(X402PaymentsError::NoSuitablePaymentMethod)
    }

    /// With caps configured, anything uncapped or over its cap is refused
    pub fn assert_max_amount(&self, selected: &PaymentRequirements) -> Result<(), X402PaymentsError> {
        if self.max_token_amount.is_empty() {
            return Ok(());
        }
        let asset = selected.token_asset();
        let Some(max) = self.max_token_amount.get(&asset) else {
            return Err(X402PaymentsError::UncappedAsset(asset));
        };
        if &selected.max_amount_required > max {
            return Err(X402PaymentsError::PaymentAmountTooLarge {
                requested: selected.max_amount_required,
                allowed: *max,
                asset,
            });
        }
        Ok(())
    }

    pub async fn make_payment_payload(
        &self,
        selected: &PaymentRequirements,
    ) -> Result<PaymentPayload, X402PaymentsError> {
        Ok(selected.sign(self.signer.as_ref()).await?)
    }

    pub fn encode_payment_header(payload: &PaymentPayload) -> Result<HeaderValue, X402PaymentsError> {
        let encoded = payload
            .to_header_value()
            .map_err(X402PaymentsError::JsonEncodeError)?;
        HeaderValue::from_str(&encoded).map_err(X402PaymentsError::HeaderValueEncodeError)
    }
}

#[async_trait]
impl rqm::Middleware for X402Payments {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res);
        }

        let challenge = res.json::<PaymentRequiredResponse>().await?;
        let selected = self.select_payment_requirements(&challenge.requirements())?;
        self.assert_max_amount(&selected)?;

        tracing::debug!(
            amount = %selected.max_amount_required,
            asset = %selected.token_asset(),
            payer = %self.signer.address(),
            "Paying x402 challenge"
        );

        let payload = self.make_payment_payload(&selected).await?;
        let header = Self::encode_payment_header(&payload)?;

        let mut retry_req = retry_req.ok_or(X402PaymentsError::RequestNotCloneable)?;
        let headers = retry_req.headers_mut();
        headers.insert(PAYMENT_HEADER, header);
        headers.insert(
            "Access-Control-Expose-Headers",
            HeaderValue::from_static(PAYMENT_RESPONSE_HEADER),
        );

        let response = next.run(retry_req, extensions).await?;

        if let Some(receipt) = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(SettlementReceipt::from_header_value)
        {
            tracing::debug!(
                success = receipt.success,
                transaction = receipt.transaction.as_deref().unwrap_or(""),
                network = receipt.network.as_deref().unwrap_or(""),
                "x402 settlement"
            );
        }

        Ok(response)
    }
}
