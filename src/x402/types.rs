//! Wire types of the x402 `exact` scheme on EVM networks

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::eth::eip712::{Eip712Domain, SignedTransferWithAuthorization, TransferWithAuthorization};
use crate::eth::{Network, Signer};
use crate::x402::UnixTimestamp;

/// Seconds subtracted from "now" for `validAfter`, to absorb clock skew
const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

// ============================================================================
// Protocol version and scheme
// ============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum X402Version {
    V1,
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            X402Version::V1 => serializer.serialize_u8(1),
        }
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            1 => Ok(X402Version::V1),
            other => Err(serde::de::Error::custom(format!(
                "Unsupported x402Version: {other}"
            ))),
        }
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            X402Version::V1 => write!(f, "1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "exact")
    }
}

// ============================================================================
// Nonce
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexEncodedNonce(pub [u8; 32]);

impl HexEncodedNonce {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl Display for HexEncodedNonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Nonce must be 32 bytes"))?;
        Ok(HexEncodedNonce(arr))
    }
}

// ============================================================================
// Amounts
// ============================================================================

/// A human-readable amount in whole token units, e.g. `0.01` USDC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MoneyAmount(pub Decimal);

#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Failed to parse decimal")]
    DecimalParse,
    #[error("Negative amount not allowed")]
    Negative,
}

impl MoneyAmount {
    /// Convert to the token's smallest unit, rounding to the nearest integer
    pub fn as_token_amount(&self, decimals: u8) -> Result<TokenAmount, MoneyAmountParseError> {
        let factor = Decimal::from_u128(10u128.pow(decimals as u32))
            .ok_or(MoneyAmountParseError::DecimalParse)?;
        let units = (self.0 * factor).round().normalize();
        let value = U256::from_str(&units.to_string())
            .map_err(|_| MoneyAmountParseError::DecimalParse)?;
        Ok(TokenAmount(value))
    }
}

impl TryFrom<f64> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountParseError::DecimalParse)?;
        if decimal < Decimal::zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        Ok(MoneyAmount(decimal))
    }
}

/// An amount in the token's smallest unit, serialized as a decimal string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str(&s)
            .map(TokenAmount)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Assets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAsset {
    pub address: Address,
    pub network: Network,
}

impl Display for TokenAsset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.network)
    }
}

// ============================================================================
// Payment payload and requirements
// ============================================================================

/// The signed payment carried base64-encoded in the `X-Payment` header
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(rename = "x402Version")]
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: SignedTransferWithAuthorization,
}

impl PaymentPayload {
    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        Ok(b64.encode(serde_json::to_vec(self)?))
    }

    pub fn from_header_value(value: &str) -> Option<Self> {
        let bytes = b64.decode(value.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// One way of paying for a resource, as listed in a 402 response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: TokenAmount,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "payTo")]
    pub pay_to: Address,
    #[serde(rename = "maxTimeoutSeconds")]
    pub max_timeout_seconds: u64,
    pub asset: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentSignError {
    #[error("Clock error: {0}")]
    Clock(#[source] std::time::SystemTimeError),
    #[error("Signing failed: {0}")]
    Signing(String),
}

fn extra_str<'a>(extra: Option<&'a serde_json::Value>, key: &str) -> Option<&'a str> {
    extra.and_then(|v| v.get(key)).and_then(|v| v.as_str())
}

impl PaymentRequirements {
    pub fn token_asset(&self) -> TokenAsset {
        TokenAsset {
            address: self.asset,
            network: self.network,
        }
    }

    /// EIP-712 domain of the payment token.
    ///
    /// Name and version come from `extra`; known USDC deployments fill in
    /// whatever the server left out.
    pub fn domain(&self) -> Eip712Domain {
        let known = crate::eth::usdc::by_asset(&self.token_asset());
        let name = extra_str(self.extra.as_ref(), "name")
            .map(ToOwned::to_owned)
            .or_else(|| known.map(|d| d.eip712_name.to_string()))
            .unwrap_or_default();
        let version = extra_str(self.extra.as_ref(), "version")
            .map(ToOwned::to_owned)
            .or_else(|| known.map(|_| crate::eth::usdc::UsdcDeployment::EIP712_VERSION.to_string()))
            .unwrap_or_default();

        Eip712Domain {
            name,
            version,
            chain_id: self.network.chain_id(),
            verifying_contract: self.asset,
        }
    }

    /// Sign an authorization paying exactly `maxAmountRequired` to `payTo`
    pub async fn sign(&self, signer: &dyn Signer) -> Result<PaymentPayload, PaymentSignError> {
        let now = UnixTimestamp::try_now().map_err(PaymentSignError::Clock)?;
        let authorization = TransferWithAuthorization {
            from: signer.address(),
            to: self.pay_to,
            value: self.max_amount_required,
            valid_after: UnixTimestamp(now.seconds_since_epoch().saturating_sub(VALID_AFTER_SKEW_SECS)),
            valid_before: now + self.max_timeout_seconds,
            nonce: HexEncodedNonce::random(),
        };

        let signed = authorization
            .sign(&self.domain(), signer)
            .await
            .map_err(|e| PaymentSignError::Signing(e.to_string()))?;

        Ok(PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Exact,
            network: self.network,
            payload: signed,
        })
    }
}

/// Body of an HTTP 402 response.
///
/// `accepts` is kept loosely typed: servers may list schemes or networks
/// this client cannot pay with, and those entries are skipped rather than
/// failing the whole response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentRequiredResponse {
    #[serde(rename = "x402Version", default, skip_serializing_if = "Option::is_none")]
    pub x402_version: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub accepts: Vec<serde_json::Value>,
}

impl PaymentRequiredResponse {
    /// The payment options this client understands
    pub fn requirements(&self) -> Vec<PaymentRequirements> {
        self.accepts
            .iter()
            .filter_map(|v| match serde_json::from_value::<PaymentRequirements>(v.clone()) {
                Ok(req) => Some(req),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unsupported payment option");
                    None
                }
            })
            .collect()
    }
}

/// Settlement result returned in the `X-Payment-Response` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(rename = "errorReason", default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl SettlementReceipt {
    pub fn from_header_value(value: &str) -> Option<Self> {
        let bytes = b64.decode(value.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::EvmSigner;
    use serde_json::json;

    fn base_requirements() -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": "base",
            "maxAmountRequired": "1000",
            "resource": "https://x402.asrai.me/api/trending/",
            "description": "Trending coins",
            "mimeType": "application/json",
            "payTo": "0x2222222222222222222222222222222222222222",
            "maxTimeoutSeconds": 300,
            "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "extra": {"name": "USD Coin", "version": "2"}
        })
    }

    #[test]
    fn test_money_to_token_amount() {
        let amount = MoneyAmount::try_from(0.01).unwrap();
        assert_eq!(amount.as_token_amount(6).unwrap(), TokenAmount(U256::from(10_000u64)));

        let tiny = MoneyAmount::try_from(0.001).unwrap();
        assert_eq!(tiny.as_token_amount(6).unwrap(), TokenAmount(U256::from(1_000u64)));

        assert!(MoneyAmount::try_from(-1.0).is_err());
    }

    #[test]
    fn test_required_response_skips_unknown_options() {
        let body = json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [
                {"scheme": "exact", "network": "solana", "maxAmountRequired": "1000"},
                base_requirements(),
            ]
        });
        let parsed: PaymentRequiredResponse = serde_json::from_value(body).unwrap();
        let reqs = parsed.requirements();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].network, Network::Base);
        assert_eq!(reqs[0].max_amount_required, TokenAmount(U256::from(1000u64)));
    }

    #[test]
    fn test_domain_falls_back_to_known_usdc() {
        let mut value = base_requirements();
        value.as_object_mut().unwrap().remove("extra");
        let req: PaymentRequirements = serde_json::from_value(value).unwrap();
        let domain = req.domain();
        assert_eq!(domain.name, "USD Coin");
        assert_eq!(domain.version, "2");
        assert_eq!(domain.chain_id, 8453);
    }

    #[tokio::test]
    async fn test_sign_and_header_roundtrip() {
        let signer = EvmSigner::random();
        let req: PaymentRequirements = serde_json::from_value(base_requirements()).unwrap();

        let payload = req.sign(&signer).await.unwrap();
        let auth = &payload.payload.authorization;
        assert_eq!(auth.from, signer.address());
        assert_eq!(auth.to, req.pay_to);
        assert!(auth.valid_before.0 - auth.valid_after.0 >= 600 + 300 - 1);
        assert_eq!(payload.payload.recover(&req.domain()).unwrap(), signer.address());

        let header = payload.to_header_value().unwrap();
        let decoded = PaymentPayload::from_header_value(&header).unwrap();
        assert_eq!(decoded, payload);

        // Wire format uses camelCase and string amounts
        let wire: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["x402Version"], 1);
        assert_eq!(wire["payload"]["authorization"]["value"], "1000");
    }

    #[test]
    fn test_settlement_receipt() {
        let raw = json!({"success": true, "transaction": "0xabc", "network": "base"}).to_string();
        let receipt = SettlementReceipt::from_header_value(&b64.encode(raw)).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.transaction.as_deref(), Some("0xabc"));
        assert!(SettlementReceipt::from_header_value("not base64!").is_none());
    }
}
