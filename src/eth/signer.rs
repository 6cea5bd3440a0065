//! secp256k1 wallet keys for signing x402 payments
//!
//! A wallet credential is a raw 32-byte private key, usually supplied as
//! `0x`-prefixed hex. Only what the payment flow needs is implemented:
//! parsing, generation, address derivation and prehash signing.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, Address, Signature, B256};
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};

/// An Ethereum private key with its cached address
#[derive(Clone)]
pub struct EvmSigner {
    key: SigningKey,
    address: Address,
}

impl EvmSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Generate a fresh wallet from the OS RNG
    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Parse a 32-byte key from hex, with or without the `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, SignerError> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if digits.len() != 64 {
            return Err(SignerError::InvalidLength(digits.len()));
        }
        let bytes = hex::decode(digits).map_err(|_| SignerError::InvalidHex)?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::new(key))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The private key as `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        let bytes: [u8; 32] = self.key.to_bytes().into();
        format!("0x{}", hex::encode(bytes))
    }

    /// Sign a 32-byte prehash, returning an (r, s, v) signature with v in {27, 28}
    pub fn sign_prehash(&self, hash: &B256) -> Result<Signature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|_| SignerError::SigningFailed)?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + 27;

        Signature::try_from(&bytes[..]).map_err(|_| SignerError::InvalidSignature)
    }
}

impl FromStr for EvmSigner {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Never print key material
impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derive the Ethereum address of a public key: last 20 bytes of keccak(x || y)
fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Private key must be 64 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("Private key is not valid hex")]
    InvalidHex,
    #[error("Private key is not a valid secp256k1 scalar")]
    InvalidKey,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Invalid signature format")]
    InvalidSignature,
    #[error("Signature recovery failed")]
    RecoveryFailed,
}

/// Recover the signer address of a 65-byte (r, s, v) signature over a prehash
pub fn recover_address(signature: &[u8], hash: &B256) -> Result<Address, SignerError> {
    if signature.len() != 65 {
        return Err(SignerError::InvalidSignature);
    }
    let sig = k256::ecdsa::Signature::from_slice(&signature[..64])
        .map_err(|_| SignerError::InvalidSignature)?;
    let v = signature[64];
    let recid = RecoveryId::from_byte(v.checked_sub(27).unwrap_or(v))
        .ok_or(SignerError::RecoveryFailed)?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recid)
        .map_err(|_| SignerError::RecoveryFailed)?;
    Ok(address_of(&key))
}

/// Anything that can authorize a payment
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, SignerError>;
}

#[async_trait::async_trait]
impl Signer for EvmSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, SignerError> {
        self.sign_prehash(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_known_address() {
        let signer: EvmSigner = KEY_ONE.parse().unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_prefix_optional() {
        let with = EvmSigner::from_hex(KEY_ONE).unwrap();
        let without = EvmSigner::from_hex(KEY_ONE.trim_start_matches("0x")).unwrap();
        assert_eq!(with.address(), without.address());
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert!(matches!(EvmSigner::from_hex("0x1234"), Err(SignerError::InvalidLength(4))));
        assert!(matches!(
            EvmSigner::from_hex(&format!("0x{}", "zz".repeat(32))),
            Err(SignerError::InvalidHex)
        ));
        // zero is not a valid scalar
        assert!(matches!(
            EvmSigner::from_hex(&format!("0x{}", "00".repeat(32))),
            Err(SignerError::InvalidKey)
        ));
    }

    #[test]
    fn test_hex_roundtrip() {
        let signer = EvmSigner::random();
        let hex = signer.to_hex();
        assert_eq!(hex.len(), 66);
        assert_eq!(EvmSigner::from_hex(&hex).unwrap().address(), signer.address());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = EvmSigner::from_hex(KEY_ONE).unwrap();
        let debug = format!("{signer:?}");
        assert!(!debug.contains(&"0".repeat(63)));
        assert!(debug.contains("address"));
    }

    #[tokio::test]
    async fn test_sign_and_recover() {
        let signer = EvmSigner::random();
        let hash = keccak256(b"asrai");

        let signature = signer.sign_hash(&hash).await.unwrap();
        let bytes = signature.as_bytes();
        assert_eq!(bytes.len(), 65);
        assert!(bytes[64] == 27 || bytes[64] == 28);
        assert_eq!(recover_address(&bytes, &hash).unwrap(), signer.address());
    }
}
