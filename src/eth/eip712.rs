//! EIP-712 hashing and signing for EIP-3009 `TransferWithAuthorization`
//!
//! This is the authorization an x402 `exact` payment carries: the payer signs
//! a transfer of `value` USDC to the resource owner, valid inside a time window
//! and bound to a single-use random nonce.

use alloy_primitives::{keccak256, Address, B256, U256};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::x402::types::{HexEncodedNonce, TokenAmount};
use crate::x402::UnixTimestamp;

use super::signer::{recover_address, Signer};

static EIP712_DOMAIN_TYPE_HASH: Lazy<B256> = Lazy::new(|| {
    keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)")
});

static TRANSFER_WITH_AUTHORIZATION_TYPE_HASH: Lazy<B256> = Lazy::new(|| {
    keccak256("TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)")
});

/// Left-pad an address into a 32-byte ABI word
fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    word
}

/// EIP-712 domain of a token contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    /// The domain separator
    pub fn separator(&self) -> B256 {
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(EIP712_DOMAIN_TYPE_HASH.as_slice());
        encoded.extend_from_slice(keccak256(self.name.as_bytes()).as_slice());
        encoded.extend_from_slice(keccak256(self.version.as_bytes()).as_slice());
        encoded.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        encoded.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&encoded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferWithAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
    #[serde(rename = "validAfter")]
    pub valid_after: UnixTimestamp,
    #[serde(rename = "validBefore")]
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedTransferWithAuthorization {
    #[serde(with = "hex_signature")]
    pub signature: Vec<u8>,
    pub authorization: TransferWithAuthorization,
}

mod hex_signature {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

impl TransferWithAuthorization {
    fn struct_hash(&self) -> B256 {
        let mut encoded = Vec::with_capacity(7 * 32);
        encoded.extend_from_slice(TRANSFER_WITH_AUTHORIZATION_TYPE_HASH.as_slice());
        encoded.extend_from_slice(&address_word(&self.from));
        encoded.extend_from_slice(&address_word(&self.to));
        encoded.extend_from_slice(&self.value.0.to_be_bytes::<32>());
        encoded.extend_from_slice(&U256::from(self.valid_after.0).to_be_bytes::<32>());
        encoded.extend_from_slice(&U256::from(self.valid_before.0).to_be_bytes::<32>());
        encoded.extend_from_slice(&self.nonce.0);
        keccak256(&encoded)
    }

    /// `keccak256("\x19\x01" || domainSeparator || structHash)`
    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        let mut encoded = Vec::with_capacity(2 + 2 * 32);
        encoded.extend_from_slice(b"\x19\x01");
        encoded.extend_from_slice(domain.separator().as_slice());
        encoded.extend_from_slice(self.struct_hash().as_slice());
        keccak256(&encoded)
    }

    pub async fn sign(
        &self,
        domain: &Eip712Domain,
        signer: &dyn Signer,
    ) -> Result<SignedTransferWithAuthorization, Eip712Error> {
        if signer.address() != self.from {
            return Err(Eip712Error::WrongSigner {
                expected: self.from,
                actual: signer.address(),
            });
        }
        let signature = signer
            .sign_hash(&self.signing_hash(domain))
            .await
            .map_err(|e| Eip712Error::Signing(e.to_string()))?;

        Ok(SignedTransferWithAuthorization {
            signature: signature.as_bytes().to_vec(),
            authorization: self.clone(),
        })
    }
}

impl SignedTransferWithAuthorization {
    /// Recover the address that produced the signature
    pub fn recover(&self, domain: &Eip712Domain) -> Result<Address, Eip712Error> {
        let hash = self.authorization.signing_hash(domain);
        recover_address(&self.signature, &hash).map_err(|e| Eip712Error::Signing(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Eip712Error {
    #[error("Authorization is from {expected} but the signer is {actual}")]
    WrongSigner { expected: Address, actual: Address },
    #[error("Signing failed: {0}")]
    Signing(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::EvmSigner;
    use alloy_primitives::{address, b256};

    fn base_sepolia_usdc() -> Eip712Domain {
        Eip712Domain {
            name: "USDC".to_string(),
            version: "2".to_string(),
            chain_id: 84532,
            verifying_contract: address!("036CbD53842c5426634e7929541eC2318f3dCF7e"),
        }
    }

    #[test]
    fn test_type_hashes() {
        // Well-known constants from EIP-712 and FiatTokenV2
        assert_eq!(
            *EIP712_DOMAIN_TYPE_HASH,
            b256!("8b73c3c69bb8fe3d512ecc4cf759cc79239f7b179b0ffacaa9a75d522b39400f")
        );
        assert_eq!(
            *TRANSFER_WITH_AUTHORIZATION_TYPE_HASH,
            b256!("7c7c6cdb67a18743f49ec6fa9b35f50d52ed05cbed4cc592e13b44501c1a2267")
        );
    }

    #[tokio::test]
    async fn test_sign_recovers_payer() {
        let signer = EvmSigner::random();
        let auth = TransferWithAuthorization {
            from: signer.address(),
            to: address!("2222222222222222222222222222222222222222"),
            value: TokenAmount(U256::from(1000u64)),
            valid_after: UnixTimestamp(0),
            valid_before: UnixTimestamp(u64::MAX),
            nonce: HexEncodedNonce([7u8; 32]),
        };
        let domain = base_sepolia_usdc();

        let signed = auth.sign(&domain, &signer).await.unwrap();
        assert_eq!(signed.signature.len(), 65);
        assert_eq!(signed.recover(&domain).unwrap(), signer.address());

        // A different domain yields a different signer
        let mut other = domain.clone();
        other.chain_id = 8453;
        assert_ne!(signed.recover(&other).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn test_sign_rejects_foreign_authorization() {
        let signer = EvmSigner::random();
        let auth = TransferWithAuthorization {
            from: address!("1111111111111111111111111111111111111111"),
            to: address!("2222222222222222222222222222222222222222"),
            value: TokenAmount(U256::from(1u64)),
            valid_after: UnixTimestamp(0),
            valid_before: UnixTimestamp(10),
            nonce: HexEncodedNonce([0u8; 32]),
        };
        assert!(matches!(
            auth.sign(&base_sepolia_usdc(), &signer).await,
            Err(Eip712Error::WrongSigner { .. })
        ));
    }
}
