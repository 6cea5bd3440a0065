//! EVM networks that can settle x402 payments for the Asrai API

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Networks an x402 payment requirement may name.
///
/// Serialized with the lowercase kebab-case identifiers used on the wire
/// (`"base"`, `"base-sepolia"`, ...).
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    #[serde(rename = "ethereum")]
    Ethereum,
    #[serde(rename = "polygon")]
    Polygon,
    #[serde(rename = "arbitrum")]
    Arbitrum,
    #[serde(rename = "avalanche")]
    Avalanche,
    #[serde(rename = "optimism")]
    Optimism,
}

impl Network {
    /// Every supported network, mainnets first
    pub const ALL: &'static [Network] = &[
        Network::Base,
        Network::Ethereum,
        Network::Polygon,
        Network::Arbitrum,
        Network::Avalanche,
        Network::Optimism,
        Network::BaseSepolia,
    ];

    /// EVM chain ID used in the EIP-712 domain
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Base => 8453,
            Network::BaseSepolia => 84532,
            Network::Ethereum => 1,
            Network::Polygon => 137,
            Network::Arbitrum => 42161,
            Network::Avalanche => 43114,
            Network::Optimism => 10,
        }
    }

    /// Wire identifier
    pub fn name(&self) -> &'static str {
        match self {
            Network::Base => "base",
            Network::BaseSepolia => "base-sepolia",
            Network::Ethereum => "ethereum",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
            Network::Avalanche => "avalanche",
            Network::Optimism => "optimism",
        }
    }

    /// Parse a network identifier (case-insensitive)
    pub fn parse(s: &str) -> Option<Network> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().find(|n| n.name() == s)
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network() {
        assert_eq!(Network::parse("base"), Some(Network::Base));
        assert_eq!(Network::parse("Base-Sepolia"), Some(Network::BaseSepolia));
        assert!(Network::parse("solana").is_none());
    }

    #[test]
    fn test_chain_id() {
        assert_eq!(Network::Base.chain_id(), 8453);
        assert_eq!(Network::BaseSepolia.chain_id(), 84532);
    }

    #[test]
    fn test_serde_names() {
        let n: Network = serde_json::from_str("\"base-sepolia\"").unwrap();
        assert_eq!(n, Network::BaseSepolia);
        assert_eq!(serde_json::to_string(&Network::Base).unwrap(), "\"base\"");
        assert!(serde_json::from_str::<Network>("\"solana\"").is_err());
    }
}
