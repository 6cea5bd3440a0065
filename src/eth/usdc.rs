use alloy_primitives::{address, Address};

use crate::x402::types::TokenAsset;

use super::Network;

/// A known USDC deployment.
///
/// Used to size the per-payment cap in token units and to label payments in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsdcDeployment {
    pub network: Network,
    pub address: Address,
    /// EIP-712 domain name ("USD Coin" on mainnets, "USDC" on testnets)
    pub eip712_name: &'static str,
}

impl UsdcDeployment {
    pub const DECIMALS: u8 = 6;
    pub const EIP712_VERSION: &'static str = "2";

    pub fn asset(&self) -> TokenAsset {
        TokenAsset {
            address: self.address,
            network: self.network,
        }
    }
}

// Circle deployments, see https://developers.circle.com/stablecoins/usdc-contract-addresses
const DEPLOYMENTS: &[UsdcDeployment] = &[
    UsdcDeployment {
        network: Network::Base,
        address: address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        eip712_name: "USD Coin",
    },
    UsdcDeployment {
        network: Network::Ethereum,
        address: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        eip712_name: "USD Coin",
    },
    UsdcDeployment {
        network: Network::Polygon,
        address: address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
        eip712_name: "USD Coin",
    },
    UsdcDeployment {
        network: Network::Arbitrum,
        address: address!("af88d065e77c8cC2239327C5EDb3A432268e5831"),
        eip712_name: "USD Coin",
    },
    UsdcDeployment {
        network: Network::Avalanche,
        address: address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
        eip712_name: "USD Coin",
    },
    UsdcDeployment {
        network: Network::Optimism,
        address: address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
        eip712_name: "USD Coin",
    },
    UsdcDeployment {
        network: Network::BaseSepolia,
        address: address!("036CbD53842c5426634e7929541eC2318f3dCF7e"),
        eip712_name: "USDC",
    },
];

/// USDC deployment on the given network, if any
pub fn by_network(network: Network) -> Option<&'static UsdcDeployment> {
    DEPLOYMENTS.iter().find(|d| d.network == network)
}

/// USDC deployment matching an x402 asset, if the asset is USDC at all
pub fn by_asset(asset: &TokenAsset) -> Option<&'static UsdcDeployment> {
    by_network(asset.network).filter(|d| d.address == asset.address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_network_has_usdc() {
        for network in Network::ALL {
            assert!(by_network(*network).is_some(), "missing USDC on {network}");
        }
    }

    #[test]
    fn test_by_asset() {
        let base = by_network(Network::Base).unwrap();
        assert!(by_asset(&base.asset()).is_some());

        let wrong_network = TokenAsset {
            address: base.address,
            network: Network::BaseSepolia,
        };
        assert!(by_asset(&wrong_network).is_none());
    }

    #[test]
    fn test_testnet_domain_name() {
        assert_eq!(by_network(Network::BaseSepolia).unwrap().eip712_name, "USDC");
        assert_eq!(by_network(Network::Base).unwrap().eip712_name, "USD Coin");
    }
}
