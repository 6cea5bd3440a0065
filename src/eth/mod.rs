//! EVM primitives needed to pay for requests: keys, networks, USDC, EIP-712

pub mod eip712;
pub mod network;
pub mod signer;
pub mod usdc;

pub use eip712::{Eip712Domain, TransferWithAuthorization};
pub use network::Network;
pub use signer::{EvmSigner, Signer, recover_address};
