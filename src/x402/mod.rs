//! x402 payment protocol, client side
//!
//! - `types`: wire types and EIP-3009 payment signing
//! - `middleware`: reqwest middleware answering `402 Payment Required`
//! - `fetch`: the pay-and-fetch seam used by tool dispatch
//! - `client`: the HTTP implementation of that seam

pub mod client;
pub mod fetch;
pub mod middleware;
pub mod timestamp;
pub mod types;

pub use client::X402Fetcher;
pub use fetch::{FetchError, FetchRequest, PayAndFetch};
pub use middleware::{X402Payments, X402PaymentsError};
pub use timestamp::UnixTimestamp;
pub use types::{
    MoneyAmount, PaymentPayload, PaymentRequiredResponse, PaymentRequirements, PaymentSignError,
    TokenAmount, TokenAsset,
};
