use axum::Json;

use crate::eth::EvmSigner;
use crate::webapp::models::WalletResponse;

/// A new random wallet
pub fn generate_wallet() -> WalletResponse {
    let signer = EvmSigner::random();
    WalletResponse {
        address: signer.address().to_checksum(None),
        private_key: signer.to_hex(),
    }
}

/// Generate a fresh wallet
///
/// Needs no key and creates no session. The key is returned once and not stored.
#[utoipa::path(
    post,
    path = "/generate-wallet",
    tag = "Wallet",
    responses(
        (status = 200, description = "New wallet", body = WalletResponse)
    )
)]
pub async fn generate_wallet_handler() -> Json<WalletResponse> {
    let wallet = generate_wallet();
    tracing::info!(address = %wallet.address, "Generated wallet");
    Json(wallet)
}
