//! Message signing for the sign-in-with-wallet handshake.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Anything that can produce an EIP-191 personal signature over the
/// server-issued sign-in message. The REST client is generic over this so
/// callers can plug in hardware wallets or remote signers.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign the raw sign-in message, returning a 0x-prefixed hex signature.
    async fn sign_message(&self, message: &str) -> Result<String, SignerError>;
}

#[async_trait]
impl WalletSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        PrivateKeySigner::address(self)
    }

    async fn sign_message(&self, message: &str) -> Result<String, SignerError> {
        let signature = Signer::sign_message(self, message.as_bytes())
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn private_key_signer_produces_hex_signature() {
        let signer = PrivateKeySigner::random();
        let sig = WalletSigner::sign_message(&signer, "perpl sign-in: nonce abc")
            .await
            .unwrap();
        assert!(sig.starts_with("0x"));
        // 65-byte ECDSA signature -> 130 hex chars
        assert_eq!(sig.len(), 2 + 130);
    }
}
