//! Polkadot provider over the Substrate JSON-RPC API.

use std::sync::Arc;

use async_trait::async_trait;
use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use serde_json::json;
use tracing::debug;

use super::{parse_hex_u128, signing, ChainProvider, ProviderBase, RpcTransport};
use crate::error::{Result, WalletCoreError};
use crate::keys::address;
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest};

type Blake2b128 = Blake2b<U16>;

/// `twox128("System") ++ twox128("Account")`.
const SYSTEM_ACCOUNT_PREFIX: &str = "26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9";

/// Typical partial fee of a balances transfer, in planck.
pub const TRANSFER_FEE_PLANCK: u128 = 160_000_000;

pub struct PolkadotProvider {
    base: ProviderBase,
}

impl PolkadotProvider {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            base: ProviderBase::new(Chain::Polkadot, transport),
        }
    }

    /// 32-byte account id inside an SS58 address.
    fn account_id(&self, ss58: &str) -> Result<[u8; 32]> {
        if !address::validate_ss58_address(ss58) {
            return Err(WalletCoreError::invalid_input(format!("not an SS58 address: {}", ss58)));
        }
        let raw = bs58::decode(ss58)
            .into_vec()
            .map_err(|e| WalletCoreError::invalid_input(format!("bad base58: {}", e)))?;
        // prefix (one or two bytes), account id, two checksum bytes
        let start = raw.len() - 34;
        let mut id = [0u8; 32];
        id.copy_from_slice(&raw[start..start + 32]);
        Ok(id)
    }

    /// `System.Account` storage key for `account`.
    pub(crate) fn account_storage_key(account: &[u8; 32]) -> String {
        let mut hasher = Blake2b128::new();
        hasher.update(account);
        let digest = hasher.finalize();
        format!(
            "0x{}{}{}",
            SYSTEM_ACCOUNT_PREFIX,
            hex::encode(digest),
            hex::encode(account)
        )
    }

    /// `free` balance from SCALE-encoded `AccountInfo`.
    pub(crate) fn free_balance(encoded: &str) -> Option<u128> {
        let bytes = hex::decode(encoded.strip_prefix("0x").unwrap_or(encoded)).ok()?;
        // nonce, consumers, providers, sufficients: four u32s
        let free = bytes.get(16..32)?;
        let mut le = [0u8; 16];
        le.copy_from_slice(free);
        Some(u128::from_le_bytes(le))
    }
}

#[async_trait]
impl ChainProvider for PolkadotProvider {
    fn chain(&self) -> Chain {
        Chain::Polkadot
    }

    async fn connect(&self) -> Result<()> {
        self.base.connect_with(self.get_block_number()).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.base.disconnect();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.base.is_connected()
    }

    async fn get_balance(&self, address: &str) -> Result<String> {
        let account = self.account_id(address)?;
        let key = Self::account_storage_key(&account);
        let stored = self.base.transport.call("state_getStorage", json!([key])).await?;
        // Absent storage means the account was never endowed.
        let free = match stored.as_str() {
            None if stored.is_null() => 0,
            Some(encoded) => Self::free_balance(encoded)
                .ok_or_else(|| self.base.unexpected("state_getStorage", &stored))?,
            None => return Err(self.base.unexpected("state_getStorage", &stored)),
        };
        Ok(free.to_string())
    }

    async fn send_transaction(&self, _from: &str, request: &TransactionRequest) -> Result<String> {
        self.base.check_request(request)?;
        Err(self.base.no_node_signing())
    }

    async fn sign_transaction(&self, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction> {
        signing::sign_request(Chain::Polkadot, request, private_key)
    }

    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String> {
        let hash = self
            .base
            .transport
            .call("author_submitExtrinsic", json!([signed.signed_tx]))
            .await?;
        match hash.as_str() {
            Some(h) => Ok(h.to_string()),
            None => signing::transaction_hash(Chain::Polkadot, signed),
        }
    }

    async fn get_transaction_history(&self, address: &str, _limit: usize) -> Result<Vec<Transaction>> {
        debug!(chain = "polkadot", address, "history requires an indexer; returning none");
        Ok(Vec::new())
    }

    async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate> {
        self.base.check_request(request)?;
        Ok(self.base.fee(TRANSFER_FEE_PLANCK))
    }

    fn validate_address(&self, address: &str) -> bool {
        address::validate_ss58_address(address)
    }

    async fn get_block_number(&self) -> Result<u64> {
        let header = self.base.transport.call("chain_getHeader", json!([])).await?;
        header["number"]
            .as_str()
            .and_then(parse_hex_u128)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| self.base.unexpected("chain_getHeader", &header))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        // Extrinsics are not indexed by hash on a plain node.
        debug!(chain = "polkadot", hash, "lookup by hash requires an indexer");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ed25519;
    use crate::providers::MockTransport;
    use serde_json::Value;

    fn sample_address() -> String {
        ed25519::polkadot_address(&ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]))
    }

    #[test]
    fn test_free_balance_decoding() {
        let mut info = vec![0u8; 16];
        info.extend_from_slice(&1_000_000_000_000u128.to_le_bytes());
        info.extend_from_slice(&[0u8; 48]);
        let encoded = format!("0x{}", hex::encode(info));
        assert_eq!(PolkadotProvider::free_balance(&encoded), Some(1_000_000_000_000));
        assert_eq!(PolkadotProvider::free_balance("0x00"), None);
    }

    #[test]
    fn test_storage_key_layout() {
        let key = PolkadotProvider::account_storage_key(&[1u8; 32]);
        // 0x + 32-byte prefix + 16-byte hash + 32-byte account
        assert_eq!(key.len(), 2 + 64 + 32 + 64);
        assert!(key.ends_with(&hex::encode([1u8; 32])));
    }

    #[tokio::test]
    async fn test_unendowed_account_has_zero_balance() {
        let p = PolkadotProvider::new(Arc::new(
            MockTransport::new(Chain::Polkadot).with("state_getStorage", Value::Null),
        ));
        assert_eq!(p.get_balance(&sample_address()).await.unwrap(), "0");
    }

    #[tokio::test]
    async fn test_block_number_from_header() {
        let p = PolkadotProvider::new(Arc::new(
            MockTransport::new(Chain::Polkadot).with("chain_getHeader", json!({ "number": "0x1a2b" })),
        ));
        assert_eq!(p.get_block_number().await.unwrap(), 0x1a2b);
    }

    #[tokio::test]
    async fn test_rejects_foreign_address() {
        let p = PolkadotProvider::new(Arc::new(MockTransport::new(Chain::Polkadot)));
        assert!(p.get_balance("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").await.is_err());
    }
}
