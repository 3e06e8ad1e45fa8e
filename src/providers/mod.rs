//! Per-chain node providers behind one async trait.
//!
//! Providers are created only through [`ProviderFactory`]. Each holds an
//! injected [`RpcTransport`] and an atomic connection flag; signing is local
//! and never leaves the process.

pub mod arweave;
pub mod cketh;
pub mod factory;
pub mod icp;
pub mod polkadot;
pub mod signing;
pub mod solana;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, WalletCoreError};
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest};

pub use arweave::ArweaveProvider;
pub use cketh::CkEthProvider;
pub use factory::ProviderFactory;
pub use icp::IcpProvider;
pub use polkadot::PolkadotProvider;
pub use solana::SolanaProvider;
pub use transport::{HttpTransport, MockTransport, RpcTransport};

/// Uniform view of one chain's node.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn chain(&self) -> Chain;

    /// Idempotent; reads the block height once.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Balance in chain-native base units, as a decimal string.
    async fn get_balance(&self, address: &str) -> Result<String>;

    /// Ask the node to sign and submit for a node-managed account.
    async fn send_transaction(&self, from: &str, request: &TransactionRequest) -> Result<String>;

    async fn sign_transaction(&self, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction>;

    /// Submit a signed transaction; returns its hash.
    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String>;

    /// Most recent first.
    async fn get_transaction_history(&self, address: &str, limit: usize) -> Result<Vec<Transaction>>;

    async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate>;

    fn validate_address(&self, address: &str) -> bool;

    async fn get_block_number(&self) -> Result<u64>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>>;
}

pub type SharedProvider = Arc<dyn ChainProvider>;

/// Shared state of every concrete provider.
pub(crate) struct ProviderBase {
    pub(crate) chain: Chain,
    pub(crate) transport: Arc<dyn RpcTransport>,
    connected: AtomicBool,
}

impl ProviderBase {
    pub(crate) fn new(chain: Chain, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            chain,
            transport,
            connected: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark connected once `height_read` succeeds.
    pub(crate) async fn connect_with<F>(&self, height_read: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<u64>> + Send,
    {
        if self.is_connected() {
            return Ok(());
        }
        let height = height_read.await?;
        self.connected.store(true, Ordering::SeqCst);
        info!(chain = %self.chain, height, "provider connected");
        Ok(())
    }

    pub(crate) fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(chain = %self.chain, "provider disconnected");
        }
    }

    pub(crate) fn fee(&self, amount: u128) -> FeeEstimate {
        FeeEstimate {
            chain: self.chain,
            amount: amount.to_string(),
            symbol: self.chain.symbol().to_string(),
        }
    }

    pub(crate) fn unexpected(&self, what: &str, value: &Value) -> WalletCoreError {
        WalletCoreError::provider(self.chain, format!("unexpected {} response: {}", what, value))
    }

    pub(crate) fn no_node_signing(&self) -> WalletCoreError {
        WalletCoreError::provider(
            self.chain,
            "node does not hold account keys; sign locally and broadcast",
        )
    }

    pub(crate) fn check_request(&self, request: &TransactionRequest) -> Result<()> {
        if request.chain != self.chain {
            return Err(WalletCoreError::invalid_input(format!(
                "request for {} sent to the {} provider",
                request.chain, self.chain
            )));
        }
        request.validate()
    }
}

/// `"0x1f"` -> 31.
pub(crate) fn parse_hex_u128(value: &str) -> Option<u128> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}

/// Decimal integer carried as a JSON number or string.
pub(crate) fn json_u128(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn unix_seconds(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u128("0x1f"), Some(31));
        assert_eq!(parse_hex_u128("0x"), Some(0));
        assert_eq!(parse_hex_u128("zz"), None);
    }

    #[test]
    fn test_json_u128() {
        assert_eq!(json_u128(&json!(5)), Some(5));
        assert_eq!(json_u128(&json!("12345678901234567890")), Some(12345678901234567890));
        assert_eq!(json_u128(&json!(null)), None);
    }
}
