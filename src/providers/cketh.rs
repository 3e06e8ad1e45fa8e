//! ckETH provider over Ethereum-style JSON-RPC.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_hex_u128, signing, ChainProvider, ProviderBase, RpcTransport};
use crate::error::{Result, WalletCoreError};
use crate::keys::address;
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest, TxStatus};

/// Gas used by a plain value transfer.
const TRANSFER_GAS: u128 = 21_000;

pub struct CkEthProvider {
    base: ProviderBase,
}

impl CkEthProvider {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            base: ProviderBase::new(Chain::CkEth, transport),
        }
    }

    async fn hex_call(&self, method: &str, params: Value) -> Result<u128> {
        let value = self.base.transport.call(method, params).await?;
        value
            .as_str()
            .and_then(parse_hex_u128)
            .ok_or_else(|| self.base.unexpected(method, &value))
    }

    fn to_transaction(&self, tx: &Value) -> Option<Transaction> {
        let gas = tx["gas"].as_str().and_then(parse_hex_u128).unwrap_or(0);
        let gas_price = tx["gasPrice"].as_str().and_then(parse_hex_u128).unwrap_or(0);
        let status = if tx["blockNumber"].is_null() {
            TxStatus::Pending
        } else {
            TxStatus::Confirmed
        };
        Some(Transaction {
            hash: tx["hash"].as_str()?.to_string(),
            from: tx["from"].as_str()?.to_string(),
            to: tx["to"].as_str().unwrap_or_default().to_string(),
            amount: tx["value"].as_str().and_then(parse_hex_u128)?.to_string(),
            chain: Chain::CkEth,
            timestamp: Utc::now(),
            status,
            fee: gas.saturating_mul(gas_price).to_string(),
        })
    }
}

#[async_trait]
impl ChainProvider for CkEthProvider {
    fn chain(&self) -> Chain {
        Chain::CkEth
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
        let wei = self.hex_call("eth_getBalance", json!([address, "latest"])).await?;
        Ok(wei.to_string())
    }

    async fn send_transaction(&self, from: &str, request: &TransactionRequest) -> Result<String> {
        self.base.check_request(request)?;
        let mut tx = json!({
            "from": from,
            "to": request.to,
            "value": format!("0x{:x}", request.amount_units()?),
        });
        if let Some(gas) = &request.gas_limit {
            tx["gas"] = json!(format!("0x{:x}", gas.parse::<u128>().unwrap_or(TRANSFER_GAS)));
        }
        let hash = self.base.transport.call("eth_sendTransaction", json!([tx])).await?;
        hash.as_str()
            .map(str::to_string)
            .ok_or_else(|| self.base.unexpected("eth_sendTransaction", &hash))
    }

    async fn sign_transaction(&self, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction> {
        signing::sign_request(Chain::CkEth, request, private_key)
    }

    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String> {
        let hash = self
            .base
            .transport
            .call("eth_sendRawTransaction", json!([signed.signed_tx]))
            .await?;
        match hash.as_str() {
            Some(h) => Ok(h.to_string()),
            None => signing::transaction_hash(Chain::CkEth, signed),
        }
    }

    async fn get_transaction_history(&self, address: &str, _limit: usize) -> Result<Vec<Transaction>> {
        // Plain JSON-RPC has no address index.
        debug!(chain = "cketh", address, "history requires an indexer; returning none");
        Ok(Vec::new())
    }

    async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate> {
        self.base.check_request(request)?;
        let gas_price = match &request.gas_price {
            Some(p) => p.parse::<u128>().map_err(|_| WalletCoreError::invalid_input("gas_price must be an integer"))?,
            None => self.hex_call("eth_gasPrice", json!([])).await?,
        };
        let gas = match &request.gas_limit {
            Some(g) => g.parse::<u128>().map_err(|_| WalletCoreError::invalid_input("gas_limit must be an integer"))?,
            None => {
                let call = json!({
                    "to": request.to,
                    "value": format!("0x{:x}", request.amount_units()?),
                });
                self.hex_call("eth_estimateGas", json!([call]))
                    .await
                    .unwrap_or(TRANSFER_GAS)
            }
        };
        Ok(self.base.fee(gas.saturating_mul(gas_price)))
    }

    fn validate_address(&self, address: &str) -> bool {
        address::validate_eth_address(address)
    }

    async fn get_block_number(&self) -> Result<u64> {
        let height = self.hex_call("eth_blockNumber", json!([])).await?;
        u64::try_from(height).map_err(|_| WalletCoreError::provider(Chain::CkEth, "block number overflow"))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        let tx = self
            .base
            .transport
            .call("eth_getTransactionByHash", json!([hash]))
            .await?;
        if tx.is_null() {
            return Ok(None);
        }
        self.to_transaction(&tx)
            .map(Some)
            .ok_or_else(|| self.base.unexpected("eth_getTransactionByHash", &tx))
    }
}
