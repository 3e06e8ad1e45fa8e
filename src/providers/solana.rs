//! Solana provider over the Solana JSON-RPC API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{json_u128, signing, unix_seconds, ChainProvider, ProviderBase, RpcTransport};
use crate::error::Result;
use crate::keys::address;
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest, TxStatus};

/// Base fee per signature, in lamports.
pub const LAMPORTS_PER_SIGNATURE: u128 = 5_000;

pub struct SolanaProvider {
    base: ProviderBase,
}

impl SolanaProvider {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            base: ProviderBase::new(Chain::Solana, transport),
        }
    }

    fn status_of(err: &Value) -> TxStatus {
        if err.is_null() {
            TxStatus::Confirmed
        } else {
            TxStatus::Failed
        }
    }
}

#[async_trait]
impl ChainProvider for SolanaProvider {
    fn chain(&self) -> Chain {
        Chain::Solana
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
        let result = self.base.transport.call("getBalance", json!([address])).await?;
        // Responses are wrapped in {context, value}.
        let lamports = json_u128(&result["value"])
            .or_else(|| json_u128(&result))
            .ok_or_else(|| self.base.unexpected("getBalance", &result))?;
        Ok(lamports.to_string())
    }

    async fn send_transaction(&self, _from: &str, request: &TransactionRequest) -> Result<String> {
        self.base.check_request(request)?;
        Err(self.base.no_node_signing())
    }

    async fn sign_transaction(&self, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction> {
        signing::sign_request(Chain::Solana, request, private_key)
    }

    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String> {
        let result = self
            .base
            .transport
            .call(
                "sendTransaction",
                json!([signed.signed_tx, { "encoding": "base64" }]),
            )
            .await?;
        match result.as_str() {
            Some(sig) => Ok(sig.to_string()),
            None => signing::transaction_hash(Chain::Solana, signed),
        }
    }

    async fn get_transaction_history(&self, address: &str, limit: usize) -> Result<Vec<Transaction>> {
        let result = self
            .base
            .transport
            .call("getSignaturesForAddress", json!([address, { "limit": limit }]))
            .await?;
        let entries = result
            .as_array()
            .ok_or_else(|| self.base.unexpected("getSignaturesForAddress", &result))?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                Some(Transaction {
                    hash: entry["signature"].as_str()?.to_string(),
                    from: address.to_string(),
                    to: String::new(),
                    amount: "0".into(),
                    chain: Chain::Solana,
                    timestamp: unix_seconds(entry["blockTime"].as_i64().unwrap_or(0)),
                    status: Self::status_of(&entry["err"]),
                    fee: LAMPORTS_PER_SIGNATURE.to_string(),
                })
            })
            .take(limit)
            .collect())
    }

    async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate> {
        self.base.check_request(request)?;
        Ok(self.base.fee(LAMPORTS_PER_SIGNATURE))
    }

    fn validate_address(&self, address: &str) -> bool {
        address::validate_solana_address(address)
    }

    async fn get_block_number(&self) -> Result<u64> {
        let slot = self.base.transport.call("getSlot", json!([])).await?;
        slot.as_u64().ok_or_else(|| self.base.unexpected("getSlot", &slot))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        let tx = self
            .base
            .transport
            .call(
                "getTransaction",
                json!([hash, { "encoding": "json", "maxSupportedTransactionVersion": 0 }]),
            )
            .await?;
        if tx.is_null() {
            return Ok(None);
        }

        let keys = tx["transaction"]["message"]["accountKeys"]
            .as_array()
            .ok_or_else(|| self.base.unexpected("getTransaction", &tx))?;
        let key_at = |i: usize| keys.get(i).and_then(Value::as_str).unwrap_or_default().to_string();

        let meta = &tx["meta"];
        let balance = |field: &str| meta[field][1].as_u64().map(u128::from).unwrap_or(0);
        let amount = balance("postBalances").saturating_sub(balance("preBalances"));

        Ok(Some(Transaction {
            hash: hash.to_string(),
            from: key_at(0),
            to: key_at(1),
            amount: amount.to_string(),
            chain: Chain::Solana,
            timestamp: unix_seconds(tx["blockTime"].as_i64().unwrap_or(0)),
            status: Self::status_of(&meta["err"]),
            fee: meta["fee"].as_u64().unwrap_or(0).to_string(),
        }))
    }
}
