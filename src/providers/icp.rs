//! ICP provider over the Rosetta API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{json_u128, signing, ChainProvider, ProviderBase, RpcTransport};
use crate::error::{Result, WalletCoreError};
use crate::keys::address;
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest, TxStatus};

/// Ledger transfer fee, in e8s.
pub const TRANSFER_FEE_E8S: u128 = 10_000;

const BLOCKCHAIN: &str = "Internet Computer";
const MAINNET_NETWORK: &str = "00000000000000020101";

pub struct IcpProvider {
    base: ProviderBase,
}

impl IcpProvider {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            base: ProviderBase::new(Chain::Icp, transport),
        }
    }

    fn network_identifier() -> Value {
        json!({ "blockchain": BLOCKCHAIN, "network": MAINNET_NETWORK })
    }

    /// Ledger account id for a principal or an account id.
    fn account_id(address: &str) -> Result<String> {
        if address::validate_icp_account_id(address) {
            return Ok(address.to_string());
        }
        address::principal_from_text(address)
            .map(|principal| address::icp_account_identifier(&principal))
            .ok_or_else(|| WalletCoreError::invalid_input(format!("not an ICP principal or account id: {}", address)))
    }

    async fn search(&self, filter: Value) -> Result<Vec<Transaction>> {
        let mut body = json!({ "network_identifier": Self::network_identifier() });
        if let (Some(target), Some(extra)) = (body.as_object_mut(), filter.as_object()) {
            target.extend(extra.clone());
        }
        let result = self.base.transport.post("/search/transactions", body).await?;
        let entries = result["transactions"]
            .as_array()
            .ok_or_else(|| self.base.unexpected("search/transactions", &result))?;
        Ok(entries.iter().filter_map(Self::to_transaction).collect())
    }

    /// Rosetta block transaction -> canonical transaction.
    ///
    /// The debit leg names the sender, the credit leg the recipient.
    fn to_transaction(entry: &Value) -> Option<Transaction> {
        let tx = &entry["transaction"];
        let hash = tx["transaction_identifier"]["hash"].as_str()?.to_string();
        let ops = tx["operations"].as_array()?;

        let mut from = String::new();
        let mut to = String::new();
        let mut amount = 0u128;
        let mut fee = 0u128;
        let mut failed = false;
        for op in ops {
            let value = op["amount"]["value"].as_str().unwrap_or("0");
            let account = op["account"]["address"].as_str().unwrap_or_default();
            if op["status"].as_str().is_some_and(|s| !s.eq_ignore_ascii_case("COMPLETED")) {
                failed = true;
            }
            match (op["type"].as_str(), value.strip_prefix('-')) {
                (Some("FEE"), Some(abs)) => fee = abs.parse().unwrap_or(0),
                (Some("TRANSACTION"), Some(_)) => from = account.to_string(),
                (Some("TRANSACTION"), None) => {
                    to = account.to_string();
                    amount = value.parse().unwrap_or(0);
                }
                _ => {}
            }
        }

        // Rosetta timestamps are nanoseconds since the epoch.
        let nanos = tx["metadata"]["timestamp"].as_i64().unwrap_or(0);
        Some(Transaction {
            hash,
            from,
            to,
            amount: amount.to_string(),
            chain: Chain::Icp,
            timestamp: super::unix_seconds(nanos / 1_000_000_000),
            status: if failed { TxStatus::Failed } else { TxStatus::Confirmed },
            fee: fee.to_string(),
        })
    }
}

#[async_trait]
impl ChainProvider for IcpProvider {
    fn chain(&self) -> Chain {
        Chain::Icp
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
        let body = json!({
            "network_identifier": Self::network_identifier(),
            "account_identifier": { "address": Self::account_id(address)? },
        });
        let result = self.base.transport.post("/account/balance", body).await?;
        let e8s = json_u128(&result["balances"][0]["value"])
            .ok_or_else(|| self.base.unexpected("account/balance", &result))?;
        Ok(e8s.to_string())
    }

    async fn send_transaction(&self, _from: &str, request: &TransactionRequest) -> Result<String> {
        self.base.check_request(request)?;
        Err(self.base.no_node_signing())
    }

    async fn sign_transaction(&self, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction> {
        signing::sign_request(Chain::Icp, request, private_key)
    }

    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String> {
        let body = json!({
            "network_identifier": Self::network_identifier(),
            "signed_transaction": signed.signed_tx,
        });
        let result = self.base.transport.post("/construction/submit", body).await?;
        match result["transaction_identifier"]["hash"].as_str() {
            Some(hash) => Ok(hash.to_string()),
            None => signing::transaction_hash(Chain::Icp, signed),
        }
    }

    async fn get_transaction_history(&self, address: &str, limit: usize) -> Result<Vec<Transaction>> {
        let filter = json!({
            "account_identifier": { "address": Self::account_id(address)? },
            "limit": limit,
        });
        let mut history = self.search(filter).await?;
        history.truncate(limit);
        Ok(history)
    }

    async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate> {
        self.base.check_request(request)?;
        Ok(self.base.fee(TRANSFER_FEE_E8S))
    }

    fn validate_address(&self, address: &str) -> bool {
        address::validate_icp_principal(address) || address::validate_icp_account_id(address)
    }

    async fn get_block_number(&self) -> Result<u64> {
        let body = json!({ "network_identifier": Self::network_identifier() });
        let status = self.base.transport.post("/network/status", body).await?;
        status["current_block_identifier"]["index"]
            .as_u64()
            .ok_or_else(|| self.base.unexpected("network/status", &status))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        let filter = json!({ "transaction_identifier": { "hash": hash } });
        Ok(self.search(filter).await?.into_iter().next())
    }
}
