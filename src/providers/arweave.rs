//! Arweave provider over the gateway HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use super::{json_u128, signing, unix_seconds, ChainProvider, ProviderBase, RpcTransport};
use crate::error::Result;
use crate::keys::address;
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest, TxStatus};

const HISTORY_QUERY: &str = "query($owners: [String!], $first: Int) { \
    transactions(owners: $owners, first: $first) { edges { node { \
    id recipient owner { address } quantity { winston } fee { winston } \
    block { timestamp height } } } } }";

pub struct ArweaveProvider {
    base: ProviderBase,
}

impl ArweaveProvider {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            base: ProviderBase::new(Chain::Arweave, transport),
        }
    }

    /// Winston amounts arrive as plain-text integers, which may exceed u64.
    fn winston(value: &Value) -> Option<u128> {
        json_u128(value).or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u128))
    }

    fn from_graphql(node: &Value) -> Option<Transaction> {
        let block = &node["block"];
        Some(Transaction {
            hash: node["id"].as_str()?.to_string(),
            from: node["owner"]["address"].as_str().unwrap_or_default().to_string(),
            to: node["recipient"].as_str().unwrap_or_default().to_string(),
            amount: node["quantity"]["winston"].as_str().unwrap_or("0").to_string(),
            chain: Chain::Arweave,
            timestamp: unix_seconds(block["timestamp"].as_i64().unwrap_or(0)),
            status: if block.is_null() { TxStatus::Pending } else { TxStatus::Confirmed },
            fee: node["fee"]["winston"].as_str().unwrap_or("0").to_string(),
        })
    }
}

#[async_trait]
impl ChainProvider for ArweaveProvider {
    fn chain(&self) -> Chain {
        Chain::Arweave
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
        let path = format!("/wallet/{}/balance", address);
        let value = self.base.transport.get(&path).await?;
        let winston = Self::winston(&value).ok_or_else(|| self.base.unexpected("wallet balance", &value))?;
        Ok(winston.to_string())
    }

    async fn send_transaction(&self, _from: &str, request: &TransactionRequest) -> Result<String> {
        self.base.check_request(request)?;
        Err(self.base.no_node_signing())
    }

    async fn sign_transaction(&self, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction> {
        signing::sign_request(Chain::Arweave, request, private_key)
    }

    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String> {
        let envelope = signing::decode_envelope(Chain::Arweave, signed)?;
        let id = signing::transaction_hash(Chain::Arweave, signed)?;
        let body = json!({
            "id": id,
            "owner": envelope.public_key,
            "target": envelope.payload.to,
            "quantity": envelope.payload.amount,
            "data": envelope.payload.memo.as_deref().map(|m| URL_SAFE_NO_PAD.encode(m)).unwrap_or_default(),
            "signature": envelope.signature,
        });
        // The gateway acknowledges with plain text; the id is ours.
        self.base.transport.post("/tx", body).await?;
        Ok(id)
    }

    async fn get_transaction_history(&self, address: &str, limit: usize) -> Result<Vec<Transaction>> {
        let body = json!({
            "query": HISTORY_QUERY,
            "variables": { "owners": [address], "first": limit },
        });
        let result = self.base.transport.post("/graphql", body).await?;
        let edges = result["data"]["transactions"]["edges"]
            .as_array()
            .ok_or_else(|| self.base.unexpected("graphql", &result))?;
        Ok(edges
            .iter()
            .filter_map(|edge| Self::from_graphql(&edge["node"]))
            .take(limit)
            .collect())
    }

    async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate> {
        self.base.check_request(request)?;
        let bytes = request.memo.as_ref().map_or(0, String::len);
        let path = format!("/price/{}/{}", bytes, request.to);
        let value = self.base.transport.get(&path).await?;
        let winston = Self::winston(&value).ok_or_else(|| self.base.unexpected("price", &value))?;
        Ok(self.base.fee(winston))
    }

    fn validate_address(&self, address: &str) -> bool {
        address::validate_arweave_address(address)
    }

    async fn get_block_number(&self) -> Result<u64> {
        let info = self.base.transport.get("/info").await?;
        info["height"].as_u64().ok_or_else(|| self.base.unexpected("info", &info))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        let tx = self.base.transport.get(&format!("/tx/{}", hash)).await?;
        // 404 is null; a pending transaction answers with plain text.
        if !tx.is_object() {
            return Ok(None);
        }
        let owner = tx["owner"].as_str().and_then(|o| URL_SAFE_NO_PAD.decode(o).ok());
        Ok(Some(Transaction {
            hash: tx["id"].as_str().unwrap_or(hash).to_string(),
            from: owner.map(|m| address::arweave_address(&m)).unwrap_or_default(),
            to: tx["target"].as_str().unwrap_or_default().to_string(),
            amount: tx["quantity"].as_str().unwrap_or("0").to_string(),
            chain: Chain::Arweave,
            timestamp: chrono::Utc::now(),
            status: TxStatus::Confirmed,
            fee: tx["reward"].as_str().unwrap_or("0").to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockTransport;

    const ADDRESS: &str = "vLRHFqCw1uHu75xqB4fCDW-QxpkpJxBtFD9g4QYUbfw";

    #[tokio::test]
    async fn test_balance_text_body() {
        let p = ArweaveProvider::new(Arc::new(
            MockTransport::new(Chain::Arweave).with(format!("GET /wallet/{}/balance", ADDRESS), json!(1_500_000_000_000u64)),
        ));
        assert_eq!(p.get_balance(ADDRESS).await.unwrap(), "1500000000000");
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let p = ArweaveProvider::new(Arc::new(
            MockTransport::new(Chain::Arweave).with("GET /tx/nope", Value::Null),
        ));
        assert!(p.get_transaction("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_from_graphql() {
        let p = ArweaveProvider::new(Arc::new(MockTransport::new(Chain::Arweave).with(
            "POST /graphql",
            json!({ "data": { "transactions": { "edges": [
                { "node": { "id": "tx1", "recipient": "r", "owner": { "address": ADDRESS },
                  "quantity": { "winston": "42" }, "fee": { "winston": "7" },
                  "block": { "timestamp": 1_700_000_000, "height": 1 } } },
                { "node": { "id": "tx2", "recipient": "", "owner": { "address": ADDRESS },
                  "quantity": { "winston": "0" }, "fee": { "winston": "7" }, "block": null } }
            ] } } }),
        )));
        let history = p.get_transaction_history(ADDRESS, 5).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, "42");
        assert_eq!(history[1].status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn test_fee_from_price_endpoint() {
        let p = ArweaveProvider::new(Arc::new(
            MockTransport::new(Chain::Arweave).with(format!("GET /price/0/{}", ADDRESS), json!(65_595_508u64)),
        ));
        let request = TransactionRequest::new(Chain::Arweave, ADDRESS, "1");
        let fee = p.estimate_fee(&request).await.unwrap();
        assert_eq!(fee.amount, "65595508");
        assert_eq!(fee.symbol, "AR");
    }

    #[test]
    fn test_address_validation() {
        let p = ArweaveProvider::new(Arc::new(MockTransport::new(Chain::Arweave)));
        assert!(p.validate_address(ADDRESS));
        assert!(!p.validate_address("short"));
    }
}
