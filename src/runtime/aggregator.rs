//! Bounded-parallel batches across chains.
//!
//! Work runs in chunks of `max_concurrency`; each chunk is joined before
//! the next starts. Results are per item and nothing is rolled back.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ChainDispatcher;
use crate::config::AggregatorConfig;
use crate::types::{Chain, FeeEstimate, Transaction, TransactionRequest, WalletData};

/// One transfer in a batch.
#[derive(Debug, Clone)]
pub struct CrossChainAction {
    pub wallet: WalletData,
    pub request: TransactionRequest,
}

impl CrossChainAction {
    pub fn new(wallet: WalletData, request: TransactionRequest) -> Self {
        Self { wallet, request }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Position in the submitted batch.
    pub index: usize,
    pub chain: Chain,
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Actions that ran; below the input length only when `aborted`.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ActionResult>,
    pub duration: Duration,
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub wallet_id: String,
    pub chain: Chain,
    pub address: String,
    pub balance: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeResult {
    pub index: usize,
    pub chain: Chain,
    pub fee: Option<FeeEstimate>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSummary {
    pub estimates: Vec<FeeResult>,
    /// Sum of successful estimates per chain, in base units.
    pub totals: BTreeMap<Chain, String>,
}

pub struct CrossChainAggregator {
    dispatcher: Arc<ChainDispatcher>,
    config: AggregatorConfig,
}

impl CrossChainAggregator {
    pub fn new(dispatcher: Arc<ChainDispatcher>, config: AggregatorConfig) -> Self {
        Self { dispatcher, config }
    }

    fn chunk_size(&self) -> usize {
        self.config.max_concurrency.max(1)
    }

    /// Run `task` over every item, one joined chunk at a time.
    ///
    /// After each chunk `stop` sees that chunk's results; when it returns
    /// true the remaining items are skipped. The flag reports a skip.
    async fn chunked_until<'a, T, R, F, Fut, S>(&self, items: &'a [T], task: F, mut stop: S) -> (Vec<R>, bool)
    where
        F: Fn(usize, &'a T) -> Fut,
        Fut: Future<Output = R>,
        S: FnMut(&[R]) -> bool,
    {
        let size = self.chunk_size();
        let mut out = Vec::with_capacity(items.len());
        for (chunk_index, chunk) in items.chunks(size).enumerate() {
            let base = chunk_index * size;
            let futures = chunk.iter().enumerate().map(|(i, item)| task(base + i, item));
            let results = join_all(futures).await;
            let halt = stop(results.as_slice());
            out.extend(results);
            if halt && out.len() < items.len() {
                return (out, true);
            }
        }
        (out, false)
    }

    async fn chunked<'a, T, R, F, Fut>(&self, items: &'a [T], task: F) -> Vec<R>
    where
        F: Fn(usize, &'a T) -> Fut,
        Fut: Future<Output = R>,
    {
        self.chunked_until(items, task, |_| false).await.0
    }

    /// Dispatch every action.
    ///
    /// With `continue_on_error` off, no chunk is started after one that
    /// contained a failure.
    pub async fn execute(&self, actions: &[CrossChainAction]) -> BatchResult {
        let started = Instant::now();
        let abort_on_failure = !self.config.continue_on_error;
        let (results, aborted) = self
            .chunked_until(
                actions,
                |index, action| self.run_action(index, action),
                |chunk: &[ActionResult]| abort_on_failure && chunk.iter().any(|r| !r.success),
            )
            .await;
        if aborted {
            warn!(remaining = actions.len() - results.len(), "batch aborted after a failed chunk");
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let batch = BatchResult {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            duration: started.elapsed(),
            aborted,
        };
        info!(
            total = batch.total,
            succeeded = batch.succeeded,
            failed = batch.failed,
            aborted = batch.aborted,
            "batch finished"
        );
        batch
    }

    async fn run_action(&self, index: usize, action: &CrossChainAction) -> ActionResult {
        let started = Instant::now();
        let outcome = self
            .dispatcher
            .dispatch_transaction(&action.wallet, &action.request)
            .await;
        let (success, tx_hash, error) = match outcome {
            Ok(tx) => (true, Some(tx.hash), None),
            Err(e) => {
                warn!(index, chain = %action.request.chain, error = %e, "batch action failed");
                (false, None, Some(e.to_string()))
            }
        };
        ActionResult {
            index,
            chain: action.request.chain,
            success,
            tx_hash,
            error,
            duration: started.elapsed(),
        }
    }

    pub async fn get_balances(&self, wallets: &[WalletData]) -> Vec<BalanceResult> {
        self.chunked(wallets, |_, wallet| async move {
            let result = self.dispatcher.get_balance(wallet).await;
            BalanceResult {
                wallet_id: wallet.id.clone(),
                chain: wallet.chain,
                address: wallet.address.clone(),
                balance: result.as_ref().ok().cloned(),
                error: result.err().map(|e| e.to_string()),
            }
        })
        .await
    }

    /// Newest first across all wallets, truncated to `limit`.
    pub async fn get_multi_chain_history(&self, wallets: &[WalletData], limit: usize) -> Vec<Transaction> {
        let per_wallet = self
            .chunked(wallets, |_, wallet| async move {
                match self.dispatcher.get_transaction_history(wallet, limit).await {
                    Ok(history) => history,
                    Err(e) => {
                        warn!(wallet_id = %wallet.id, chain = %wallet.chain, error = %e, "history unavailable");
                        Vec::new()
                    }
                }
            })
            .await;

        let mut merged: Vec<Transaction> = per_wallet.into_iter().flatten().collect();
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(limit);
        merged
    }

    pub async fn estimate_fees(&self, actions: &[CrossChainAction]) -> FeeSummary {
        let estimates = self
            .chunked(actions, |index, action| async move {
                let result = self.dispatcher.estimate_fee(&action.request).await;
                FeeResult {
                    index,
                    chain: action.request.chain,
                    fee: result.as_ref().ok().cloned(),
                    error: result.err().map(|e| e.to_string()),
                }
            })
            .await;

        let mut sums: BTreeMap<Chain, u128> = BTreeMap::new();
        for estimate in &estimates {
            if let Some(fee) = &estimate.fee {
                let amount = fee.amount.parse::<u128>().unwrap_or(0);
                let sum = sums.entry(estimate.chain).or_insert(0);
                *sum = sum.saturating_add(amount);
            }
        }
        FeeSummary {
            estimates,
            totals: sums.into_iter().map(|(chain, sum)| (chain, sum.to_string())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockTransport, ProviderFactory};
    use crate::types::{CreationMethod, TxStatus};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn watch_wallet(id: &str, chain: Chain, address: &str) -> WalletData {
        let now = Utc::now();
        WalletData {
            id: id.into(),
            agent_id: "agent-1".into(),
            chain,
            address: address.into(),
            private_key: None,
            mnemonic: None,
            derivation_path: "m".into(),
            created_at: now,
            updated_at: now,
            creation_method: CreationMethod::Mnemonic,
            metadata: None,
        }
    }

    /// ckETH accepts node-signed sends; Polkadot refuses them.
    fn dispatcher() -> Arc<ChainDispatcher> {
        let eth = MockTransport::new(Chain::CkEth)
            .with("eth_blockNumber", json!("0x1"))
            .with("eth_sendTransaction", json!("0xabc"))
            .with("eth_getBalance", json!("0x10"))
            .with("eth_gasPrice", json!("0x2"))
            .with("eth_estimateGas", json!("0x5208"));
        let dot = MockTransport::new(Chain::Polkadot).with("chain_getHeader", json!({ "number": "0x1" }));
        Arc::new(ChainDispatcher::with_providers([
            ProviderFactory::create_with_transport(Chain::CkEth, Arc::new(eth)),
            ProviderFactory::create_with_transport(Chain::Polkadot, Arc::new(dot)),
        ]))
    }

    fn actions(ok: usize, failing: usize) -> Vec<CrossChainAction> {
        let eth = watch_wallet("e", Chain::CkEth, "0x0000000000000000000000000000000000000001");
        let dot = watch_wallet("d", Chain::Polkadot, "dot");
        let mut out = Vec::new();
        for _ in 0..ok {
            out.push(CrossChainAction::new(
                eth.clone(),
                TransactionRequest::new(Chain::CkEth, "0x0000000000000000000000000000000000000002", "1"),
            ));
        }
        for _ in 0..failing {
            out.push(CrossChainAction::new(dot.clone(), TransactionRequest::new(Chain::Polkadot, "x", "1")));
        }
        out
    }

    #[tokio::test]
    async fn test_counts_with_failures() {
        let agg = CrossChainAggregator::new(dispatcher(), AggregatorConfig::default());
        let batch = agg.execute(&actions(9, 3)).await;
        assert_eq!(batch.total, 12);
        assert_eq!(batch.succeeded, 9);
        assert_eq!(batch.failed, 3);
        assert_eq!(batch.results.len(), 12);
        assert!(!batch.aborted);
        assert!(batch.results.iter().enumerate().all(|(i, r)| r.index == i));
    }

    #[tokio::test]
    async fn test_stop_on_error_finishes_chunk() {
        let config = AggregatorConfig {
            max_concurrency: 2,
            continue_on_error: false,
        };
        let agg = CrossChainAggregator::new(dispatcher(), config);
        // [fail, ok] [ok, ok] ...
        let mut batch_actions = actions(5, 1);
        batch_actions.rotate_right(1);
        let batch = agg.execute(&batch_actions).await;
        assert!(batch.aborted);
        assert_eq!(batch.total, 2);
        assert_eq!(batch.succeeded + batch.failed, batch.total);
    }

    #[tokio::test]
    async fn test_failure_in_last_chunk_is_not_an_abort() {
        let config = AggregatorConfig {
            max_concurrency: 2,
            continue_on_error: false,
        };
        let agg = CrossChainAggregator::new(dispatcher(), config);
        // [ok, ok] [ok, fail]
        let batch = agg.execute(&actions(3, 1)).await;
        assert!(!batch.aborted);
        assert_eq!((batch.total, batch.succeeded, batch.failed), (4, 3, 1));
        assert!(batch.results.iter().enumerate().all(|(i, r)| r.index == i));
    }

    #[tokio::test]
    async fn test_balances_and_fees() {
        let agg = CrossChainAggregator::new(dispatcher(), AggregatorConfig::default());
        let wallets = vec![
            watch_wallet("e", Chain::CkEth, "0x0000000000000000000000000000000000000001"),
            watch_wallet("s", Chain::Solana, "sol"),
        ];
        let balances = agg.get_balances(&wallets).await;
        assert_eq!(balances[0].balance.as_deref(), Some("16"));
        assert_eq!(balances[1].error.as_deref(), Some("Unsupported chain: solana"));

        let fees = agg.estimate_fees(&actions(3, 0)).await;
        assert_eq!(fees.estimates.len(), 3);
        assert_eq!(fees.totals.get(&Chain::CkEth).map(String::as_str), Some("126000"));
    }

    #[tokio::test]
    async fn test_history_merges_newest_first() {
        let sol = MockTransport::new(Chain::Solana).with("getSlot", json!(1)).with(
            "getSignaturesForAddress",
            json!([
                { "signature": "new", "err": null, "blockTime": 300 },
                { "signature": "old", "err": null, "blockTime": 100 }
            ]),
        );
        let ar = MockTransport::new(Chain::Arweave).with("GET /info", json!({ "height": 1 })).with(
            "POST /graphql",
            json!({ "data": { "transactions": { "edges": [
                { "node": { "id": "mid", "recipient": "", "owner": { "address": "a" },
                  "quantity": { "winston": "0" }, "fee": { "winston": "0" },
                  "block": { "timestamp": 200, "height": 1 } } }
            ] } } }),
        );
        let d = Arc::new(ChainDispatcher::with_providers([
            ProviderFactory::create_with_transport(Chain::Solana, Arc::new(sol)),
            ProviderFactory::create_with_transport(Chain::Arweave, Arc::new(ar)),
        ]));
        let agg = CrossChainAggregator::new(d, AggregatorConfig::default());
        let wallets = vec![
            watch_wallet("s", Chain::Solana, "sol"),
            watch_wallet("a", Chain::Arweave, "ar"),
            watch_wallet("x", Chain::Icp, "unconfigured"),
        ];

        let history = agg.get_multi_chain_history(&wallets, 2).await;
        let hashes: Vec<_> = history.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["new", "mid"]);
        assert_eq!(history[0].timestamp, Utc.timestamp_opt(300, 0).unwrap());
        assert_eq!(history[0].status, TxStatus::Confirmed);
    }
}
