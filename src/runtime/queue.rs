//! Sequential processing of the ledger's transaction queue.
//!
//! Each pending entry is resolved to a wallet, turned into a
//! [`TransactionRequest`] and handed to an injected [`TransactionSigner`].
//! Every failed attempt is counted on the ledger exactly once, through
//! either `retry_transaction` or `mark_transaction_failed`. Once the signer
//! has returned, the entry is never re-queued: a signer that broadcasts
//! must not see the same entry twice.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{Result, WalletCoreError};
use crate::ledger::{LedgerClient, LedgerOutcome, QueueStats, QueueStatus, QueuedAction, QueuedTransaction};
use crate::types::{Chain, SignedTransaction, TransactionRequest, WalletData};
use crate::wallet::WalletManager;

const WALLET_NOT_FOUND: &str = "Wallet not found";
const SIGNING_FAILED: &str = "Signing failed";
const SIGNATURE_NOT_RECORDED: &str = "Signed but not recorded";

/// Signing capability handed to the processor.
///
/// `Ok(None)` means the signer declined; it is recorded as a failure
/// without a retry. A returned `tx_hash` means the signer also broadcast.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, wallet: &WalletData, request: &TransactionRequest) -> Result<Option<SignedTransaction>>;
}

/// What happened to one queue entry in a processing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemResult {
    pub id: String,
    pub status: QueueStatus,
    pub retried: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub processed: usize,
    /// Signed, including those that went on to complete.
    pub signed: usize,
    pub completed: usize,
    pub failed: usize,
    pub retried: usize,
    pub results: Vec<QueueItemResult>,
}

enum Attempt {
    Signed,
    Completed,
    /// Signed, but the ledger did not accept the outcome.
    Unrecorded { status: QueueStatus, error: String },
    /// Terminal without retry.
    Rejected(&'static str),
}

pub struct TransactionQueueProcessor {
    ledger: Arc<dyn LedgerClient>,
    wallets: Arc<WalletManager>,
    config: QueueConfig,
}

impl TransactionQueueProcessor {
    pub fn new(ledger: Arc<dyn LedgerClient>, wallets: Arc<WalletManager>, config: QueueConfig) -> Self {
        Self { ledger, wallets, config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Entries in `Pending` or `Queued`; empty when the ledger is unreachable.
    pub async fn fetch_pending_transactions(&self) -> Vec<QueuedTransaction> {
        match self.ledger.get_pending_transactions().await {
            Ok(pending) => pending
                .into_iter()
                .filter(|tx| tx.status.is_pending())
                .collect(),
            Err(e) => {
                warn!(error = %e, "cannot fetch pending transactions");
                Vec::new()
            }
        }
    }

    pub async fn enqueue(&self, action: QueuedAction) -> LedgerOutcome<String> {
        LedgerOutcome::from_result(self.ledger.enqueue_transaction(action).await)
    }

    /// One sequential pass over the pending set.
    pub async fn process_pending_transactions(&self, signer: &dyn TransactionSigner) -> ProcessingReport {
        let mut report = ProcessingReport::default();
        let pending = self.fetch_pending_transactions().await;
        if pending.is_empty() {
            return report;
        }
        debug!(count = pending.len(), "processing queue");

        for tx in pending {
            report.processed += 1;
            let result = match self.attempt(&tx, signer).await {
                Ok(Attempt::Signed) => {
                    report.signed += 1;
                    QueueItemResult {
                        id: tx.id.clone(),
                        status: QueueStatus::Signed,
                        retried: false,
                        error: None,
                    }
                }
                Ok(Attempt::Completed) => {
                    report.signed += 1;
                    report.completed += 1;
                    QueueItemResult {
                        id: tx.id.clone(),
                        status: QueueStatus::Completed,
                        retried: false,
                        error: None,
                    }
                }
                Ok(Attempt::Unrecorded { status, error }) => {
                    report.signed += 1;
                    QueueItemResult {
                        id: tx.id.clone(),
                        status,
                        retried: false,
                        error: Some(error),
                    }
                }
                Ok(Attempt::Rejected(reason)) => {
                    report.failed += 1;
                    self.fail(&tx, reason).await
                }
                Err(e) => {
                    let item = self.handle_error(&tx, &e).await;
                    if item.retried {
                        report.retried += 1;
                    } else {
                        report.failed += 1;
                    }
                    item
                }
            };
            report.results.push(result);
        }

        info!(
            processed = report.processed,
            signed = report.signed,
            failed = report.failed,
            retried = report.retried,
            "queue pass finished"
        );
        report
    }

    async fn attempt(&self, tx: &QueuedTransaction, signer: &dyn TransactionSigner) -> Result<Attempt> {
        // 1. Resolve wallet
        let Some(wallet) = self.resolve_wallet(&tx.action.wallet_id).await? else {
            return Ok(Attempt::Rejected(WALLET_NOT_FOUND));
        };

        // 2. Build request
        let request = Self::request_for(&tx.action, &wallet)?;

        // 3. Sign
        let Some(signed) = signer.sign(&wallet, &request).await? else {
            return Ok(Attempt::Rejected(SIGNING_FAILED));
        };

        // 4. Record
        Ok(self.record(tx, &signed).await)
    }

    /// Store the signer's outcome. Errors past this point leave the entry
    /// where it is (or park it as failed) instead of re-queueing it.
    async fn record(&self, tx: &QueuedTransaction, signed: &SignedTransaction) -> Attempt {
        if let Err(e) = self.ledger.mark_transaction_signed(&tx.id, &signed.signature).await {
            warn!(tx_id = %tx.id, error = %e, "signature could not be recorded");
            let reason = match signed.tx_hash.as_deref() {
                Some(hash) => format!("{} (tx_hash {}): {}", SIGNATURE_NOT_RECORDED, hash, e),
                None => format!("{}: {}", SIGNATURE_NOT_RECORDED, e),
            };
            // Still Pending/Queued here; park it so the next pass skips it.
            let status = match self.ledger.mark_transaction_failed(&tx.id, &reason).await {
                Ok(()) => QueueStatus::Failed,
                Err(e) => {
                    warn!(tx_id = %tx.id, error = %e, "failure could not be recorded");
                    tx.status
                }
            };
            return Attempt::Unrecorded { status, error: reason };
        }

        let Some(hash) = signed.tx_hash.as_deref() else {
            info!(tx_id = %tx.id, "queued transaction signed");
            return Attempt::Signed;
        };
        match self.ledger.mark_transaction_completed(&tx.id, hash).await {
            Ok(()) => {
                info!(tx_id = %tx.id, tx_hash = hash, "queued transaction completed");
                Attempt::Completed
            }
            Err(e) => {
                warn!(tx_id = %tx.id, tx_hash = hash, error = %e, "completion could not be recorded; left signed");
                Attempt::Unrecorded {
                    status: QueueStatus::Signed,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Wallet behind a ledger wallet id, loaded from local storage. The
    /// ledger registry names the owning agent; wallets never synced there
    /// are found by scanning local storage.
    async fn resolve_wallet(&self, wallet_id: &str) -> Result<Option<WalletData>> {
        if let Some(registered) = self.ledger.get_wallet(wallet_id).await? {
            if let Some(wallet) = self.wallets.get_wallet(&registered.agent_id, wallet_id)? {
                return Ok(Some(wallet));
            }
        }
        self.wallets.find_wallet(wallet_id)
    }

    /// Map action parameters onto a request; `chain` defaults to the wallet's.
    pub fn request_for(action: &QueuedAction, wallet: &WalletData) -> Result<TransactionRequest> {
        let required = |key: &str| {
            action
                .param(key)
                .map(str::to_string)
                .ok_or_else(|| WalletCoreError::invalid_input(format!("queued action is missing '{}'", key)))
        };
        let chain = match action.param("chain") {
            Some(tag) => Chain::from_str(tag)?,
            None => wallet.chain,
        };

        let request = TransactionRequest {
            to: required("to")?,
            amount: required("amount")?,
            chain,
            memo: action.param("memo").map(str::to_string),
            gas_price: action.param("gas_price").map(str::to_string),
            gas_limit: action.param("gas_limit").map(str::to_string),
        };
        request.validate()?;
        Ok(request)
    }

    async fn handle_error(&self, tx: &QueuedTransaction, error: &WalletCoreError) -> QueueItemResult {
        let message = error.to_string();
        // This failure is the (retry_count + 1)th attempt.
        if tx.retry_count + 1 < self.config.max_retries {
            warn!(tx_id = %tx.id, attempt = tx.retry_count + 1, error = %message, "queued transaction failed; retrying");
            match self.ledger.retry_transaction(&tx.id).await {
                Ok(()) => QueueItemResult {
                    id: tx.id.clone(),
                    status: QueueStatus::Queued,
                    retried: true,
                    error: Some(message),
                },
                Err(e) => {
                    warn!(tx_id = %tx.id, error = %e, "retry could not be recorded");
                    QueueItemResult {
                        id: tx.id.clone(),
                        status: tx.status,
                        retried: false,
                        error: Some(message),
                    }
                }
            }
        } else {
            self.fail(tx, &message).await
        }
    }

    async fn fail(&self, tx: &QueuedTransaction, reason: &str) -> QueueItemResult {
        warn!(tx_id = %tx.id, reason, "queued transaction failed");
        let status = match self.ledger.mark_transaction_failed(&tx.id, reason).await {
            Ok(()) => QueueStatus::Failed,
            Err(e) => {
                warn!(tx_id = %tx.id, error = %e, "failure could not be recorded");
                tx.status
            }
        };
        QueueItemResult {
            id: tx.id.clone(),
            status,
            retried: false,
            error: Some(reason.to_string()),
        }
    }

    pub async fn mark_completed(&self, id: &str, tx_hash: &str) -> LedgerOutcome {
        LedgerOutcome::from_result(self.ledger.mark_transaction_completed(id, tx_hash).await)
    }

    pub async fn schedule_transaction(&self, id: &str, at: DateTime<Utc>) -> LedgerOutcome {
        LedgerOutcome::from_result(self.ledger.schedule_transaction(id, at).await)
    }

    pub async fn clear_completed(&self) -> LedgerOutcome<usize> {
        LedgerOutcome::from_result(self.ledger.clear_completed_transactions().await)
    }

    pub async fn get_stats(&self) -> LedgerOutcome<QueueStats> {
        LedgerOutcome::from_result(self.ledger.get_transaction_queue_stats().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerWallet, WalletStatus};
    use crate::keys::{DerivationOptions, KeyDerivation};
    use crate::storage::WalletStorage;
    use crate::types::CreationMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` calls, then signs and reports a hash.
    struct FlakySigner {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransactionSigner for FlakySigner {
        async fn sign(&self, _wallet: &WalletData, _request: &TransactionRequest) -> Result<Option<SignedTransaction>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(WalletCoreError::provider(Chain::Icp, "node timeout"));
            }
            Ok(Some(SignedTransaction {
                signed_tx: "deadbeef".into(),
                signature: "sig".into(),
                tx_hash: Some("hash".into()),
            }))
        }
    }

    struct DecliningSigner;

    #[async_trait]
    impl TransactionSigner for DecliningSigner {
        async fn sign(&self, _wallet: &WalletData, _request: &TransactionRequest) -> Result<Option<SignedTransaction>> {
            Ok(None)
        }
    }

    /// Delegates to an [`InMemoryLedger`], failing the next `signed_failures`
    /// signature records and `completed_failures` completion records.
    struct UnreliableLedger {
        inner: Arc<InMemoryLedger>,
        signed_failures: AtomicUsize,
        completed_failures: AtomicUsize,
    }

    impl UnreliableLedger {
        fn new(inner: Arc<InMemoryLedger>, signed_failures: usize, completed_failures: usize) -> Self {
            Self {
                inner,
                signed_failures: AtomicUsize::new(signed_failures),
                completed_failures: AtomicUsize::new(completed_failures),
            }
        }

        fn trip(counter: &AtomicUsize) -> Result<()> {
            match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
                Ok(_) => Err(WalletCoreError::LedgerCall("replica timeout".into())),
                Err(_) => Ok(()),
            }
        }
    }

    #[async_trait]
    impl LedgerClient for UnreliableLedger {
        async fn register_wallet(&self, wallet: LedgerWallet) -> Result<()> {
            self.inner.register_wallet(wallet).await
        }

        async fn get_wallet(&self, wallet_id: &str) -> Result<Option<LedgerWallet>> {
            self.inner.get_wallet(wallet_id).await
        }

        async fn list_wallets(&self, agent_id: &str) -> Result<Vec<LedgerWallet>> {
            self.inner.list_wallets(agent_id).await
        }

        async fn deregister_wallet(&self, wallet_id: &str) -> Result<()> {
            self.inner.deregister_wallet(wallet_id).await
        }

        async fn update_wallet_status(&self, wallet_id: &str, status: WalletStatus) -> Result<()> {
            self.inner.update_wallet_status(wallet_id, status).await
        }

        async fn enqueue_transaction(&self, action: QueuedAction) -> Result<String> {
            self.inner.enqueue_transaction(action).await
        }

        async fn get_pending_transactions(&self) -> Result<Vec<QueuedTransaction>> {
            self.inner.get_pending_transactions().await
        }

        async fn get_transaction(&self, id: &str) -> Result<Option<QueuedTransaction>> {
            self.inner.get_transaction(id).await
        }

        async fn mark_transaction_signed(&self, id: &str, signature: &str) -> Result<()> {
            Self::trip(&self.signed_failures)?;
            self.inner.mark_transaction_signed(id, signature).await
        }

        async fn mark_transaction_completed(&self, id: &str, tx_hash: &str) -> Result<()> {
            Self::trip(&self.completed_failures)?;
            self.inner.mark_transaction_completed(id, tx_hash).await
        }

        async fn mark_transaction_failed(&self, id: &str, error: &str) -> Result<()> {
            self.inner.mark_transaction_failed(id, error).await
        }

        async fn retry_transaction(&self, id: &str) -> Result<()> {
            self.inner.retry_transaction(id).await
        }

        async fn schedule_transaction(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
            self.inner.schedule_transaction(id, at).await
        }

        async fn clear_completed_transactions(&self) -> Result<usize> {
            self.inner.clear_completed_transactions().await
        }

        async fn get_transaction_queue_stats(&self) -> Result<QueueStats> {
            self.inner.get_transaction_queue_stats().await
        }
    }

    /// One local ICP wallet; registered on the ledger when `register` is set.
    async fn fixture(register: bool) -> (TempDir, Arc<WalletManager>, Arc<InMemoryLedger>, String) {
        let dir = TempDir::new().unwrap();
        let manager = WalletManager::new(
            WalletStorage::open(dir.path()).unwrap(),
            KeyDerivation::new(DerivationOptions::default()),
        );
        let wallet = manager.generate_wallet("agent-1", Chain::Icp).unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        if register {
            ledger
                .register_wallet(LedgerWallet {
                    id: wallet.id.clone(),
                    agent_id: "agent-1".into(),
                    chain: Chain::Icp,
                    address: wallet.address.clone(),
                    registered_at: Utc::now(),
                    status: WalletStatus::Active,
                })
                .await
                .unwrap();
        }
        (dir, Arc::new(manager), ledger, wallet.id.clone())
    }

    async fn setup() -> (TempDir, Arc<InMemoryLedger>, TransactionQueueProcessor, String) {
        let (dir, manager, ledger, wallet_id) = fixture(true).await;
        let processor = TransactionQueueProcessor::new(ledger.clone(), manager, QueueConfig::default());
        (dir, ledger, processor, wallet_id)
    }

    #[tokio::test]
    async fn test_three_failures_end_failed() {
        let (_dir, ledger, processor, wallet_id) = setup().await;
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "100")).await.value.unwrap();
        let signer = FlakySigner { failures: 3, calls: AtomicUsize::new(0) };

        for _ in 0..3 {
            processor.process_pending_transactions(&signer).await;
        }
        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Failed);
        assert_eq!(tx.retry_count, 3);

        // Failed entries are no longer fetched.
        assert_eq!(processor.process_pending_transactions(&signer).await.processed, 0);
    }

    #[tokio::test]
    async fn test_two_failures_then_success_completes() {
        let (_dir, ledger, processor, wallet_id) = setup().await;
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "100")).await.value.unwrap();
        let signer = FlakySigner { failures: 2, calls: AtomicUsize::new(0) };

        assert_eq!(processor.process_pending_transactions(&signer).await.retried, 1);
        assert_eq!(processor.process_pending_transactions(&signer).await.retried, 1);
        let last = processor.process_pending_transactions(&signer).await;
        assert_eq!(last.completed, 1);

        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Completed);
        assert_eq!(tx.retry_count, 2);
        assert_eq!(tx.result.as_deref(), Some("hash"));
    }

    #[tokio::test]
    async fn test_unrecorded_completion_is_not_rebroadcast() {
        let (_dir, manager, inner, wallet_id) = fixture(true).await;
        let ledger = Arc::new(UnreliableLedger::new(inner.clone(), 0, 1));
        let processor = TransactionQueueProcessor::new(ledger, manager, QueueConfig::default());
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "100")).await.value.unwrap();
        let signer = FlakySigner { failures: 0, calls: AtomicUsize::new(0) };

        let first = processor.process_pending_transactions(&signer).await;
        assert_eq!((first.signed, first.completed, first.retried), (1, 0, 0));
        assert_eq!(first.results[0].status, QueueStatus::Signed);
        assert!(first.results[0].error.as_deref().unwrap().contains("replica timeout"));

        let tx = inner.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Signed);
        assert_eq!(tx.result.as_deref(), Some("sig"));
        assert_eq!(tx.retry_count, 0);

        // Signed entries are not fetched again, so nothing is re-sent.
        assert_eq!(processor.process_pending_transactions(&signer).await.processed, 0);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrecorded_signature_is_parked_as_failed() {
        let (_dir, manager, inner, wallet_id) = fixture(true).await;
        let ledger = Arc::new(UnreliableLedger::new(inner.clone(), 1, 0));
        let processor = TransactionQueueProcessor::new(ledger, manager, QueueConfig::default());
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "100")).await.value.unwrap();
        let signer = FlakySigner { failures: 0, calls: AtomicUsize::new(0) };

        let first = processor.process_pending_transactions(&signer).await;
        assert_eq!(first.retried, 0);
        assert_eq!(first.results[0].status, QueueStatus::Failed);

        let tx = inner.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Failed);
        let message = tx.error_message.unwrap();
        assert!(message.starts_with("Signed but not recorded"));
        assert!(message.contains("hash"));

        assert_eq!(processor.process_pending_transactions(&signer).await.processed, 0);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsynced_local_wallet_is_resolved() {
        let (_dir, manager, ledger, wallet_id) = fixture(false).await;
        assert!(ledger.get_wallet(&wallet_id).await.unwrap().is_none());
        let processor = TransactionQueueProcessor::new(ledger.clone(), manager, QueueConfig::default());
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "5")).await.value.unwrap();

        let report = processor
            .process_pending_transactions(&FlakySigner { failures: 0, calls: AtomicUsize::new(0) })
            .await;
        assert_eq!(report.completed, 1);
        assert_eq!(ledger.get_transaction(&id).await.unwrap().unwrap().status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_wallet_fails_without_retry() {
        let (_dir, ledger, processor, _) = setup().await;
        let id = processor.enqueue(QueuedAction::send_funds("ghost", "2vxsx-fae", "1")).await.value.unwrap();
        let report = processor
            .process_pending_transactions(&FlakySigner { failures: 0, calls: AtomicUsize::new(0) })
            .await;
        assert_eq!(report.failed, 1);

        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Failed);
        assert_eq!(tx.error_message.as_deref(), Some("Wallet not found"));
    }

    #[tokio::test]
    async fn test_declined_signature() {
        let (_dir, ledger, processor, wallet_id) = setup().await;
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "1")).await.value.unwrap();
        processor.process_pending_transactions(&DecliningSigner).await;
        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.error_message.as_deref(), Some("Signing failed"));
        assert_eq!(tx.retry_count, 1);
    }

    #[tokio::test]
    async fn test_offline_ledger_processes_nothing() {
        let (_dir, ledger, processor, wallet_id) = setup().await;
        processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "1")).await;
        ledger.set_offline(true);
        let report = processor.process_pending_transactions(&DecliningSigner).await;
        assert_eq!(report, ProcessingReport::default());
        let stats = processor.get_stats().await;
        assert!(!stats.success);
        assert!(stats.error.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_outcome_wrappers() {
        let (_dir, _ledger, processor, wallet_id) = setup().await;
        let id = processor.enqueue(QueuedAction::send_funds(&wallet_id, "2vxsx-fae", "1")).await.value.unwrap();

        assert!(!processor.mark_completed(&id, "h").await.success);
        let later = Utc::now() + chrono::Duration::hours(1);
        assert!(processor.schedule_transaction(&id, later).await.success);
        // Scheduled in the future, so not yet due.
        assert!(processor.fetch_pending_transactions().await.is_empty());

        let stats = processor.get_stats().await.value.unwrap();
        assert_eq!((stats.total, stats.queued), (1, 1));
        assert_eq!(processor.clear_completed().await.value, Some(0));
    }

    #[test]
    fn test_request_mapping() {
        let now = Utc::now();
        let wallet = WalletData {
            id: "w".into(),
            agent_id: "a".into(),
            chain: Chain::Solana,
            address: "addr".into(),
            private_key: None,
            mnemonic: None,
            derivation_path: "m".into(),
            created_at: now,
            updated_at: now,
            creation_method: CreationMethod::Mnemonic,
            metadata: None,
        };
        let mut action = QueuedAction::send_funds("w", "dest", "42");
        action.parameters.push(("memo".into(), "invoice 7".into()));
        let request = TransactionQueueProcessor::request_for(&action, &wallet).unwrap();
        assert_eq!(request.chain, Chain::Solana);
        assert_eq!(request.memo.as_deref(), Some("invoice 7"));

        action.parameters.push(("chain".into(), "dogecoin".into()));
        assert!(TransactionQueueProcessor::request_for(&action, &wallet).is_err());

        let missing = QueuedAction {
            parameters: vec![("to".into(), "dest".into())],
            ..QueuedAction::send_funds("w", "x", "1")
        };
        assert!(TransactionQueueProcessor::request_for(&missing, &wallet).is_err());
    }
}
