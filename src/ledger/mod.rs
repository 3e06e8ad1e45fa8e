//! Interface to the external wallet-registry and transaction-queue ledger.
//!
//! The hosted ledger is reached only through [`LedgerClient`]; this crate
//! never depends on its transport. [`InMemoryLedger`] is a process-local
//! implementation used by tests and local runs.

mod memory;

pub use memory::InMemoryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Chain;

/// Registration status of a wallet on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    Active,
    Inactive,
    Revoked,
}

/// The public slice of a wallet that crosses the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWallet {
    pub id: String,
    pub agent_id: String,
    pub chain: Chain,
    pub address: String,
    pub registered_at: DateTime<Utc>,
    pub status: WalletStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    SendFunds,
    SignMessage,
    DeployContract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// What an agent asked the ledger to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub wallet_id: String,
    pub kind: ActionKind,
    pub parameters: Vec<(String, String)>,
    pub priority: Priority,
    pub threshold: Option<u32>,
}

impl QueuedAction {
    pub fn send_funds(wallet_id: impl Into<String>, to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            kind: ActionKind::SendFunds,
            parameters: vec![("to".into(), to.into()), ("amount".into(), amount.into())],
            priority: Priority::Normal,
            threshold: None,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Queue lifecycle: `Pending -> Queued -> Signed -> Completed`, with
/// `Failed` reachable from any non-terminal state and left again by retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Queued,
    Signed,
    Completed,
    Failed,
}

impl QueueStatus {
    /// Forward transitions the ledger accepts.
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Signed)
                | (Queued, Signed)
                | (Signed, Completed)
                | (Pending, Failed)
                | (Queued, Failed)
                | (Signed, Failed)
                | (Failed, Queued)
        )
    }

    /// Retry re-queues entries that were never signed. A `Signed` entry may
    /// already be on chain, so it only moves forward or to `Failed`.
    pub fn can_retry(self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Queued | QueueStatus::Failed)
    }

    /// Statuses returned by a pending-transaction fetch.
    pub fn is_pending(self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Queued)
    }
}

/// A ledger-owned queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTransaction {
    pub id: String,
    pub action: QueuedAction,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub signed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Signature once signed, transaction hash once completed.
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub queued: usize,
    pub signed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Success flag plus optional payload, for operations that must not raise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOutcome<T = ()> {
    pub success: bool,
    pub error: Option<String>,
    pub value: Option<T>,
}

impl<T> LedgerOutcome<T> {
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            error: None,
            value: Some(value),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            value: None,
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Calls the wallet core makes against the ledger actor.
///
/// Implementations report transport and rejection failures as
/// `WalletCoreError::LedgerCall`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn register_wallet(&self, wallet: LedgerWallet) -> Result<()>;

    async fn get_wallet(&self, wallet_id: &str) -> Result<Option<LedgerWallet>>;

    async fn list_wallets(&self, agent_id: &str) -> Result<Vec<LedgerWallet>>;

    async fn deregister_wallet(&self, wallet_id: &str) -> Result<()>;

    async fn update_wallet_status(&self, wallet_id: &str, status: WalletStatus) -> Result<()>;

    /// Append an action to the queue; returns the new transaction id.
    async fn enqueue_transaction(&self, action: QueuedAction) -> Result<String>;

    /// Entries in `Pending` or `Queued` whose schedule (if any) has come due.
    async fn get_pending_transactions(&self) -> Result<Vec<QueuedTransaction>>;

    async fn get_transaction(&self, id: &str) -> Result<Option<QueuedTransaction>>;

    async fn mark_transaction_signed(&self, id: &str, signature: &str) -> Result<()>;

    async fn mark_transaction_completed(&self, id: &str, tx_hash: &str) -> Result<()>;

    /// Moves to `Failed` and counts the attempt.
    async fn mark_transaction_failed(&self, id: &str, error: &str) -> Result<()>;

    /// Re-queues and counts the attempt.
    async fn retry_transaction(&self, id: &str) -> Result<()>;

    async fn schedule_transaction(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Prunes completed entries; returns how many were removed.
    async fn clear_completed_transactions(&self) -> Result<usize>;

    async fn get_transaction_queue_stats(&self) -> Result<QueueStats>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()> {
        self.get_transaction_queue_stats().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use QueueStatus::*;
        assert!(Pending.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Signed));
        assert!(Signed.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Signed));
        assert!(!Completed.can_retry());
        assert!(!Signed.can_retry());
        assert!(Failed.can_retry() && Queued.can_retry());
    }

    #[test]
    fn test_action_params() {
        let action = QueuedAction::send_funds("w1", "addr", "100");
        assert_eq!(action.param("to"), Some("addr"));
        assert_eq!(action.param("amount"), Some("100"));
        assert_eq!(action.param("memo"), None);
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: LedgerOutcome<u32> = LedgerOutcome::from_result(Ok(3));
        assert!(ok.success && ok.value == Some(3));
        let err: LedgerOutcome<u32> = LedgerOutcome::from_result(Err(
            crate::error::WalletCoreError::LedgerCall("down".into()),
        ));
        assert!(!err.success);
        assert!(err.error.unwrap().contains("down"));
    }
}
