use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    LedgerClient, LedgerWallet, QueueStats, QueueStatus, QueuedAction, QueuedTransaction,
    WalletStatus,
};
use crate::error::{Result, WalletCoreError};

#[derive(Default)]
struct State {
    wallets: HashMap<String, LedgerWallet>,
    queue: Vec<QueuedTransaction>,
}

/// Process-local ledger that enforces the queue state machine.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `LedgerCall`, as an unreachable ledger would.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(WalletCoreError::LedgerCall("ledger unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn find<'a>(queue: &'a mut [QueuedTransaction], id: &str) -> Result<&'a mut QueuedTransaction> {
        queue
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| WalletCoreError::LedgerCall(format!("transaction {} not found", id)))
    }

    fn transition(tx: &mut QueuedTransaction, next: QueueStatus) -> Result<()> {
        if !tx.status.can_transition_to(next) {
            return Err(WalletCoreError::LedgerCall(format!(
                "transaction {} cannot move from {:?} to {:?}",
                tx.id, tx.status, next
            )));
        }
        tx.status = next;
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn register_wallet(&self, wallet: LedgerWallet) -> Result<()> {
        self.check_online()?;
        self.state.lock().await.wallets.insert(wallet.id.clone(), wallet);
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: &str) -> Result<Option<LedgerWallet>> {
        self.check_online()?;
        Ok(self.state.lock().await.wallets.get(wallet_id).cloned())
    }

    async fn list_wallets(&self, agent_id: &str) -> Result<Vec<LedgerWallet>> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut wallets: Vec<_> = state
            .wallets
            .values()
            .filter(|w| w.agent_id == agent_id)
            .cloned()
            .collect();
        wallets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(wallets)
    }

    async fn deregister_wallet(&self, wallet_id: &str) -> Result<()> {
        self.check_online()?;
        match self.state.lock().await.wallets.remove(wallet_id) {
            Some(_) => Ok(()),
            None => Err(WalletCoreError::LedgerCall(format!(
                "wallet {} is not registered",
                wallet_id
            ))),
        }
    }

    async fn update_wallet_status(&self, wallet_id: &str, status: WalletStatus) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let wallet = state.wallets.get_mut(wallet_id).ok_or_else(|| {
            WalletCoreError::LedgerCall(format!("wallet {} is not registered", wallet_id))
        })?;
        wallet.status = status;
        Ok(())
    }

    async fn enqueue_transaction(&self, action: QueuedAction) -> Result<String> {
        self.check_online()?;
        let id = uuid::Uuid::new_v4().to_string();
        self.state.lock().await.queue.push(QueuedTransaction {
            id: id.clone(),
            action,
            status: QueueStatus::Pending,
            retry_count: 0,
            scheduled_at: None,
            created_at: Utc::now(),
            signed_at: None,
            completed_at: None,
            error_message: None,
            result: None,
        });
        Ok(id)
    }

    async fn get_pending_transactions(&self) -> Result<Vec<QueuedTransaction>> {
        self.check_online()?;
        let now = Utc::now();
        let state = self.state.lock().await;
        let mut pending: Vec<_> = state
            .queue
            .iter()
            .filter(|tx| tx.status.is_pending())
            .filter(|tx| tx.scheduled_at.map_or(true, |at| at <= now))
            .cloned()
            .collect();
        // Highest priority first; FIFO within a priority.
        pending.sort_by(|a, b| {
            b.action
                .priority
                .cmp(&a.action.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(pending)
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<QueuedTransaction>> {
        self.check_online()?;
        Ok(self.state.lock().await.queue.iter().find(|tx| tx.id == id).cloned())
    }

    async fn mark_transaction_signed(&self, id: &str, signature: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let tx = Self::find(&mut state.queue, id)?;
        Self::transition(tx, QueueStatus::Signed)?;
        tx.signed_at = Some(Utc::now());
        tx.result = Some(signature.to_string());
        Ok(())
    }

    async fn mark_transaction_completed(&self, id: &str, tx_hash: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let tx = Self::find(&mut state.queue, id)?;
        Self::transition(tx, QueueStatus::Completed)?;
        tx.completed_at = Some(Utc::now());
        tx.result = Some(tx_hash.to_string());
        Ok(())
    }

    async fn mark_transaction_failed(&self, id: &str, error: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let tx = Self::find(&mut state.queue, id)?;
        Self::transition(tx, QueueStatus::Failed)?;
        tx.retry_count += 1;
        tx.error_message = Some(error.to_string());
        Ok(())
    }

    async fn retry_transaction(&self, id: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let tx = Self::find(&mut state.queue, id)?;
        if !tx.status.can_retry() {
            return Err(WalletCoreError::LedgerCall(format!(
                "transaction {} is {:?} and cannot be retried",
                id, tx.status
            )));
        }
        tx.status = QueueStatus::Queued;
        tx.retry_count += 1;
        tx.result = None;
        tx.signed_at = None;
        tx.completed_at = None;
        tx.error_message = None;
        Ok(())
    }

    async fn schedule_transaction(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let tx = Self::find(&mut state.queue, id)?;
        if tx.status != QueueStatus::Queued {
            Self::transition(tx, QueueStatus::Queued)?;
        }
        tx.scheduled_at = Some(at);
        Ok(())
    }

    async fn clear_completed_transactions(&self) -> Result<usize> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let before = state.queue.len();
        state.queue.retain(|tx| tx.status != QueueStatus::Completed);
        Ok(before - state.queue.len())
    }

    async fn get_transaction_queue_stats(&self) -> Result<QueueStats> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut stats = QueueStats {
            total: state.queue.len(),
            ..Default::default()
        };
        for tx in &state.queue {
            match tx.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Queued => stats.queued += 1,
                QueueStatus::Signed => stats.signed += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Priority;

    #[tokio::test]
    async fn test_happy_path_lifecycle() {
        let ledger = InMemoryLedger::new();
        let id = ledger
            .enqueue_transaction(QueuedAction::send_funds("w1", "to", "1"))
            .await
            .unwrap();

        ledger.mark_transaction_signed(&id, "sig").await.unwrap();
        ledger.mark_transaction_completed(&id, "0xhash").await.unwrap();

        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Completed);
        assert_eq!(tx.result.as_deref(), Some("0xhash"));
        assert!(tx.signed_at.is_some() && tx.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_completed_is_immutable() {
        let ledger = InMemoryLedger::new();
        let id = ledger
            .enqueue_transaction(QueuedAction::send_funds("w1", "to", "1"))
            .await
            .unwrap();
        ledger.mark_transaction_signed(&id, "sig").await.unwrap();
        ledger.mark_transaction_completed(&id, "h").await.unwrap();

        assert!(ledger.mark_transaction_failed(&id, "late").await.is_err());
        assert!(ledger.retry_transaction(&id).await.is_err());
        assert_eq!(ledger.clear_completed_transactions().await.unwrap(), 1);
        assert!(ledger.get_transaction(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_signed_entry_cannot_be_requeued() {
        let ledger = InMemoryLedger::new();
        let id = ledger
            .enqueue_transaction(QueuedAction::send_funds("w1", "to", "1"))
            .await
            .unwrap();
        ledger.mark_transaction_signed(&id, "sig").await.unwrap();

        let err = ledger.retry_transaction(&id).await.unwrap_err();
        assert!(err.to_string().contains("Signed"));
        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Signed);
        assert_eq!(tx.result.as_deref(), Some("sig"));
        assert_eq!(tx.retry_count, 0);
    }

    #[tokio::test]
    async fn test_retry_counts_and_clears() {
        let ledger = InMemoryLedger::new();
        let id = ledger
            .enqueue_transaction(QueuedAction::send_funds("w1", "to", "1"))
            .await
            .unwrap();
        ledger.mark_transaction_failed(&id, "boom").await.unwrap();
        ledger.retry_transaction(&id).await.unwrap();

        let tx = ledger.get_transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, QueueStatus::Queued);
        assert_eq!(tx.retry_count, 2);
        assert!(tx.error_message.is_none());
    }

    #[tokio::test]
    async fn test_pending_ordering_and_schedule() {
        let ledger = InMemoryLedger::new();
        let low = ledger
            .enqueue_transaction(QueuedAction {
                priority: Priority::Low,
                ..QueuedAction::send_funds("w1", "to", "1")
            })
            .await
            .unwrap();
        let high = ledger
            .enqueue_transaction(QueuedAction {
                priority: Priority::High,
                ..QueuedAction::send_funds("w1", "to", "2")
            })
            .await
            .unwrap();
        let later = ledger
            .enqueue_transaction(QueuedAction::send_funds("w1", "to", "3"))
            .await
            .unwrap();
        ledger
            .schedule_transaction(&later, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let pending = ledger.get_pending_transactions().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|tx| tx.id.clone()).collect();
        assert_eq!(ids, vec![high, low]);
    }

    #[tokio::test]
    async fn test_offline_ledger() {
        let ledger = InMemoryLedger::new();
        ledger.set_offline(true);
        assert!(matches!(
            ledger.ping().await,
            Err(WalletCoreError::LedgerCall(_))
        ));
    }
}
