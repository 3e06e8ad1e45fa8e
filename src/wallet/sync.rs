//! Outcomes of mirroring public wallet metadata to the ledger.

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub(crate) const LEDGER_NOT_CONFIGURED: &str = "ledger not configured";

/// Result of one ledger sync call. Sync never raises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    pub(crate) fn not_configured() -> Self {
        Self::failed(LEDGER_NOT_CONFIGURED)
    }
}

impl From<Result<()>> for SyncOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Per-wallet sync results for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSyncReport {
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
    /// `(wallet_id, outcome)` in listing order.
    pub outcomes: Vec<(String, SyncOutcome)>,
}

impl AgentSyncReport {
    pub(crate) fn record(&mut self, wallet_id: String, outcome: SyncOutcome) {
        self.total += 1;
        if outcome.success {
            self.synced += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push((wallet_id, outcome));
    }
}
