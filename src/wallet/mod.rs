//! Wallet lifecycle for agents.
//!
//! [`WalletManager`] composes [`KeyDerivation`] and [`WalletStorage`],
//! owns a per-instance [`ConnectionCache`], and mirrors the public slice of
//! each wallet to an optional [`LedgerClient`].

mod cache;
mod sync;

pub use cache::ConnectionCache;
pub use sync::{AgentSyncReport, SyncOutcome};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::CoreConfig;
use crate::error::{Result, WalletCoreError};
use crate::keys::{self, DerivationRequest, KeyDerivation};
use crate::ledger::{LedgerClient, LedgerWallet, WalletStatus};
use crate::storage::{self, WalletStorage};
use crate::types::{Chain, CreationMethod, WalletData};

/// Everything needed to create one wallet.
#[derive(Clone)]
pub struct CreateWalletOptions {
    pub agent_id: String,
    pub chain: Chain,
    pub method: CreationMethod,
    pub material: Zeroizing<String>,
    pub derivation_path: Option<String>,
    /// Fixed id; a fresh UUID when unset.
    pub wallet_id: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl CreateWalletOptions {
    pub fn new(agent_id: impl Into<String>, chain: Chain, method: CreationMethod, material: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            chain,
            method,
            material: Zeroizing::new(material.into()),
            derivation_path: None,
            wallet_id: None,
            metadata: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.derivation_path = Some(path.into());
        self
    }

    pub fn with_id(mut self, wallet_id: impl Into<String>) -> Self {
        self.wallet_id = Some(wallet_id.into());
        self
    }
}

impl core::fmt::Debug for CreateWalletOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CreateWalletOptions")
            .field("agent_id", &self.agent_id)
            .field("chain", &self.chain)
            .field("method", &self.method)
            .field("derivation_path", &self.derivation_path)
            .field("wallet_id", &self.wallet_id)
            .finish_non_exhaustive()
    }
}

pub struct WalletManager {
    storage: WalletStorage,
    derivation: KeyDerivation,
    ledger: Option<Arc<dyn LedgerClient>>,
    connections: ConnectionCache,
}

impl WalletManager {
    pub fn new(storage: WalletStorage, derivation: KeyDerivation) -> Self {
        Self {
            storage,
            derivation,
            ledger: None,
            connections: ConnectionCache::new(),
        }
    }

    /// Storage and derivation as described by `config`.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let storage = WalletStorage::new(&config.storage)?;
        Ok(Self::new(storage, KeyDerivation::new(config.derivation.options())))
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn storage(&self) -> &WalletStorage {
        &self.storage
    }

    pub fn derivation(&self) -> &KeyDerivation {
        &self.derivation
    }

    pub fn connections(&self) -> &ConnectionCache {
        &self.connections
    }

    pub fn ledger(&self) -> Option<&Arc<dyn LedgerClient>> {
        self.ledger.as_ref()
    }

    /// Derive, persist and return a new wallet.
    pub fn create_wallet(&self, options: CreateWalletOptions) -> Result<WalletData> {
        // 1. Derive
        let request = DerivationRequest {
            method: options.method,
            material: options.material.as_str(),
            derivation_path: options.derivation_path.as_deref(),
            chain: options.chain,
        };
        let derived = self.derivation.derive(&request)?;

        // 2. Resolve id
        let wallet_id = options
            .wallet_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.storage.exists(&options.agent_id, &wallet_id)? {
            return Err(WalletCoreError::WalletExists {
                agent_id: options.agent_id.clone(),
                wallet_id,
            });
        }

        // 3. Assemble record
        let (private_key, mnemonic) = match options.method {
            CreationMethod::PrivateKey => (Some(derived.private_key.to_string()), None),
            CreationMethod::Seed | CreationMethod::Mnemonic => (None, Some(options.material.trim().to_string())),
        };
        let now = Utc::now();
        let wallet = WalletData {
            id: wallet_id,
            agent_id: options.agent_id.clone(),
            chain: options.chain,
            address: derived.address.clone(),
            private_key,
            mnemonic,
            derivation_path: derived.derivation_path.clone(),
            created_at: now,
            updated_at: now,
            creation_method: options.method,
            metadata: options.metadata.clone(),
        };

        // 4. Persist
        self.storage.save(&wallet)?;
        info!(
            agent_id = %wallet.agent_id,
            wallet_id = %wallet.id,
            chain = %wallet.chain,
            method = %wallet.creation_method,
            address = %wallet.address,
            "wallet created"
        );
        Ok(wallet)
    }

    pub fn import_wallet_from_private_key(&self, agent_id: &str, chain: Chain, private_key: &str) -> Result<WalletData> {
        self.create_wallet(CreateWalletOptions::new(agent_id, chain, CreationMethod::PrivateKey, private_key))
    }

    /// `seed` is a BIP-39 phrase or a hex seed.
    pub fn import_wallet_from_seed(
        &self,
        agent_id: &str,
        chain: Chain,
        seed: &str,
        derivation_path: Option<&str>,
    ) -> Result<WalletData> {
        let mut options = CreateWalletOptions::new(agent_id, chain, CreationMethod::Seed, seed);
        options.derivation_path = derivation_path.map(str::to_string);
        self.create_wallet(options)
    }

    pub fn import_wallet_from_mnemonic(
        &self,
        agent_id: &str,
        chain: Chain,
        mnemonic: &str,
        derivation_path: Option<&str>,
    ) -> Result<WalletData> {
        if !keys::validate_mnemonic(mnemonic) {
            // Surface the precise reason (unknown word vs. checksum).
            keys::mnemonic::parse_mnemonic(mnemonic)?;
        }
        let mut options = CreateWalletOptions::new(agent_id, chain, CreationMethod::Mnemonic, mnemonic);
        options.derivation_path = derivation_path.map(str::to_string);
        self.create_wallet(options)
    }

    /// Fresh CSPRNG mnemonic, imported through the seed path.
    pub fn generate_wallet(&self, agent_id: &str, chain: Chain) -> Result<WalletData> {
        let phrase = keys::generate_mnemonic(keys::DEFAULT_WORD_COUNT)?;
        self.import_wallet_from_seed(agent_id, chain, &phrase, None)
    }

    pub fn get_wallet(&self, agent_id: &str, wallet_id: &str) -> Result<Option<WalletData>> {
        self.storage.load(agent_id, wallet_id)
    }

    /// Look a wallet up by id alone, across every stored agent.
    pub fn find_wallet(&self, wallet_id: &str) -> Result<Option<WalletData>> {
        if storage::validate_id("wallet id", wallet_id).is_err() {
            return Ok(None);
        }
        for agent_id in self.storage.list_agents()? {
            if let Some(wallet) = self.storage.load(&agent_id, wallet_id)? {
                return Ok(Some(wallet));
            }
        }
        Ok(None)
    }

    pub fn list_agent_wallets(&self, agent_id: &str) -> Result<Vec<WalletData>> {
        self.storage.list_wallets(agent_id)
    }

    pub fn has_wallet(&self, agent_id: &str, wallet_id: &str) -> Result<bool> {
        self.storage.exists(agent_id, wallet_id)
    }

    /// Delete the record and drop any cached connection.
    pub fn remove_wallet(&self, agent_id: &str, wallet_id: &str) -> Result<()> {
        self.connections.clear(agent_id, wallet_id);
        if !self.storage.delete(agent_id, wallet_id)? {
            return Err(not_found(agent_id, wallet_id));
        }
        info!(agent_id, wallet_id, "wallet removed");
        Ok(())
    }

    /// Returns how many wallets were removed.
    pub fn clear_agent_wallets(&self, agent_id: &str) -> Result<usize> {
        self.connections.clear_agent(agent_id);
        let removed = self.storage.delete_agent(agent_id)?;
        info!(agent_id, removed, "agent wallets cleared");
        Ok(removed)
    }

    /// Merge `entries` into the wallet's metadata.
    pub fn update_wallet_metadata(
        &self,
        agent_id: &str,
        wallet_id: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<WalletData> {
        let mut wallet = self
            .get_wallet(agent_id, wallet_id)?
            .ok_or_else(|| not_found(agent_id, wallet_id))?;
        wallet.metadata.get_or_insert_with(BTreeMap::new).extend(entries);
        wallet.touch();
        self.storage.save(&wallet)?;
        Ok(wallet)
    }

    // -----------------------------------------------------------------------
    // Ledger sync
    // -----------------------------------------------------------------------

    fn ledger_record(wallet: &WalletData) -> LedgerWallet {
        LedgerWallet {
            id: wallet.id.clone(),
            agent_id: wallet.agent_id.clone(),
            chain: wallet.chain,
            address: wallet.address.clone(),
            registered_at: Utc::now(),
            status: WalletStatus::Active,
        }
    }

    /// Register the public slice of one wallet.
    pub async fn sync_wallet_to_canister(&self, agent_id: &str, wallet_id: &str) -> SyncOutcome {
        let Some(ledger) = self.ledger.as_ref() else {
            return SyncOutcome::not_configured();
        };
        let record = match self.get_wallet(agent_id, wallet_id) {
            Ok(Some(wallet)) => Self::ledger_record(&wallet),
            Ok(None) => return SyncOutcome::failed(not_found(agent_id, wallet_id).to_string()),
            Err(e) => return SyncOutcome::failed(e.to_string()),
        };

        let outcome = SyncOutcome::from(ledger.register_wallet(record).await);
        if let Some(error) = &outcome.error {
            warn!(agent_id, wallet_id, error = %error, "wallet sync failed; saved locally only");
        }
        outcome
    }

    /// Sync every wallet of `agent_id`; one failure does not stop the rest.
    pub async fn sync_agent_wallets(&self, agent_id: &str) -> AgentSyncReport {
        let mut report = AgentSyncReport::default();
        let wallets = match self.list_agent_wallets(agent_id) {
            Ok(wallets) => wallets,
            Err(e) => {
                warn!(agent_id, error = %e, "cannot list wallets for sync");
                return report;
            }
        };

        for wallet in &wallets {
            let outcome = match self.ledger.as_ref() {
                Some(ledger) => SyncOutcome::from(ledger.register_wallet(Self::ledger_record(wallet)).await),
                None => SyncOutcome::not_configured(),
            };
            report.record(wallet.id.clone(), outcome);
        }
        info!(agent_id, total = report.total, synced = report.synced, failed = report.failed, "agent wallets synced");
        report
    }

    pub async fn deregister_wallet_from_canister(&self, wallet_id: &str) -> SyncOutcome {
        match self.ledger.as_ref() {
            Some(ledger) => SyncOutcome::from(ledger.deregister_wallet(wallet_id).await),
            None => SyncOutcome::not_configured(),
        }
    }

    pub async fn update_canister_wallet_status(&self, wallet_id: &str, status: WalletStatus) -> SyncOutcome {
        match self.ledger.as_ref() {
            Some(ledger) => SyncOutcome::from(ledger.update_wallet_status(wallet_id, status).await),
            None => SyncOutcome::not_configured(),
        }
    }
}

impl core::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WalletManager")
            .field("base_dir", &self.storage.base_dir())
            .field("ledger", &self.ledger.is_some())
            .field("connections", &self.connections)
            .finish()
    }
}

fn not_found(agent_id: &str, wallet_id: &str) -> WalletCoreError {
    WalletCoreError::WalletNotFound {
        agent_id: agent_id.to_string(),
        wallet_id: wallet_id.to_string(),
    }
}
