//! Routes wallet operations to the provider of the wallet's chain.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::queue::TransactionSigner;
use crate::config::{CoreConfig, DispatcherConfig};
use crate::error::{Result, WalletCoreError};
use crate::keys::KeyDerivation;
use crate::providers::{ProviderFactory, SharedProvider};
use crate::types::{Chain, FeeEstimate, SignedTransaction, Transaction, TransactionRequest, TxStatus, WalletData};

/// Outcome of connecting or disconnecting one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub chain: Chain,
    pub connected: bool,
    pub error: Option<String>,
}

pub struct ChainDispatcher {
    providers: HashMap<Chain, SharedProvider>,
    derivation: KeyDerivation,
}

impl ChainDispatcher {
    /// One HTTP-backed provider per enabled chain.
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        let mut providers = HashMap::new();
        for &chain in &config.enabled_chains {
            providers.insert(chain, ProviderFactory::create(chain, &config.providers)?);
        }
        debug!(chains = providers.len(), "dispatcher ready");
        Ok(Self {
            providers,
            derivation: KeyDerivation::default(),
        })
    }

    /// Providers from `config.dispatcher`, recovering keys with the same
    /// derivation settings that [`crate::WalletManager::from_config`] uses.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        Ok(Self::new(&config.dispatcher)?.with_derivation(KeyDerivation::new(config.derivation.options())))
    }

    /// Dispatcher over pre-built providers, keyed by their own chain.
    pub fn with_providers(providers: impl IntoIterator<Item = SharedProvider>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.chain(), p)).collect(),
            derivation: KeyDerivation::default(),
        }
    }

    /// Derivation used to recover keys from mnemonic-backed wallets.
    pub fn with_derivation(mut self, derivation: KeyDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    /// Configured chains, in tag order.
    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<_> = self.providers.keys().copied().collect();
        chains.sort();
        chains
    }

    pub fn provider(&self, chain: Chain) -> Result<&SharedProvider> {
        self.providers
            .get(&chain)
            .ok_or_else(|| WalletCoreError::UnsupportedChain(chain.to_string()))
    }

    async fn connected(&self, chain: Chain) -> Result<&SharedProvider> {
        let provider = self.provider(chain)?;
        provider.connect().await?;
        Ok(provider)
    }

    fn check_chain(wallet: &WalletData, request: &TransactionRequest) -> Result<()> {
        if wallet.chain != request.chain {
            return Err(WalletCoreError::invalid_input(format!(
                "wallet {} is on {}, request targets {}",
                wallet.id, wallet.chain, request.chain
            )));
        }
        Ok(())
    }

    /// Submit a transfer from `wallet`.
    ///
    /// Wallets with key material are signed locally and broadcast; others
    /// ask the node to sign for the account.
    pub async fn dispatch_transaction(&self, wallet: &WalletData, request: &TransactionRequest) -> Result<Transaction> {
        Self::check_chain(wallet, request)?;
        let provider = self.connected(wallet.chain).await?;

        let hash = if wallet.has_key_material() {
            let signed = self.sign_with(provider, wallet, request).await?;
            provider.broadcast_transaction(&signed).await?
        } else {
            provider.send_transaction(&wallet.address, request).await?
        };

        info!(
            agent_id = %wallet.agent_id,
            wallet_id = %wallet.id,
            chain = %wallet.chain,
            tx_hash = %hash,
            "transaction dispatched"
        );
        Ok(Transaction {
            hash,
            from: wallet.address.clone(),
            to: request.to.clone(),
            amount: request.amount.clone(),
            chain: wallet.chain,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
            fee: "0".into(),
        })
    }

    async fn sign_with(
        &self,
        provider: &SharedProvider,
        wallet: &WalletData,
        request: &TransactionRequest,
    ) -> Result<SignedTransaction> {
        // Dropped (and wiped) when this call returns.
        let private_key = self.derivation.wallet_private_key(wallet)?;
        provider.sign_transaction(request, &private_key).await
    }

    /// Sign without broadcasting.
    pub async fn sign_transaction(&self, wallet: &WalletData, request: &TransactionRequest) -> Result<SignedTransaction> {
        Self::check_chain(wallet, request)?;
        let provider = self.provider(wallet.chain)?;
        self.sign_with(provider, wallet, request).await
    }

    pub async fn get_balance(&self, wallet: &WalletData) -> Result<String> {
        self.connected(wallet.chain).await?.get_balance(&wallet.address).await
    }

    pub async fn get_transaction_history(&self, wallet: &WalletData, limit: usize) -> Result<Vec<Transaction>> {
        self.connected(wallet.chain)
            .await?
            .get_transaction_history(&wallet.address, limit)
            .await
    }

    pub async fn estimate_fee(&self, request: &TransactionRequest) -> Result<FeeEstimate> {
        self.connected(request.chain).await?.estimate_fee(request).await
    }

    pub fn validate_address(&self, address: &str, chain: Chain) -> Result<bool> {
        Ok(self.provider(chain)?.validate_address(address))
    }

    pub async fn get_block_number(&self, chain: Chain) -> Result<u64> {
        self.connected(chain).await?.get_block_number().await
    }

    pub async fn get_transaction(&self, chain: Chain, hash: &str) -> Result<Option<Transaction>> {
        self.connected(chain).await?.get_transaction(hash).await
    }

    /// Connect every provider; failures are reported, not raised.
    pub async fn connect_all(&self) -> Vec<ConnectionReport> {
        let mut reports = Vec::with_capacity(self.providers.len());
        for chain in self.chains() {
            let result = match self.provider(chain) {
                Ok(provider) => provider.connect().await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!(%chain, error = %e, "provider connect failed");
            }
            reports.push(ConnectionReport {
                chain,
                connected: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        reports
    }

    pub async fn disconnect_all(&self) -> Vec<ConnectionReport> {
        let mut reports = Vec::with_capacity(self.providers.len());
        for chain in self.chains() {
            let result = match self.provider(chain) {
                Ok(provider) => provider.disconnect().await,
                Err(e) => Err(e),
            };
            let connected = self.provider(chain).map(|p| p.is_connected()).unwrap_or(false);
            reports.push(ConnectionReport {
                chain,
                connected,
                error: result.err().map(|e| e.to_string()),
            });
        }
        reports
    }
}

#[async_trait]
impl TransactionSigner for ChainDispatcher {
    async fn sign(&self, wallet: &WalletData, request: &TransactionRequest) -> Result<Option<SignedTransaction>> {
        self.sign_transaction(wallet, request).await.map(Some)
    }
}

impl core::fmt::Debug for ChainDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChainDispatcher").field("chains", &self.chains()).finish()
    }
}
