//! Runtime configuration.
//!
//! Every section has a usable `Default`. `CoreConfig::from_env` layers
//! environment overrides on top of the defaults; `from_json_str` loads the
//! same shape from a JSON document (missing sections fall back to defaults).

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletCoreError};
use crate::keys::arweave::DEFAULT_MODULUS_BITS;
use crate::keys::DerivationOptions;
use crate::types::Chain;
use crate::vetkeys::EnvelopeAlgorithm;

pub const ENV_WALLET_DIR: &str = "AGENT_WALLET_DIR";
pub const ENV_PASSPHRASE: &str = "AGENT_WALLET_PASSPHRASE";
pub const ENV_KDF_ITERATIONS: &str = "AGENT_WALLET_KDF_ITERATIONS";
pub const ENV_QUEUE_MAX_RETRIES: &str = "QUEUE_MAX_RETRIES";
pub const ENV_AGGREGATOR_MAX_CONCURRENCY: &str = "AGGREGATOR_MAX_CONCURRENCY";
pub const ENV_VETKEYS_THRESHOLD: &str = "VETKEYS_THRESHOLD";
pub const ENV_VETKEYS_TOTAL_SHARES: &str = "VETKEYS_TOTAL_SHARES";
pub const ENV_VETKEYS_ALGORITHM: &str = "VETKEYS_ALGORITHM";

/// PBKDF2-HMAC-SHA256 rounds for passphrase-derived keys.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Top-level configuration for the wallet core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub storage: StorageConfig,
    pub derivation: DerivationConfig,
    pub dispatcher: DispatcherConfig,
    pub queue: QueueConfig,
    pub aggregator: AggregatorConfig,
    pub vetkeys: VetKeysConfig,
}

impl CoreConfig {
    /// Defaults overridden by any recognised environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var(ENV_WALLET_DIR) {
            config.storage.base_dir = PathBuf::from(dir);
        }
        if let Ok(passphrase) = env::var(ENV_PASSPHRASE) {
            if !passphrase.is_empty() {
                config.storage.passphrase = Some(passphrase);
            }
        }
        if let Some(iterations) = env_parse(ENV_KDF_ITERATIONS)? {
            config.storage.kdf_iterations = iterations;
            config.vetkeys.kdf_iterations = iterations;
        }

        for chain in Chain::ALL {
            let var = ProviderConfig::env_var(chain);
            if let Ok(url) = env::var(&var) {
                config.dispatcher.providers.rpc_urls.insert(chain, url);
            }
        }

        if let Some(retries) = env_parse(ENV_QUEUE_MAX_RETRIES)? {
            config.queue.max_retries = retries;
        }
        if let Some(concurrency) = env_parse(ENV_AGGREGATOR_MAX_CONCURRENCY)? {
            config.aggregator.max_concurrency = concurrency;
        }
        if let Some(threshold) = env_parse(ENV_VETKEYS_THRESHOLD)? {
            config.vetkeys.threshold = threshold;
        }
        if let Some(total) = env_parse(ENV_VETKEYS_TOTAL_SHARES)? {
            config.vetkeys.total_shares = total;
        }
        if let Some(algorithm) = env_parse(ENV_VETKEYS_ALGORITHM)? {
            config.vetkeys.algorithm = algorithm;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WalletCoreError::invalid_input(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.storage.kdf_iterations == 0 {
            return Err(WalletCoreError::invalid_input("kdf_iterations must be positive"));
        }
        if self.queue.max_retries == 0 {
            return Err(WalletCoreError::invalid_input("queue.max_retries must be at least 1"));
        }
        if self.aggregator.max_concurrency == 0 {
            return Err(WalletCoreError::invalid_input(
                "aggregator.max_concurrency must be at least 1",
            ));
        }
        if self.vetkeys.threshold == 0 || self.vetkeys.threshold > self.vetkeys.total_shares {
            return Err(WalletCoreError::invalid_input(format!(
                "vetkeys threshold {} must be between 1 and total_shares {}",
                self.vetkeys.threshold, self.vetkeys.total_shares
            )));
        }
        if self.derivation.arweave_modulus_bits < 1024 {
            return Err(WalletCoreError::invalid_input(
                "arweave_modulus_bits must be at least 1024",
            ));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WalletCoreError::invalid_input(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Where and how wallet records are persisted.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
    /// Seals secret fields at rest when set.
    pub passphrase: Option<String>,
    pub kdf_iterations: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(".agent-wallets"),
            passphrase: None,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

impl core::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_dir", &self.base_dir)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("kdf_iterations", &self.kdf_iterations)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    pub arweave_modulus_bits: usize,
}

impl DerivationConfig {
    /// Options for a [`crate::keys::KeyDerivation`]; anything that re-derives
    /// keys must use the same ones that created the wallet.
    pub fn options(&self) -> DerivationOptions {
        DerivationOptions {
            arweave_modulus_bits: self.arweave_modulus_bits,
            ..Default::default()
        }
    }
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            arweave_modulus_bits: DEFAULT_MODULUS_BITS,
        }
    }
}

/// Node endpoints and HTTP behaviour for the provider layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub rpc_urls: BTreeMap<Chain, String>,
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    /// `CKETH_RPC_URL`, `SOLANA_RPC_URL`, ...
    pub fn env_var(chain: Chain) -> String {
        format!("{}_RPC_URL", chain.as_str().to_ascii_uppercase())
    }

    pub fn default_url(chain: Chain) -> &'static str {
        match chain {
            Chain::CkEth => "https://ethereum-sepolia-rpc.publicnode.com",
            Chain::Polkadot => "https://rpc.polkadot.io",
            Chain::Solana => "https://api.devnet.solana.com",
            Chain::Icp => "https://rosetta-api.internetcomputer.org",
            Chain::Arweave => "https://arweave.net",
        }
    }

    /// Configured endpoint for `chain`, or its public default.
    pub fn endpoint(&self, chain: Chain) -> String {
        self.rpc_urls
            .get(&chain)
            .cloned()
            .unwrap_or_else(|| Self::default_url(chain).to_string())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rpc_urls: BTreeMap::new(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Chains that get a provider; anything else is rejected as unsupported.
    pub enabled_chains: Vec<Chain>,
    pub providers: ProviderConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled_chains: Chain::ALL.to_vec(),
            providers: ProviderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Failed attempts allowed before a transaction is marked failed.
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub max_concurrency: usize,
    pub continue_on_error: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            continue_on_error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VetKeysConfig {
    pub threshold: usize,
    pub total_shares: usize,
    pub algorithm: EnvelopeAlgorithm,
    pub kdf_iterations: u32,
}

impl Default for VetKeysConfig {
    fn default() -> Self {
        Self {
            threshold: 1,
            total_shares: 3,
            algorithm: EnvelopeAlgorithm::Aes256Gcm,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}
