//! # Agent Wallet
//!
//! Multi-chain wallet core for autonomous agents.
//!
//! Agents own wallets on ckETH, Polkadot, Solana, ICP and Arweave. This crate
//! derives their keys, persists the records, signs and dispatches
//! transactions through per-chain providers, fans out batches across chains
//! and drains a ledger-backed transaction queue.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agent_wallet::{Chain, CoreConfig, WalletManager};
//!
//! let config = CoreConfig::from_env().unwrap();
//! let manager = WalletManager::from_config(&config).unwrap();
//!
//! // Fresh 12-word wallet for an agent
//! let wallet = manager.generate_wallet("agent-1", Chain::Icp).unwrap();
//! println!("{} {}", wallet.chain, wallet.address);
//!
//! // Same phrase, same address
//! let phrase = wallet.mnemonic.as_deref().unwrap();
//! let again = manager
//!     .import_wallet_from_mnemonic("agent-1", Chain::Icp, phrase, None)
//!     .unwrap();
//! assert_eq!(wallet.address, again.address);
//! ```
//!
//! ## Security
//!
//! - Private keys and mnemonics are zeroized on drop
//! - Secrets at rest can be sealed with AES-256-GCM under a passphrase
//! - The threshold signing in [`vetkeys`] is a placeholder, not production
//!   threshold cryptography

pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod providers;
pub mod runtime;
pub mod storage;
pub mod types;
pub mod vetkeys;
pub mod wallet;

// Re-export the main entry points
pub use config::CoreConfig;
pub use keys::{DerivationRequest, DerivedKey, KeyDerivation};
pub use ledger::{InMemoryLedger, LedgerClient};
pub use providers::{ChainProvider, ProviderFactory};
pub use runtime::{ChainDispatcher, CrossChainAggregator, TransactionQueueProcessor};
pub use storage::WalletStorage;
pub use vetkeys::VetKeysAdapter;
pub use wallet::{CreateWalletOptions, WalletManager};

// Re-export types
pub use error::{Result, WalletCoreError};
pub use types::{
    Chain, CreationMethod, FeeEstimate, SignedTransaction, Transaction, TransactionRequest, TxStatus, WalletData,
    WalletSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
