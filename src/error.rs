//! Error types for agent wallet operations.
//!
//! Provides strongly-typed errors for derivation, storage, signing and
//! ledger interaction using `thiserror`.

use thiserror::Error;

/// Reason code attached to a key derivation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationFailure {
    /// Phrase is not a valid BIP-39 mnemonic (unknown word, bad length)
    InvalidMnemonic,
    /// Phrase words are valid but the checksum does not match
    BadChecksum,
    /// Chain has no derivation scheme for the requested method
    UnsupportedChain,
    /// Key material has the wrong length or encoding
    MalformedKey,
    /// Derivation path cannot be parsed or is not usable for the curve
    InvalidPath,
}

impl core::fmt::Display for DerivationFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let code = match self {
            Self::InvalidMnemonic => "invalid_mnemonic",
            Self::BadChecksum => "bad_checksum",
            Self::UnsupportedChain => "unsupported_chain",
            Self::MalformedKey => "malformed_key",
            Self::InvalidPath => "invalid_path",
        };
        f.write_str(code)
    }
}

/// Errors that can occur during wallet and transaction operations.
#[derive(Debug, Error)]
pub enum WalletCoreError {
    #[error("Key derivation failed ({reason}): {detail}")]
    KeyDerivation {
        reason: DerivationFailure,
        detail: String,
    },

    #[error("Wallet not found: {agent_id}/{wallet_id}")]
    WalletNotFound { agent_id: String, wallet_id: String },

    #[error("Wallet already exists: {agent_id}/{wallet_id}")]
    WalletExists { agent_id: String, wallet_id: String },

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Corrupted wallet record at {path}: {reason}")]
    CorruptedWalletRecord { path: String, reason: String },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("insufficient signatures: {required} required, {provided} provided")]
    InsufficientThreshold { required: usize, provided: usize },

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Ledger call failed: {0}")]
    LedgerCall(String),

    #[error("Provider error on {chain}: {reason}")]
    Provider { chain: String, reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WalletCoreError {
    pub(crate) fn derivation(reason: DerivationFailure, detail: impl Into<String>) -> Self {
        Self::KeyDerivation {
            reason,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn provider(chain: impl core::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Provider {
            chain: chain.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error signals caller misuse or corrupted input rather
    /// than a transient condition.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::KeyDerivation { .. }
                | Self::UnsupportedChain(_)
                | Self::Decryption(_)
                | Self::CorruptedWalletRecord { .. }
                | Self::InvalidInput { .. }
        )
    }
}

/// Result type alias for agent wallet operations.
pub type Result<T> = core::result::Result<T, WalletCoreError>;
