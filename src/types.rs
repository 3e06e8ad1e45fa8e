//! Core types shared by every layer of the wallet core.
//!
//! Secret-bearing records (`WalletData`) redact their secrets in `Debug` and
//! wipe them on drop.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Result, WalletCoreError};

/// The five supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    CkEth,
    Polkadot,
    Solana,
    Icp,
    Arweave,
}

/// Signature curve used by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Secp256k1,
    Ed25519,
    Rsa,
}

impl Chain {
    /// Every supported chain, in dispatch order.
    pub const ALL: [Chain; 5] = [
        Chain::CkEth,
        Chain::Polkadot,
        Chain::Solana,
        Chain::Icp,
        Chain::Arweave,
    ];

    /// Lowercase wire tag used in records and ledger calls.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::CkEth => "cketh",
            Chain::Polkadot => "polkadot",
            Chain::Solana => "solana",
            Chain::Icp => "icp",
            Chain::Arweave => "arweave",
        }
    }

    pub fn curve(&self) -> Curve {
        match self {
            Chain::CkEth | Chain::Icp => Curve::Secp256k1,
            Chain::Polkadot | Chain::Solana => Curve::Ed25519,
            Chain::Arweave => Curve::Rsa,
        }
    }

    /// Canonical HD path, `None` for Arweave which holds a JWK instead.
    pub fn default_derivation_path(&self) -> Option<&'static str> {
        match self {
            Chain::CkEth => Some("m/44'/60'/0'/0/0"),
            Chain::Polkadot => Some("m/44'/354'/0'/0'/0'"),
            Chain::Solana => Some("m/44'/501'/0'/0'"),
            Chain::Icp => Some("m/44'/223'/0'/0/0"),
            Chain::Arweave => None,
        }
    }

    /// Native token symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::CkEth => "ckETH",
            Chain::Polkadot => "DOT",
            Chain::Solana => "SOL",
            Chain::Icp => "ICP",
            Chain::Arweave => "AR",
        }
    }
}

impl core::fmt::Display for Chain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = WalletCoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cketh" | "ck-eth" | "cketh-sepolia" => Ok(Chain::CkEth),
            "polkadot" | "dot" => Ok(Chain::Polkadot),
            "solana" | "sol" => Ok(Chain::Solana),
            "icp" => Ok(Chain::Icp),
            "arweave" | "ar" => Ok(Chain::Arweave),
            _ => Err(WalletCoreError::UnsupportedChain(s.to_string())),
        }
    }
}

/// How a wallet's key material was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationMethod {
    PrivateKey,
    Seed,
    Mnemonic,
}

impl core::fmt::Display for CreationMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::PrivateKey => "private-key",
            Self::Seed => "seed",
            Self::Mnemonic => "mnemonic",
        };
        f.write_str(s)
    }
}

/// A wallet owned by an agent, including its secret material.
///
/// `mnemonic` holds the seed material for both `Seed` and `Mnemonic` wallets
/// (a BIP-39 phrase, or a hex seed for `Seed`); `private_key` is only set for
/// `PrivateKey` wallets.
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletData {
    pub id: String,
    pub agent_id: String,
    pub chain: Chain,
    pub address: String,
    pub private_key: Option<String>,
    pub mnemonic: Option<String>,
    pub derivation_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub creation_method: CreationMethod,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl WalletData {
    /// Record the time of a field mutation.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at { now } else { self.updated_at };
    }

    /// Whether the record carries material that can produce a signing key.
    pub fn has_key_material(&self) -> bool {
        self.private_key.is_some() || self.mnemonic.is_some()
    }

    /// Check that the populated secret matches the creation method.
    pub fn check_secret_invariant(&self) -> Result<()> {
        let ok = match self.creation_method {
            CreationMethod::PrivateKey => self.mnemonic.is_none(),
            CreationMethod::Seed | CreationMethod::Mnemonic => self.private_key.is_none(),
        };
        if ok {
            Ok(())
        } else {
            Err(WalletCoreError::invalid_input(format!(
                "wallet {} holds secrets that do not match creation method {}",
                self.id, self.creation_method
            )))
        }
    }

    /// Public projection of the record. Never carries secrets.
    pub fn public_view(&self) -> WalletSummary {
        WalletSummary {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            chain: self.chain,
            address: self.address.clone(),
            derivation_path: self.derivation_path.clone(),
            creation_method: self.creation_method,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl core::fmt::Debug for WalletData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WalletData")
            .field("id", &self.id)
            .field("agent_id", &self.agent_id)
            .field("chain", &self.chain)
            .field("address", &self.address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("derivation_path", &self.derivation_path)
            .field("creation_method", &self.creation_method)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Drop for WalletData {
    fn drop(&mut self) {
        if let Some(key) = self.private_key.as_mut() {
            key.zeroize();
        }
        if let Some(phrase) = self.mnemonic.as_mut() {
            phrase.zeroize();
        }
    }
}

/// Secret-free view of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub id: String,
    pub agent_id: String,
    pub chain: Chain,
    pub address: String,
    pub derivation_path: String,
    pub creation_method: CreationMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chain-agnostic transfer request. `amount` is in chain-native base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: String,
    pub amount: String,
    pub chain: Chain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<String>,
}

impl TransactionRequest {
    pub fn new(chain: Chain, to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            amount: amount.into(),
            chain,
            memo: None,
            gas_price: None,
            gas_limit: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Reject empty recipients and non-decimal amounts.
    pub fn validate(&self) -> Result<()> {
        if self.to.trim().is_empty() {
            return Err(WalletCoreError::invalid_input("recipient address is empty"));
        }
        if !is_decimal(&self.amount) {
            return Err(WalletCoreError::invalid_input(format!(
                "amount must be a decimal string, got {:?}",
                self.amount
            )));
        }
        for (name, value) in [("gas_price", &self.gas_price), ("gas_limit", &self.gas_limit)] {
            if let Some(v) = value {
                if !is_decimal(v) {
                    return Err(WalletCoreError::invalid_input(format!(
                        "{} must be a decimal string, got {:?}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Amount as integer base units. Fractional amounts are rejected.
    pub fn amount_units(&self) -> Result<u128> {
        self.amount.parse::<u128>().map_err(|_| {
            WalletCoreError::invalid_input(format!(
                "amount {:?} is not an integer number of base units",
                self.amount
            ))
        })
    }
}

fn is_decimal(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    match frac {
        None => digits(int),
        Some(f) => digits(int) && digits(f),
    }
}

/// Lifecycle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Canonical view of an on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub chain: Chain,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    pub fee: String,
}

/// Result of signing a request: opaque chain encoding plus signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub signed_tx: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Fee quote for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub chain: Chain,
    /// Fee in chain-native base units.
    pub amount: String,
    pub symbol: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_tags_round_trip() {
        for chain in Chain::ALL {
            assert_eq!(chain.as_str().parse::<Chain>().unwrap(), chain);
        }
    }

    #[test]
    fn test_unknown_chain_tag() {
        let err = "bitcoin".parse::<Chain>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported chain: bitcoin");
    }

    #[test]
    fn test_chain_serde_tag() {
        let json = serde_json::to_string(&Chain::CkEth).unwrap();
        assert_eq!(json, "\"cketh\"");
    }

    #[test]
    fn test_request_validation() {
        assert!(TransactionRequest::new(Chain::Icp, "abc", "100").validate().is_ok());
        assert!(TransactionRequest::new(Chain::Icp, "abc", "1.5").validate().is_ok());
        assert!(TransactionRequest::new(Chain::Icp, "", "100").validate().is_err());
        assert!(TransactionRequest::new(Chain::Icp, "abc", "-1").validate().is_err());
        assert!(TransactionRequest::new(Chain::Icp, "abc", "1.").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let now = Utc::now();
        let wallet = WalletData {
            id: "w1".into(),
            agent_id: "a1".into(),
            chain: Chain::Solana,
            address: "addr".into(),
            private_key: Some("super-secret".into()),
            mnemonic: None,
            derivation_path: "m/44'/501'/0'/0'".into(),
            created_at: now,
            updated_at: now,
            creation_method: CreationMethod::PrivateKey,
            metadata: None,
        };
        let dbg = format!("{:?}", wallet);
        assert!(!dbg.contains("super-secret"));
        assert!(wallet.check_secret_invariant().is_ok());
    }
}
