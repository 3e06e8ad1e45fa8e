//! Deterministic key derivation for every supported chain.
//!
//! `KeyDerivation::derive` is a pure function of
//! `(method, material, derivation_path, chain)`; the same inputs always
//! yield the same address. Private keys leave this module as
//! [`Zeroizing`] strings in the chain's import format, so a derived key can
//! be fed back through the `PrivateKey` method and lands on the same
//! address.

pub mod address;
pub mod arweave;
pub mod ed25519;
pub mod mnemonic;
pub mod secp256k1;

use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use crate::error::{DerivationFailure, Result, WalletCoreError};
use crate::types::{Chain, CreationMethod, WalletData};

pub use address::validate_address;
pub use mnemonic::{generate_mnemonic, validate_mnemonic, DEFAULT_WORD_COUNT};

/// Input to [`KeyDerivation::derive`].
pub struct DerivationRequest<'a> {
    pub method: CreationMethod,
    /// Private key, mnemonic phrase, or (for `Seed`) a phrase or hex seed.
    pub material: &'a str,
    /// Overrides the chain's canonical path when set.
    pub derivation_path: Option<&'a str>,
    pub chain: Chain,
}

impl<'a> DerivationRequest<'a> {
    pub fn new(chain: Chain, method: CreationMethod, material: &'a str) -> Self {
        Self {
            method,
            material,
            derivation_path: None,
            chain,
        }
    }

    pub fn with_path(mut self, path: &'a str) -> Self {
        self.derivation_path = Some(path);
        self
    }
}

/// Output of a derivation. The private key is wiped when dropped.
pub struct DerivedKey {
    pub address: String,
    /// Private key in the chain's import format (hex, base58 keypair or JWK).
    pub private_key: Zeroizing<String>,
    /// Public key, hex (Arweave: base64url modulus).
    pub public_key: String,
    pub derivation_path: String,
}

impl core::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("derivation_path", &self.derivation_path)
            .finish_non_exhaustive()
    }
}

/// A parsed signing key for one chain.
pub enum ChainSigningKey {
    Secp256k1(k256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

/// Tunables for derivation.
#[derive(Clone)]
pub struct DerivationOptions {
    /// Optional BIP-39 passphrase (the "25th word").
    pub bip39_passphrase: Zeroizing<String>,
    /// RSA modulus size for seed-derived Arweave keys.
    pub arweave_modulus_bits: usize,
}

impl Default for DerivationOptions {
    fn default() -> Self {
        Self {
            bip39_passphrase: Zeroizing::new(String::new()),
            arweave_modulus_bits: arweave::DEFAULT_MODULUS_BITS,
        }
    }
}

impl core::fmt::Debug for DerivationOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DerivationOptions")
            .field("bip39_passphrase", &(!self.bip39_passphrase.is_empty()))
            .field("arweave_modulus_bits", &self.arweave_modulus_bits)
            .finish()
    }
}

/// Stateless derivation engine.
#[derive(Debug, Clone, Default)]
pub struct KeyDerivation {
    options: DerivationOptions,
}

impl KeyDerivation {
    pub fn new(options: DerivationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DerivationOptions {
        &self.options
    }

    /// Derive the address and key for `request`.
    pub fn derive(&self, request: &DerivationRequest<'_>) -> Result<DerivedKey> {
        match request.method {
            CreationMethod::PrivateKey => {
                Self::from_private_key(request.chain, request.material, request.derivation_path)
            }
            CreationMethod::Mnemonic => {
                let seed = mnemonic::mnemonic_to_seed(request.material, &self.options.bip39_passphrase)?;
                self.from_seed(request.chain, seed.as_slice(), request.derivation_path)
            }
            CreationMethod::Seed => {
                let seed = self.seed_bytes(request.material)?;
                self.from_seed(request.chain, &seed, request.derivation_path)
            }
        }
    }

    /// Seed bytes for the `Seed` method: a BIP-39 phrase, or 16..=64 hex bytes.
    fn seed_bytes(&self, material: &str) -> Result<Zeroizing<Vec<u8>>> {
        let trimmed = material.trim();
        if trimmed.contains(char::is_whitespace) {
            let seed = mnemonic::mnemonic_to_seed(trimmed, &self.options.bip39_passphrase)?;
            return Ok(Zeroizing::new(seed.to_vec()));
        }

        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(hex::decode(stripped).map_err(|_| {
            WalletCoreError::derivation(
                DerivationFailure::InvalidMnemonic,
                "seed is neither a mnemonic phrase nor hex",
            )
        })?);
        if !(16..=64).contains(&bytes.len()) {
            return Err(WalletCoreError::derivation(
                DerivationFailure::MalformedKey,
                format!("hex seed must be 16 to 64 bytes, got {}", bytes.len()),
            ));
        }
        Ok(bytes)
    }

    fn from_seed(&self, chain: Chain, seed: &[u8], path: Option<&str>) -> Result<DerivedKey> {
        match chain {
            Chain::CkEth | Chain::Icp => {
                let path = resolve_path(chain, path)?;
                let key = secp256k1::derive_signing_key(seed, &path)?;
                Ok(secp256k1_output(chain, &key, path))
            }
            Chain::Solana | Chain::Polkadot => {
                let path = resolve_path(chain, path)?;
                let key = ed25519::derive_signing_key(seed, &path)?;
                Ok(ed25519_output(chain, &key, path))
            }
            Chain::Arweave => {
                let key = arweave::generate_from_seed(seed, self.options.arweave_modulus_bits)?;
                arweave_output(&key, path)
            }
        }
    }

    fn from_private_key(chain: Chain, material: &str, path: Option<&str>) -> Result<DerivedKey> {
        match Self::signing_key(chain, material)? {
            ChainSigningKey::Secp256k1(key) => {
                Ok(secp256k1_output(chain, &key, resolve_path(chain, path)?))
            }
            ChainSigningKey::Ed25519(key) => {
                Ok(ed25519_output(chain, &key, resolve_path(chain, path)?))
            }
            ChainSigningKey::Rsa(key) => arweave_output(&key, path),
        }
    }

    /// Parse a private key in `chain`'s import format.
    pub fn signing_key(chain: Chain, private_key: &str) -> Result<ChainSigningKey> {
        Ok(match chain {
            Chain::CkEth | Chain::Icp => {
                ChainSigningKey::Secp256k1(secp256k1::parse_private_key(private_key)?)
            }
            Chain::Solana => ChainSigningKey::Ed25519(ed25519::parse_solana_key(private_key)?),
            Chain::Polkadot => ChainSigningKey::Ed25519(ed25519::parse_polkadot_key(private_key)?),
            Chain::Arweave => ChainSigningKey::Rsa(Box::new(arweave::from_jwk_json(private_key)?)),
        })
    }

    /// Recover the private key of a stored wallet.
    ///
    /// Mnemonic- and seed-backed wallets are re-derived along their recorded
    /// path; the result must land on the recorded address.
    pub fn wallet_private_key(&self, wallet: &WalletData) -> Result<Zeroizing<String>> {
        if let Some(key) = wallet.private_key.as_deref() {
            return Ok(Zeroizing::new(key.to_string()));
        }
        let material = wallet.mnemonic.as_deref().ok_or_else(|| {
            WalletCoreError::SigningFailed(format!("wallet {} has no key material", wallet.id))
        })?;

        let path = match wallet.chain {
            Chain::Arweave => None,
            _ => Some(wallet.derivation_path.as_str()),
        };
        let request = DerivationRequest {
            method: wallet.creation_method,
            material,
            derivation_path: path,
            chain: wallet.chain,
        };
        let derived = self.derive(&request)?;
        if derived.address != wallet.address {
            return Err(WalletCoreError::SigningFailed(format!(
                "wallet {} key material does not match its address",
                wallet.id
            )));
        }
        Ok(derived.private_key.clone())
    }
}

fn resolve_path(chain: Chain, path: Option<&str>) -> Result<String> {
    match path.or_else(|| chain.default_derivation_path()) {
        Some(p) => Ok(p.to_string()),
        None => Err(WalletCoreError::derivation(
            DerivationFailure::UnsupportedChain,
            format!("{} has no HD derivation path", chain),
        )),
    }
}

fn secp256k1_output(chain: Chain, key: &k256::ecdsa::SigningKey, path: String) -> DerivedKey {
    let hex_key = secp256k1::private_key_hex(key);
    let (address, private_key) = match chain {
        Chain::Icp => (secp256k1::icp_principal(key), hex_key),
        _ => (
            secp256k1::eth_address(key),
            Zeroizing::new(format!("0x{}", hex_key.as_str())),
        ),
    };
    DerivedKey {
        address,
        private_key,
        public_key: hex::encode(secp256k1::uncompressed_public_key(key)),
        derivation_path: path,
    }
}

fn ed25519_output(chain: Chain, key: &ed25519_dalek::SigningKey, path: String) -> DerivedKey {
    let (address, private_key) = match chain {
        Chain::Solana => (ed25519::solana_address(key), ed25519::solana_private_key(key)),
        _ => (ed25519::polkadot_address(key), ed25519::polkadot_private_key(key)),
    };
    DerivedKey {
        address,
        private_key,
        public_key: hex::encode(key.verifying_key().as_bytes()),
        derivation_path: path,
    }
}

fn arweave_output(key: &RsaPrivateKey, path: Option<&str>) -> Result<DerivedKey> {
    Ok(DerivedKey {
        address: arweave::wallet_address(key),
        private_key: arweave::to_jwk_json(key)?,
        public_key: arweave::owner(key),
        derivation_path: path.unwrap_or(arweave::JWK_PATH_TAG).to_string(),
    })
}
