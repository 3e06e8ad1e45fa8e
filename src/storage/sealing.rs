//! At-rest sealing of wallet secrets.
//!
//! Enforces:
//! 1. Memory hygiene (Zeroize)
//! 2. Encryption at rest (AES-256-GCM)
//! 3. Passphrase key derivation (PBKDF2-HMAC-SHA256, per-store salt)
//!
//! Each sealed field is bound to its record location through the AEAD
//! associated data, so a ciphertext copied into another record fails to open.

use std::fs;
use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, WalletCoreError};

/// File holding the store's PBKDF2 salt.
pub const SALT_FILE: &str = ".storage-salt";
pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// A secret field as written to disk.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoredSecret {
    /// Trusted-filesystem mode: no passphrase configured.
    Plain { value: String },
    Sealed { nonce: Vec<u8>, ciphertext: Vec<u8> },
}

impl StoredSecret {
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed { .. })
    }
}

/// AES-256-GCM key derived from the storage passphrase.
pub struct SecretSealer {
    key: Zeroizing<[u8; 32]>,
}

impl SecretSealer {
    pub fn from_passphrase(passphrase: &str, salt: &[u8], iterations: u32) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key[..]);
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        let key_array = aes_gcm::aead::generic_array::GenericArray::from_slice(&self.key[..]);
        Aes256Gcm::new(key_array)
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &str, context: &str) -> Result<StoredSecret> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: context.as_bytes(),
                },
            )
            .map_err(|e| WalletCoreError::Encryption(format!("sealing failed: {}", e)))?;

        Ok(StoredSecret::Sealed {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    /// Recover a secret. Plain secrets pass through unchanged.
    pub fn open(&self, secret: &StoredSecret, context: &str) -> Result<Zeroizing<String>> {
        match secret {
            StoredSecret::Plain { value } => Ok(Zeroizing::new(value.clone())),
            StoredSecret::Sealed { nonce, ciphertext } => {
                if nonce.len() != NONCE_LEN {
                    return Err(WalletCoreError::Decryption("sealed field has a bad nonce".into()));
                }
                let plaintext = Zeroizing::new(
                    self.cipher()
                        .decrypt(
                            Nonce::from_slice(nonce),
                            Payload {
                                msg: ciphertext,
                                aad: context.as_bytes(),
                            },
                        )
                        .map_err(|_| {
                            WalletCoreError::Decryption(
                                "sealed field failed authentication (wrong passphrase?)".into(),
                            )
                        })?,
                );
                let text = std::str::from_utf8(&plaintext)
                    .map_err(|_| WalletCoreError::Decryption("sealed field is not UTF-8".into()))?;
                Ok(Zeroizing::new(text.to_string()))
            }
        }
    }
}

/// Read the store salt, creating it on first use.
pub fn load_or_create_salt(base_dir: &Path) -> Result<[u8; SALT_LEN]> {
    let path = base_dir.join(SALT_FILE);
    if path.exists() {
        let bytes = fs::read(&path)?;
        if bytes.len() != SALT_LEN {
            return Err(WalletCoreError::CorruptedWalletRecord {
                path: path.display().to_string(),
                reason: format!("salt must be {} bytes, found {}", SALT_LEN, bytes.len()),
            });
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes);
        return Ok(salt);
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    fs::create_dir_all(base_dir)?;
    fs::write(&path, salt)?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer(passphrase: &str) -> SecretSealer {
        SecretSealer::from_passphrase(passphrase, b"0123456789abcdef", 1_000)
    }

    #[test]
    fn test_seal_open_round_trip() {
        let s = sealer("correct horse");
        let sealed = s.seal("0xsecret", "agent/w1/private_key").unwrap();
        assert!(sealed.is_sealed());
        let opened = s.open(&sealed, "agent/w1/private_key").unwrap();
        assert_eq!(opened.as_str(), "0xsecret");
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let sealed = sealer("right").seal("secret", "ctx").unwrap();
        let err = sealer("wrong").open(&sealed, "ctx").unwrap_err();
        assert!(matches!(err, WalletCoreError::Decryption(_)));
    }

    #[test]
    fn test_context_binding() {
        let s = sealer("pw");
        let sealed = s.seal("secret", "agent/w1/mnemonic").unwrap();
        assert!(s.open(&sealed, "agent/w2/mnemonic").is_err());
    }

    #[test]
    fn test_nonces_are_fresh() {
        let s = sealer("pw");
        let a = s.seal("same", "ctx").unwrap();
        let b = s.seal("same", "ctx").unwrap();
        match (&a, &b) {
            (StoredSecret::Sealed { nonce: n1, .. }, StoredSecret::Sealed { nonce: n2, .. }) => {
                assert_ne!(n1, n2)
            }
            _ => panic!("expected sealed secrets"),
        }
    }

    #[test]
    fn test_salt_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_salt(dir.path()).unwrap();
        let second = load_or_create_salt(dir.path()).unwrap();
        assert_eq!(first, second);
    }
}
