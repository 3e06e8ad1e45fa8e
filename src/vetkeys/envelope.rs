//! Self-describing AEAD envelopes for secrets.

use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::ChaCha20Poly1305;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, WalletCoreError};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
pub const PASSWORD_SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeAlgorithm {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl EnvelopeAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl core::fmt::Display for EnvelopeAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeAlgorithm {
    type Err = WalletCoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "aes-256-gcm" | "aes256-gcm" | "aes256gcm" => Ok(Self::Aes256Gcm),
            "chacha20-poly1305" | "chacha20poly1305" => Ok(Self::ChaCha20Poly1305),
            other => Err(WalletCoreError::invalid_input(format!("unknown envelope algorithm {:?}", other))),
        }
    }
}

/// 256-bit symmetric key, wiped on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; KEY_LEN]>);

impl SecretKey {
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(WalletCoreError::invalid_input(format!(
                "secret key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// PBKDF2-HMAC-SHA256 of `password` under `salt`.
    pub fn from_password(password: &str, salt: &[u8], iterations: u32) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key[..]);
        Self(key)
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(text).map_err(|e| WalletCoreError::invalid_input(format!("bad key hex: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0[..]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Encrypted secret. Binary fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub id: String,
    pub algorithm: EnvelopeAlgorithm,
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    /// Present only when the key was derived from a password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// PBKDF2 rounds used with `salt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl EncryptedSecret {
    pub fn salt_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.salt.as_deref().map(|s| decode_field("salt", s)).transpose()
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| WalletCoreError::Decryption(format!("envelope {} is not base64: {}", name, e)))
}

/// Associated data: the envelope id and algorithm, so neither can be swapped.
fn aad(id: &str, algorithm: EnvelopeAlgorithm) -> Vec<u8> {
    format!("{}|{}", algorithm, id).into_bytes()
}

/// Seal `plaintext` under `key` with a fresh IV.
pub fn seal(
    algorithm: EnvelopeAlgorithm,
    key: &SecretKey,
    id: &str,
    plaintext: &[u8],
    salt: Option<&[u8]>,
) -> Result<EncryptedSecret> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let aad = aad(id, algorithm);
    let payload = Payload {
        msg: plaintext,
        aad: &aad,
    };

    let mut sealed = match algorithm {
        EnvelopeAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| WalletCoreError::Encryption(e.to_string()))?;
            cipher.encrypt(aes_gcm::Nonce::from_slice(&iv), payload)
        }
        EnvelopeAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| WalletCoreError::Encryption(e.to_string()))?;
            cipher.encrypt(chacha20poly1305::Nonce::from_slice(&iv), payload)
        }
    }
    .map_err(|e| WalletCoreError::Encryption(format!("{} encryption failed: {}", algorithm, e)))?;

    // Both ciphers append a 16-byte tag.
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok(EncryptedSecret {
        id: id.to_string(),
        algorithm,
        ciphertext: STANDARD.encode(&sealed),
        iv: STANDARD.encode(iv),
        tag: STANDARD.encode(tag),
        salt: salt.map(|s| STANDARD.encode(s)),
        iterations: None,
        created_at: Utc::now(),
    })
}

/// Verify the tag and decrypt with the algorithm the envelope names.
pub fn open(envelope: &EncryptedSecret, key: &SecretKey) -> Result<Zeroizing<Vec<u8>>> {
    let iv = decode_field("iv", &envelope.iv)?;
    if iv.len() != IV_LEN {
        return Err(WalletCoreError::Decryption(format!("iv must be {} bytes", IV_LEN)));
    }
    let mut sealed = decode_field("ciphertext", &envelope.ciphertext)?;
    let tag = decode_field("tag", &envelope.tag)?;
    if tag.len() != TAG_LEN {
        return Err(WalletCoreError::Decryption(format!("tag must be {} bytes", TAG_LEN)));
    }
    sealed.extend_from_slice(&tag);

    let aad = aad(&envelope.id, envelope.algorithm);
    let payload = Payload {
        msg: &sealed,
        aad: &aad,
    };
    let plaintext = match envelope.algorithm {
        EnvelopeAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| WalletCoreError::Decryption(e.to_string()))?;
            cipher.decrypt(aes_gcm::Nonce::from_slice(&iv), payload)
        }
        EnvelopeAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| WalletCoreError::Decryption(e.to_string()))?;
            cipher.decrypt(chacha20poly1305::Nonce::from_slice(&iv), payload)
        }
    }
    .map_err(|_| WalletCoreError::Decryption(format!("{} tag check failed (wrong key?)", envelope.algorithm)))?;

    Ok(Zeroizing::new(plaintext))
}
