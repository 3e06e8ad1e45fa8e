//! ed25519 keys for Solana and Polkadot (SLIP-10 derivation).
//!
//! SLIP-10 only defines hardened children for ed25519, so every path
//! segment must carry a `'` or `h` marker.

use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroizing;

use super::address;
use crate::error::{DerivationFailure, Result, WalletCoreError};

type HmacSha512 = Hmac<Sha512>;

const SLIP10_CURVE_KEY: &[u8] = b"ed25519 seed";
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Parse `m/44'/501'/0'/0'` into hardened child indices.
pub fn parse_hardened_path(path: &str) -> Result<Vec<u32>> {
    let invalid = |detail: String| WalletCoreError::derivation(DerivationFailure::InvalidPath, detail);

    let mut segments = path.trim().split('/');
    if segments.next() != Some("m") {
        return Err(invalid(format!("path {:?} must start with m/", path)));
    }

    segments
        .map(|segment| {
            let index = segment
                .strip_suffix('\'')
                .or_else(|| segment.strip_suffix('h'))
                .ok_or_else(|| {
                    invalid(format!(
                        "segment {:?} of {:?} is not hardened; ed25519 requires hardened derivation",
                        segment, path
                    ))
                })?;
            let index: u32 = index
                .parse()
                .map_err(|_| invalid(format!("segment {:?} of {:?} is not a number", segment, path)))?;
            if index >= HARDENED_OFFSET {
                return Err(invalid(format!("segment {:?} out of range", segment)));
            }
            Ok(index + HARDENED_OFFSET)
        })
        .collect()
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|e| {
        WalletCoreError::derivation(DerivationFailure::MalformedKey, e.to_string())
    })?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// SLIP-10 child secret for `path`.
pub fn derive_secret(seed: &[u8], path: &str) -> Result<Zeroizing<[u8; 32]>> {
    let indices = parse_hardened_path(path)?;

    let mut node = hmac_sha512(SLIP10_CURVE_KEY, &[seed])?;
    for index in indices {
        let (key, chain_code) = node.split_at(32);
        node = hmac_sha512(chain_code, &[&[0u8][..], key, &index.to_be_bytes()[..]])?;
    }

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&node[..32]);
    Ok(secret)
}

pub fn derive_signing_key(seed: &[u8], path: &str) -> Result<SigningKey> {
    let secret = derive_secret(seed, path)?;
    Ok(SigningKey::from_bytes(&secret))
}

/// Solana keys: base58 of a 64-byte keypair, or of a bare 32-byte secret.
pub fn parse_solana_key(material: &str) -> Result<SigningKey> {
    let bytes = Zeroizing::new(bs58::decode(material.trim()).into_vec().map_err(|e| {
        WalletCoreError::derivation(DerivationFailure::MalformedKey, format!("not base58: {}", e))
    })?);

    match bytes.len() {
        64 => {
            let mut keypair = Zeroizing::new([0u8; 64]);
            keypair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&keypair).map_err(|_| {
                WalletCoreError::derivation(
                    DerivationFailure::MalformedKey,
                    "keypair public half does not match its secret",
                )
            })
        }
        32 => {
            let mut secret = Zeroizing::new([0u8; 32]);
            secret.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&secret))
        }
        n => Err(WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("Solana key must be 32 or 64 bytes, got {}", n),
        )),
    }
}

/// Polkadot keys: hex of the 32-byte ed25519 mini-secret.
pub fn parse_polkadot_key(material: &str) -> Result<SigningKey> {
    let trimmed = material.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(hex::decode(stripped).map_err(|e| {
        WalletCoreError::derivation(DerivationFailure::MalformedKey, format!("not hex: {}", e))
    })?);
    if bytes.len() != 32 {
        return Err(WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("ed25519 secret must be 32 bytes, got {}", bytes.len()),
        ));
    }
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&bytes);
    Ok(SigningKey::from_bytes(&secret))
}

/// Solana export format: base58 of secret || public.
pub fn solana_private_key(key: &SigningKey) -> Zeroizing<String> {
    let keypair = Zeroizing::new(key.to_keypair_bytes());
    Zeroizing::new(bs58::encode(keypair.as_slice()).into_string())
}

pub fn polkadot_private_key(key: &SigningKey) -> Zeroizing<String> {
    let secret = Zeroizing::new(key.to_bytes());
    Zeroizing::new(format!("0x{}", hex::encode(secret.as_slice())))
}

pub fn solana_address(key: &SigningKey) -> String {
    bs58::encode(key.verifying_key().as_bytes()).into_string()
}

pub fn polkadot_address(key: &SigningKey) -> String {
    address::ss58_encode(address::POLKADOT_SS58_PREFIX, key.verifying_key().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slip10_vector_1_master_child() {
        // SLIP-10 test vector 1 for ed25519, chain m/0'.
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let secret = derive_secret(&seed, "m/0'").unwrap();
        assert_eq!(
            hex::encode(*secret),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }

    #[test]
    fn test_slip10_vector_1_master() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let secret = derive_secret(&seed, "m").unwrap();
        assert_eq!(
            hex::encode(*secret),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
    }

    #[test]
    fn test_rejects_unhardened_segment() {
        match parse_hardened_path("m/44'/501'/0'/0") {
            Err(WalletCoreError::KeyDerivation { reason, .. }) => {
                assert_eq!(reason, DerivationFailure::InvalidPath)
            }
            other => panic!("expected invalid path, got {:?}", other),
        }
    }

    #[test]
    fn test_accepts_h_marker() {
        let a = parse_hardened_path("m/44h/501h").unwrap();
        let b = parse_hardened_path("m/44'/501'").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_solana_key_round_trip() {
        let seed = [3u8; 64];
        let key = derive_signing_key(&seed, "m/44'/501'/0'/0'").unwrap();
        let exported = solana_private_key(&key);
        let parsed = parse_solana_key(&exported).unwrap();
        assert_eq!(solana_address(&parsed), solana_address(&key));
    }

    #[test]
    fn test_polkadot_key_round_trip() {
        let seed = [5u8; 64];
        let key = derive_signing_key(&seed, "m/44'/354'/0'/0'/0'").unwrap();
        let exported = polkadot_private_key(&key);
        let parsed = parse_polkadot_key(&exported).unwrap();
        assert_eq!(polkadot_address(&parsed), polkadot_address(&key));
        assert!(polkadot_address(&key).starts_with('1'));
    }
}
