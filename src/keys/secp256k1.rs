//! secp256k1 keys for ckETH and ICP (BIP-32 derivation).

use bip32::{DerivationPath, XPrv};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha224};
use sha3::Keccak256;
use zeroize::Zeroizing;

use super::address;
use crate::error::{DerivationFailure, Result, WalletCoreError};

/// DER prefix of a SubjectPublicKeyInfo for an uncompressed secp256k1 point.
const SECP256K1_SPKI_PREFIX: [u8; 23] = [
    0x30, 0x56, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05,
    0x2b, 0x81, 0x04, 0x00, 0x0a, 0x03, 0x42, 0x00,
];

/// Principal type tag for self-authenticating ids.
const SELF_AUTHENTICATING_TAG: u8 = 0x02;

/// Derive a BIP-32 child key from a BIP-39 seed.
pub fn derive_signing_key(seed: &[u8], path: &str) -> Result<SigningKey> {
    let path: DerivationPath = path.parse().map_err(|e| {
        WalletCoreError::derivation(
            DerivationFailure::InvalidPath,
            format!("cannot parse derivation path {:?}: {}", path, e),
        )
    })?;

    let xprv = XPrv::derive_from_path(seed, &path).map_err(|e| {
        WalletCoreError::derivation(DerivationFailure::MalformedKey, format!("BIP-32: {}", e))
    })?;

    Ok(xprv.private_key().clone())
}

/// Parse a 32-byte hex scalar, with or without a `0x` prefix.
pub fn parse_private_key(material: &str) -> Result<SigningKey> {
    let trimmed = material.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(hex::decode(stripped).map_err(|e| {
        WalletCoreError::derivation(DerivationFailure::MalformedKey, format!("not hex: {}", e))
    })?);

    if bytes.len() != 32 {
        return Err(WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("secp256k1 key must be 32 bytes, got {}", bytes.len()),
        ));
    }

    SigningKey::from_slice(&bytes).map_err(|_| {
        WalletCoreError::derivation(DerivationFailure::MalformedKey, "scalar out of range")
    })
}

/// Lowercase hex of the secret scalar.
pub fn private_key_hex(key: &SigningKey) -> Zeroizing<String> {
    let bytes = Zeroizing::new(key.to_bytes().to_vec());
    Zeroizing::new(hex::encode(bytes.as_slice()))
}

/// SEC1 uncompressed public key (65 bytes, leading 0x04).
pub fn uncompressed_public_key(key: &SigningKey) -> Vec<u8> {
    key.verifying_key()
        .as_affine()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec()
}

/// EIP-55 checksummed Ethereum-style address for ckETH.
pub fn eth_address(key: &SigningKey) -> String {
    let point = uncompressed_public_key(key);
    let hash = Keccak256::digest(&point[1..]);
    address::eip55_checksum(&hash[12..])
}

/// Self-authenticating ICP principal in its dashed textual form.
pub fn icp_principal(key: &SigningKey) -> String {
    let point = uncompressed_public_key(key);

    let mut der = Vec::with_capacity(SECP256K1_SPKI_PREFIX.len() + point.len());
    der.extend_from_slice(&SECP256K1_SPKI_PREFIX);
    der.extend_from_slice(&point);

    let mut principal = Sha224::digest(&der).to_vec();
    principal.push(SELF_AUTHENTICATING_TAG);

    address::principal_to_text(&principal)
}
