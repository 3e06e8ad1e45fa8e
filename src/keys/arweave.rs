//! Arweave RSA keys in JWK form.
//!
//! Arweave has no HD scheme. A seed-derived wallet gets an RSA key whose
//! primes are drawn from ChaCha20 seeded with a hash of the BIP-39 seed, so
//! the same phrase always reproduces the same JWK. The generator must stay
//! ChaCha20: its output is fixed, while `StdRng` may change between `rand`
//! releases and would orphan every existing Arweave wallet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::address;
use crate::error::{DerivationFailure, Result, WalletCoreError};

/// Modulus size used by Arweave wallets.
pub const DEFAULT_MODULUS_BITS: usize = 4096;

/// Path tag recorded for Arweave wallets in place of an HD path.
pub const JWK_PATH_TAG: &str = "jwk";

const SEED_DOMAIN: &[u8] = b"agent-wallet/arweave-jwk/v1";

/// RSA private key as a JSON Web Key. Every field is base64url, unpadded.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Jwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    pub d: String,
    pub p: String,
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

fn b64(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

fn unb64(field: &str, value: &str) -> Result<BigUint> {
    let bytes = Zeroizing::new(URL_SAFE_NO_PAD.decode(value).map_err(|e| {
        WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("JWK field {} is not base64url: {}", field, e),
        )
    })?);
    Ok(BigUint::from_bytes_be(&bytes))
}

fn seeded_rng(seed: &[u8]) -> ChaCha20Rng {
    let mut hasher = Sha256::new();
    hasher.update(SEED_DOMAIN);
    hasher.update(seed);
    let mut rng_seed: [u8; 32] = hasher.finalize().into();

    let rng = ChaCha20Rng::from_seed(rng_seed);
    rng_seed.zeroize();
    rng
}

/// Generate the RSA key bound to `seed`.
pub fn generate_from_seed(seed: &[u8], modulus_bits: usize) -> Result<RsaPrivateKey> {
    let mut rng = seeded_rng(seed);
    RsaPrivateKey::new(&mut rng, modulus_bits).map_err(|e| {
        WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("RSA key generation failed: {}", e),
        )
    })
}

pub fn to_jwk(key: &RsaPrivateKey) -> Result<Jwk> {
    let primes = key.primes();
    if primes.len() != 2 {
        return Err(WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            "multi-prime RSA keys are not supported",
        ));
    }
    let (p, q) = (&primes[0], &primes[1]);
    let d = key.d();
    let one = BigUint::from(1u8);
    let two = BigUint::from(2u8);

    let dp = d % &(p - &one);
    let dq = d % &(q - &one);
    // p is prime, so q^(p-2) is the inverse of q modulo p.
    let qi = q.modpow(&(p - &two), p);

    Ok(Jwk {
        kty: "RSA".to_string(),
        n: b64(key.n()),
        e: b64(key.e()),
        d: b64(d),
        p: b64(p),
        q: b64(q),
        dp: Some(b64(&dp)),
        dq: Some(b64(&dq)),
        qi: Some(b64(&qi)),
    })
}

pub fn from_jwk(jwk: &Jwk) -> Result<RsaPrivateKey> {
    if jwk.kty != "RSA" {
        return Err(WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("JWK kty must be RSA, got {:?}", jwk.kty),
        ));
    }

    let key = RsaPrivateKey::from_components(
        unb64("n", &jwk.n)?,
        unb64("e", &jwk.e)?,
        unb64("d", &jwk.d)?,
        vec![unb64("p", &jwk.p)?, unb64("q", &jwk.q)?],
    )
    .map_err(|e| WalletCoreError::derivation(DerivationFailure::MalformedKey, e.to_string()))?;

    key.validate()
        .map_err(|e| WalletCoreError::derivation(DerivationFailure::MalformedKey, e.to_string()))?;
    Ok(key)
}

/// Serialize to the compact JSON form stored in `WalletData::private_key`.
pub fn to_jwk_json(key: &RsaPrivateKey) -> Result<Zeroizing<String>> {
    let jwk = to_jwk(key)?;
    serde_json::to_string(&jwk)
        .map(Zeroizing::new)
        .map_err(|e| WalletCoreError::Serialization(e.to_string()))
}

pub fn from_jwk_json(material: &str) -> Result<RsaPrivateKey> {
    let jwk: Jwk = serde_json::from_str(material.trim()).map_err(|e| {
        WalletCoreError::derivation(
            DerivationFailure::MalformedKey,
            format!("not a JWK: {}", e),
        )
    })?;
    from_jwk(&jwk)
}

pub fn wallet_address(key: &RsaPrivateKey) -> String {
    address::arweave_address(&key.n().to_bytes_be())
}

/// Public modulus, base64url. Arweave calls this the owner.
pub fn owner(key: &RsaPrivateKey) -> String {
    b64(key.n())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small modulus keeps unit tests fast; production wallets use 4096.
    const TEST_BITS: usize = 1024;

    #[test]
    fn test_seed_generation_is_deterministic() {
        let a = generate_from_seed(&[1u8; 64], TEST_BITS).unwrap();
        let b = generate_from_seed(&[1u8; 64], TEST_BITS).unwrap();
        assert_eq!(wallet_address(&a), wallet_address(&b));

        let c = generate_from_seed(&[2u8; 64], TEST_BITS).unwrap();
        assert_ne!(wallet_address(&a), wallet_address(&c));
    }

    #[test]
    fn test_seeded_stream_is_fixed() {
        use rand::RngCore;

        let mut rng = seeded_rng(&[1u8; 64]);
        let mut head = [0u8; 32];
        rng.fill_bytes(&mut head);
        assert_eq!(
            hex::encode(head),
            "308cdc819dd50eae6196eefc8e48fc210af6e8a13a17512a0fe80d4ba32ccbc7"
        );
        // Continues into the second ChaCha20 block.
        let mut rest = [0u8; 40];
        rng.fill_bytes(&mut rest);
        assert_eq!(hex::encode(&rest[32..]), "481e8fab03e70ba9");
    }

    #[test]
    fn test_jwk_json_round_trip() {
        let key = generate_from_seed(&[9u8; 32], TEST_BITS).unwrap();
        let json = to_jwk_json(&key).unwrap();
        assert!(json.contains("\"kty\":\"RSA\""));

        let parsed = from_jwk_json(&json).unwrap();
        assert_eq!(wallet_address(&parsed), wallet_address(&key));
    }

    #[test]
    fn test_crt_parameters() {
        let key = generate_from_seed(&[4u8; 32], TEST_BITS).unwrap();
        let jwk = to_jwk(&key).unwrap();
        let p = unb64("p", &jwk.p).unwrap();
        let q = unb64("q", &jwk.q).unwrap();
        let qi = unb64("qi", jwk.qi.as_deref().unwrap()).unwrap();
        assert_eq!((q * qi) % &p, BigUint::from(1u8));
    }

    #[test]
    fn test_address_is_43_chars() {
        let key = generate_from_seed(&[8u8; 32], TEST_BITS).unwrap();
        let addr = wallet_address(&key);
        assert_eq!(addr.len(), 43);
        assert!(address::validate_arweave_address(&addr));
    }

    #[test]
    fn test_rejects_non_rsa_jwk() {
        let json = r#"{"kty":"EC","n":"AQ","e":"AQAB","d":"AQ","p":"AQ","q":"AQ"}"#;
        assert!(from_jwk_json(json).is_err());
    }
}
