//! Local transaction signing over a canonical transfer digest.
//!
//! The signed artifact is an envelope of `{payload, public_key, signature}`
//! in the chain's preferred text encoding. It is not each network's native
//! wire format.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::Blake2b;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::error::{Result, WalletCoreError};
use crate::keys::{self, ChainSigningKey, KeyDerivation};
use crate::types::{Chain, SignedTransaction, TransactionRequest};

/// The fields every chain signs, in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransfer {
    pub chain: Chain,
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<String>,
}

impl UnsignedTransfer {
    pub fn new(from: impl Into<String>, request: &TransactionRequest) -> Self {
        Self {
            chain: request.chain,
            from: from.into(),
            to: request.to.clone(),
            amount: request.amount.clone(),
            memo: request.memo.clone(),
            gas_price: request.gas_price.clone(),
            gas_limit: request.gas_limit.clone(),
        }
    }

    /// Canonical bytes: compact JSON with struct field order.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WalletCoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: UnsignedTransfer,
    /// Hex public key (Arweave: base64url modulus).
    pub public_key: String,
    pub signature: String,
}

fn sig_encode(chain: Chain, bytes: &[u8]) -> String {
    match chain {
        Chain::Solana => bs58::encode(bytes).into_string(),
        Chain::Arweave => URL_SAFE_NO_PAD.encode(bytes),
        _ => hex::encode(bytes),
    }
}

fn sig_decode(chain: Chain, text: &str) -> Result<Vec<u8>> {
    let decoded = match chain {
        Chain::Solana => bs58::decode(text).into_vec().map_err(|e| e.to_string()),
        Chain::Arweave => URL_SAFE_NO_PAD.decode(text).map_err(|e| e.to_string()),
        _ => hex::decode(text).map_err(|e| e.to_string()),
    };
    decoded.map_err(|e| WalletCoreError::invalid_input(format!("bad {} signature encoding: {}", chain, e)))
}

fn envelope_encode(chain: Chain, bytes: &[u8]) -> String {
    match chain {
        Chain::CkEth | Chain::Polkadot => format!("0x{}", hex::encode(bytes)),
        Chain::Solana => STANDARD.encode(bytes),
        Chain::Icp => hex::encode(bytes),
        Chain::Arweave => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn envelope_decode(chain: Chain, text: &str) -> Result<Vec<u8>> {
    let decoded = match chain {
        Chain::CkEth | Chain::Polkadot => {
            hex::decode(text.strip_prefix("0x").unwrap_or(text)).map_err(|e| e.to_string())
        }
        Chain::Solana => STANDARD.decode(text).map_err(|e| e.to_string()),
        Chain::Icp => hex::decode(text).map_err(|e| e.to_string()),
        Chain::Arweave => Ok(text.as_bytes().to_vec()),
    };
    decoded.map_err(|e| WalletCoreError::invalid_input(format!("bad {} transaction encoding: {}", chain, e)))
}

/// Sign `request` with a private key in `chain`'s import format.
pub fn sign_request(chain: Chain, request: &TransactionRequest, private_key: &str) -> Result<SignedTransaction> {
    if request.chain != chain {
        return Err(WalletCoreError::invalid_input(format!(
            "request for {} handed to the {} signer",
            request.chain, chain
        )));
    }
    request.validate()?;

    let signing_key = KeyDerivation::signing_key(chain, private_key)
        .map_err(|e| WalletCoreError::SigningFailed(e.to_string()))?;

    let (from, public_key) = match &signing_key {
        ChainSigningKey::Secp256k1(key) => {
            let from = match chain {
                Chain::Icp => keys::secp256k1::icp_principal(key),
                _ => keys::secp256k1::eth_address(key),
            };
            (from, hex::encode(keys::secp256k1::uncompressed_public_key(key)))
        }
        ChainSigningKey::Ed25519(key) => {
            let from = match chain {
                Chain::Solana => keys::ed25519::solana_address(key),
                _ => keys::ed25519::polkadot_address(key),
            };
            (from, hex::encode(key.verifying_key().as_bytes()))
        }
        ChainSigningKey::Rsa(key) => (keys::arweave::wallet_address(key), keys::arweave::owner(key)),
    };

    let payload = UnsignedTransfer::new(from, request);
    let message = payload.canonical_bytes()?;

    let signature = match signing_key {
        ChainSigningKey::Secp256k1(key) if chain == Chain::CkEth => {
            let digest = Keccak256::digest(&message);
            let (sig, recovery_id) = key
                .sign_prehash_recoverable(&digest)
                .map_err(|e| WalletCoreError::SigningFailed(e.to_string()))?;
            let mut bytes = sig.to_bytes().to_vec();
            bytes.push(recovery_id.to_byte() + 27);
            bytes
        }
        ChainSigningKey::Secp256k1(key) => {
            use k256::ecdsa::signature::Signer;
            let sig: k256::ecdsa::Signature = key.sign(&message);
            sig.to_bytes().to_vec()
        }
        ChainSigningKey::Ed25519(key) => {
            use ed25519_dalek::Signer;
            key.sign(&message).to_bytes().to_vec()
        }
        ChainSigningKey::Rsa(key) => {
            use rsa::signature::{RandomizedSigner, SignatureEncoding};
            let signer = rsa::pss::BlindedSigningKey::<Sha256>::new(*key);
            signer
                .try_sign_with_rng(&mut OsRng, &message)
                .map_err(|e| WalletCoreError::SigningFailed(e.to_string()))?
                .to_vec()
        }
    };

    let envelope = SignedEnvelope {
        payload,
        public_key,
        signature: sig_encode(chain, &signature),
    };
    let envelope_bytes =
        serde_json::to_vec(&envelope).map_err(|e| WalletCoreError::Serialization(e.to_string()))?;

    Ok(SignedTransaction {
        signed_tx: envelope_encode(chain, &envelope_bytes),
        signature: envelope.signature,
        tx_hash: None,
    })
}

pub fn decode_envelope(chain: Chain, signed: &SignedTransaction) -> Result<SignedEnvelope> {
    let bytes = envelope_decode(chain, &signed.signed_tx)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| WalletCoreError::invalid_input(format!("not a signed {} envelope: {}", chain, e)))
}

/// Check the envelope signature against its embedded public key.
pub fn verify_signed(chain: Chain, signed: &SignedTransaction) -> Result<bool> {
    let envelope = decode_envelope(chain, signed)?;
    if envelope.payload.chain != chain {
        return Ok(false);
    }
    let message = envelope.payload.canonical_bytes()?;
    let signature = sig_decode(chain, &envelope.signature)?;
    let bad_key = |e: String| WalletCoreError::invalid_input(format!("bad {} public key: {}", chain, e));

    let valid = match chain {
        Chain::CkEth | Chain::Icp => {
            let key_bytes = hex::decode(&envelope.public_key).map_err(|e| bad_key(e.to_string()))?;
            let vk = k256::ecdsa::VerifyingKey::from_sec1_bytes(&key_bytes).map_err(|e| bad_key(e.to_string()))?;
            if signature.len() < 64 {
                return Ok(false);
            }
            let Ok(sig) = k256::ecdsa::Signature::from_slice(&signature[..64]) else {
                return Ok(false);
            };
            if chain == Chain::CkEth {
                use k256::ecdsa::signature::hazmat::PrehashVerifier;
                vk.verify_prehash(&Keccak256::digest(&message), &sig).is_ok()
            } else {
                use k256::ecdsa::signature::Verifier;
                vk.verify(&message, &sig).is_ok()
            }
        }
        Chain::Solana | Chain::Polkadot => {
            use ed25519_dalek::Verifier;
            let key_bytes: [u8; 32] = hex::decode(&envelope.public_key)
                .map_err(|e| bad_key(e.to_string()))?
                .try_into()
                .map_err(|_| bad_key("expected 32 bytes".into()))?;
            let vk = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes).map_err(|e| bad_key(e.to_string()))?;
            let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.as_slice()) else {
                return Ok(false);
            };
            vk.verify(&message, &ed25519_dalek::Signature::from_bytes(&sig_bytes)).is_ok()
        }
        Chain::Arweave => {
            use rsa::signature::Verifier;
            let modulus = URL_SAFE_NO_PAD
                .decode(&envelope.public_key)
                .map_err(|e| bad_key(e.to_string()))?;
            let public = rsa::RsaPublicKey::new(
                rsa::BigUint::from_bytes_be(&modulus),
                rsa::BigUint::from(65_537u32),
            )
            .map_err(|e| bad_key(e.to_string()))?;
            let verifier = rsa::pss::VerifyingKey::<Sha256>::new(public);
            let Ok(sig) = rsa::pss::Signature::try_from(signature.as_slice()) else {
                return Ok(false);
            };
            verifier.verify(&message, &sig).is_ok()
        }
    };
    Ok(valid)
}

/// Transaction id a node will assign to this envelope.
pub fn transaction_hash(chain: Chain, signed: &SignedTransaction) -> Result<String> {
    let bytes = envelope_decode(chain, &signed.signed_tx)?;
    Ok(match chain {
        Chain::CkEth => format!("0x{}", hex::encode(Keccak256::digest(&bytes))),
        Chain::Polkadot => format!("0x{}", hex::encode(Blake2b::<U32>::digest(&bytes))),
        Chain::Solana => signed.signature.clone(),
        Chain::Icp => hex::encode(Sha256::digest(&bytes)),
        Chain::Arweave => {
            let signature = sig_decode(chain, &signed.signature)?;
            URL_SAFE_NO_PAD.encode(Sha256::digest(&signature))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{DerivationOptions, DerivationRequest};
    use crate::types::CreationMethod;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn key_for(chain: Chain) -> (String, String) {
        let kd = KeyDerivation::new(DerivationOptions {
            arweave_modulus_bits: 1024,
            ..Default::default()
        });
        let derived = kd
            .derive(&DerivationRequest::new(chain, CreationMethod::Mnemonic, PHRASE))
            .unwrap();
        (derived.address.clone(), derived.private_key.to_string())
    }

    #[test]
    fn test_sign_and_verify_every_chain() {
        for chain in Chain::ALL {
            let (address, key) = key_for(chain);
            let request = TransactionRequest::new(chain, "recipient", "1000").with_memo("rent");
            let signed = sign_request(chain, &request, &key).unwrap();

            assert!(verify_signed(chain, &signed).unwrap(), "{} signature", chain);
            let envelope = decode_envelope(chain, &signed).unwrap();
            assert_eq!(envelope.payload.from, address);
            assert_eq!(envelope.payload.memo.as_deref(), Some("rent"));
            assert!(!transaction_hash(chain, &signed).unwrap().is_empty());
        }
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let (_, key) = key_for(Chain::Solana);
        let request = TransactionRequest::new(Chain::Solana, "recipient", "1000");
        let signed = sign_request(Chain::Solana, &request, &key).unwrap();

        let mut envelope = decode_envelope(Chain::Solana, &signed).unwrap();
        envelope.payload.amount = "999999".into();
        let forged = SignedTransaction {
            signed_tx: STANDARD.encode(serde_json::to_vec(&envelope).unwrap()),
            ..signed
        };
        assert!(!verify_signed(Chain::Solana, &forged).unwrap());
    }

    #[test]
    fn test_cketh_signature_is_recoverable_form() {
        let (_, key) = key_for(Chain::CkEth);
        let request = TransactionRequest::new(Chain::CkEth, "0x0000000000000000000000000000000000000001", "1");
        let signed = sign_request(Chain::CkEth, &request, &key).unwrap();
        let sig = hex::decode(&signed.signature).unwrap();
        assert_eq!(sig.len(), 65);
        assert!(sig[64] == 27 || sig[64] == 28);
        assert!(signed.signed_tx.starts_with("0x"));
    }

    #[test]
    fn test_chain_mismatch_rejected() {
        let (_, key) = key_for(Chain::Icp);
        let request = TransactionRequest::new(Chain::Solana, "x", "1");
        assert!(sign_request(Chain::Icp, &request, &key).is_err());
    }

    #[test]
    fn test_bad_key_is_signing_failure() {
        let request = TransactionRequest::new(Chain::Polkadot, "x", "1");
        let err = sign_request(Chain::Polkadot, &request, "0x1234").unwrap_err();
        assert!(matches!(err, WalletCoreError::SigningFailed(_)));
    }
}
