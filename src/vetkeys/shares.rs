//! Placeholder threshold shares.
//!
//! Shares are independent transcript outputs, not polynomial evaluations:
//! any `threshold` of them "combine" by hashing. Nothing here is a real
//! threshold scheme.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use merlin::Transcript;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{Result, WalletCoreError};
use crate::types::{SignedTransaction, TransactionRequest};

type HmacSha256 = Hmac<Sha256>;

pub const SHARE_LEN: usize = 32;

/// One derived share. The secret is wiped on drop.
pub struct Share {
    pub index: usize,
    secret: Zeroizing<[u8; SHARE_LEN]>,
}

impl Share {
    pub fn from_secret(index: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SHARE_LEN {
            return Err(WalletCoreError::invalid_input(format!(
                "share must be {} bytes, got {}",
                SHARE_LEN,
                bytes.len()
            )));
        }
        let mut secret = Zeroizing::new([0u8; SHARE_LEN]);
        secret.copy_from_slice(bytes);
        Ok(Self { index, secret })
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret[..]
    }

    /// Public commitment: SHA-256 over index and secret.
    pub fn commitment(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.index as u64).to_le_bytes());
        hasher.update(&self.secret[..]);
        hex::encode(hasher.finalize())
    }

    pub fn sign(&self, tx_id: &str, digest: &str) -> Result<PartialSignature> {
        let mut mac = HmacSha256::new_from_slice(&self.secret[..])
            .map_err(|e| WalletCoreError::SigningFailed(e.to_string()))?;
        mac.update(digest.as_bytes());
        Ok(PartialSignature {
            tx_id: tx_id.to_string(),
            share_index: self.index,
            digest: digest.to_string(),
            signature: hex::encode(mac.finalize().into_bytes()),
            commitment: self.commitment(),
        })
    }
}

impl core::fmt::Debug for Share {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Share").field("index", &self.index).finish_non_exhaustive()
    }
}

/// Derive `total` shares bound to one wallet and transaction.
pub fn derive_shares(mnemonic: &str, wallet_id: &str, tx_id: &str, total: usize) -> Vec<Share> {
    let mut transcript = Transcript::new(b"agent-wallet.vetkeys.shares");
    transcript.append_message(b"mnemonic", mnemonic.trim().as_bytes());
    transcript.append_message(b"wallet", wallet_id.as_bytes());
    transcript.append_message(b"tx", tx_id.as_bytes());
    transcript.append_u64(b"total", total as u64);

    (0..total)
        .map(|index| {
            let mut secret = Zeroizing::new([0u8; SHARE_LEN]);
            transcript.append_u64(b"index", index as u64);
            transcript.challenge_bytes(b"share", &mut secret[..]);
            Share { index, secret }
        })
        .collect()
}

/// Hex digest binding a transaction id to its request.
pub fn request_digest(tx_id: &str, request: &TransactionRequest) -> Result<String> {
    let encoded = serde_json::to_vec(request).map_err(|e| WalletCoreError::Serialization(e.to_string()))?;
    let mut transcript = Transcript::new(b"agent-wallet.vetkeys.request");
    transcript.append_message(b"tx", tx_id.as_bytes());
    transcript.append_message(b"request", &encoded);
    let mut digest = [0u8; 32];
    transcript.challenge_bytes(b"digest", &mut digest);
    Ok(hex::encode(digest))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub tx_id: String,
    pub share_index: usize,
    pub digest: String,
    pub signature: String,
    pub commitment: String,
}

/// Payload carried in `SignedTransaction::signed_tx` for combined signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedPayload {
    pub tx_id: String,
    pub digest: String,
    pub partials: Vec<PartialSignature>,
}

fn combined_signature(digest: &str, partials: &[PartialSignature]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(digest.as_bytes());
    for partial in partials {
        hasher.update((partial.share_index as u64).to_le_bytes());
        hasher.update(partial.signature.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash `threshold` or more partials into one signature.
///
/// Partials are sorted by share index and deduplicated first, so order and
/// repeats never change the result.
pub fn combine(mut partials: Vec<PartialSignature>, threshold: usize) -> Result<SignedTransaction> {
    partials.sort_by_key(|p| p.share_index);
    partials.dedup_by_key(|p| p.share_index);
    if partials.len() < threshold {
        return Err(WalletCoreError::InsufficientThreshold {
            required: threshold,
            provided: partials.len(),
        });
    }

    let (tx_id, digest) = match partials.first() {
        Some(first) => (first.tx_id.clone(), first.digest.clone()),
        None => {
            return Err(WalletCoreError::InsufficientThreshold {
                required: threshold.max(1),
                provided: 0,
            })
        }
    };
    if partials.iter().any(|p| p.tx_id != tx_id || p.digest != digest) {
        return Err(WalletCoreError::invalid_input("partials sign different transactions"));
    }

    let signature = combined_signature(&digest, &partials);
    let payload = CombinedPayload { tx_id, digest, partials };
    let encoded = serde_json::to_vec(&payload).map_err(|e| WalletCoreError::Serialization(e.to_string()))?;
    let tx_hash = hex::encode(Sha256::digest(&encoded));
    Ok(SignedTransaction {
        signed_tx: STANDARD.encode(encoded),
        signature,
        tx_hash: Some(tx_hash),
    })
}

pub(crate) fn ct_eq_str(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Check that a combined signature belongs to `request`.
pub fn verify(signed: &SignedTransaction, request: &TransactionRequest) -> Result<bool> {
    let decoded = match STANDARD.decode(&signed.signed_tx) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };
    let payload: CombinedPayload = match serde_json::from_slice(&decoded) {
        Ok(payload) => payload,
        Err(_) => return Ok(false),
    };
    if !ct_eq_str(&request_digest(&payload.tx_id, request)?, &payload.digest) {
        return Ok(false);
    }
    Ok(ct_eq_str(&combined_signature(&payload.digest, &payload.partials), &signed.signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chain;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn request() -> TransactionRequest {
        TransactionRequest::new(Chain::Solana, "dest", "1000")
    }

    #[test]
    fn test_shares_are_deterministic_and_distinct() {
        let a = derive_shares(PHRASE, "w1", "tx1", 3);
        let b = derive_shares(PHRASE, "w1", "tx1", 3);
        assert_eq!(a.len(), 3);
        assert_eq!(a[1].secret(), b[1].secret());
        assert_ne!(a[0].secret(), a[1].secret());
        assert_ne!(a[0].secret(), derive_shares(PHRASE, "w1", "tx2", 3)[0].secret());
    }

    #[test]
    fn test_combine_ignores_order_and_duplicates() {
        let shares = derive_shares(PHRASE, "w1", "tx1", 3);
        let digest = request_digest("tx1", &request()).unwrap();
        let p0 = shares[0].sign("tx1", &digest).unwrap();
        let p2 = shares[2].sign("tx1", &digest).unwrap();

        let forward = combine(vec![p0.clone(), p2.clone()], 2).unwrap();
        let reverse = combine(vec![p2.clone(), p0.clone(), p2], 2).unwrap();
        assert_eq!(forward.signature, reverse.signature);
        assert!(verify(&forward, &request()).unwrap());
    }

    #[test]
    fn test_duplicates_do_not_meet_threshold() {
        let shares = derive_shares(PHRASE, "w1", "tx1", 3);
        let digest = request_digest("tx1", &request()).unwrap();
        let p0 = shares[0].sign("tx1", &digest).unwrap();
        let err = combine(vec![p0.clone(), p0], 2).unwrap_err();
        assert!(matches!(err, WalletCoreError::InsufficientThreshold { required: 2, provided: 1 }));
        assert!(err.to_string().starts_with("insufficient signatures"));
    }

    #[test]
    fn test_verify_rejects_other_request() {
        let shares = derive_shares(PHRASE, "w1", "tx1", 2);
        let digest = request_digest("tx1", &request()).unwrap();
        let partials = shares.iter().map(|s| s.sign("tx1", &digest).unwrap()).collect();
        let signed = combine(partials, 2).unwrap();

        let other = TransactionRequest::new(Chain::Solana, "dest", "2000");
        assert!(!verify(&signed, &other).unwrap());
    }
}
