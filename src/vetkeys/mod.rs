//! Secret encryption and threshold-signature adapter.
//!
//! **Not production threshold cryptography.** Encryption is real AEAD, but
//! threshold signing is a mock: shares come from a Merlin transcript over
//! the wallet mnemonic and partial signatures combine by hashing. The
//! shape of the API matches a vetKD-backed signer so callers can migrate.

pub mod envelope;
pub mod shares;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::VetKeysConfig;
use crate::error::{Result, WalletCoreError};
use crate::ledger::LedgerClient;
use crate::runtime::ChainDispatcher;
use crate::types::{SignedTransaction, TransactionRequest, WalletData};

pub use envelope::{EncryptedSecret, EnvelopeAlgorithm, SecretKey};
pub use shares::PartialSignature;

/// Public view of a pending threshold signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSession {
    pub tx_id: String,
    pub wallet_id: String,
    pub threshold: usize,
    pub total_shares: usize,
    pub digest: String,
    pub commitments: Vec<String>,
    /// Sealed shares. Their keys never leave the adapter.
    pub envelopes: Vec<EncryptedSecret>,
}

#[derive(Debug, Clone)]
pub enum ThresholdOutcome {
    /// Threshold 1: signed directly by the dispatcher.
    Direct(SignedTransaction),
    Pending(ThresholdSession),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetKeysStatus {
    pub mode: String,
    pub threshold: usize,
    pub total_shares: usize,
    pub algorithm: EnvelopeAlgorithm,
    pub active_sessions: usize,
    pub canister_configured: bool,
}

struct SessionState {
    public: ThresholdSession,
    keys: Vec<SecretKey>,
}

pub struct VetKeysAdapter {
    dispatcher: Arc<ChainDispatcher>,
    ledger: Option<Arc<dyn LedgerClient>>,
    config: VetKeysConfig,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl VetKeysAdapter {
    pub fn new(dispatcher: Arc<ChainDispatcher>, config: VetKeysConfig) -> Self {
        Self {
            dispatcher,
            ledger: None,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &VetKeysConfig {
        &self.config
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionState>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Encrypt under a fresh random key. The caller keeps the key.
    pub fn encrypt_secret(&self, plaintext: &[u8], id: Option<&str>) -> Result<(EncryptedSecret, SecretKey)> {
        let id = id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = SecretKey::generate();
        let sealed = envelope::seal(self.config.algorithm, &key, &id, plaintext, None)?;
        debug!(id = %sealed.id, algorithm = %sealed.algorithm, "Secret encrypted");
        Ok((sealed, key))
    }

    pub fn decrypt_secret(&self, sealed: &EncryptedSecret, key: &SecretKey) -> Result<Zeroizing<Vec<u8>>> {
        envelope::open(sealed, key)
    }

    pub fn encrypt_secret_with_password(
        &self,
        plaintext: &[u8],
        password: &str,
        id: Option<&str>,
    ) -> Result<EncryptedSecret> {
        if password.is_empty() {
            return Err(WalletCoreError::invalid_input("password must not be empty"));
        }
        let id = id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut salt = [0u8; envelope::PASSWORD_SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = SecretKey::from_password(password, &salt, self.config.kdf_iterations);
        let mut sealed = envelope::seal(self.config.algorithm, &key, &id, plaintext, Some(&salt))?;
        sealed.iterations = Some(self.config.kdf_iterations);
        Ok(sealed)
    }

    /// Uses the rounds recorded in the envelope; older envelopes without
    /// them fall back to the configured count.
    pub fn decrypt_secret_with_password(&self, sealed: &EncryptedSecret, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        let salt = sealed
            .salt_bytes()?
            .ok_or_else(|| WalletCoreError::Decryption("envelope has no password salt".into()))?;
        let iterations = match sealed.iterations {
            Some(0) => return Err(WalletCoreError::Decryption("envelope records zero PBKDF2 rounds".into())),
            Some(rounds) => rounds,
            None => self.config.kdf_iterations,
        };
        let key = SecretKey::from_password(password, &salt, iterations);
        envelope::open(sealed, &key)
    }

    /// Start signing `request` for `tx_id`.
    pub async fn initiate_threshold_signature(
        &self,
        tx_id: &str,
        wallet: &WalletData,
        request: &TransactionRequest,
    ) -> Result<ThresholdOutcome> {
        if self.config.threshold <= 1 {
            let signed = self.dispatcher.sign_transaction(wallet, request).await?;
            info!(tx_id, wallet_id = %wallet.id, "Signed directly (threshold 1)");
            return Ok(ThresholdOutcome::Direct(signed));
        }

        let mnemonic = wallet
            .mnemonic
            .as_deref()
            .ok_or_else(|| WalletCoreError::SigningFailed(format!("wallet {} has no mnemonic to share", wallet.id)))?;

        // 1. Derive shares and bind the request
        let digest = shares::request_digest(tx_id, request)?;
        let derived = shares::derive_shares(mnemonic, &wallet.id, tx_id, self.config.total_shares);

        // 2. Seal each share under its own key
        let mut keys = Vec::with_capacity(derived.len());
        let mut envelopes = Vec::with_capacity(derived.len());
        let mut commitments = Vec::with_capacity(derived.len());
        for share in &derived {
            let key = SecretKey::generate();
            let id = format!("{}/share-{}", tx_id, share.index);
            envelopes.push(envelope::seal(self.config.algorithm, &key, &id, share.secret(), None)?);
            commitments.push(share.commitment());
            keys.push(key);
        }

        // 3. Record the session
        let public = ThresholdSession {
            tx_id: tx_id.to_string(),
            wallet_id: wallet.id.clone(),
            threshold: self.config.threshold,
            total_shares: self.config.total_shares,
            digest,
            commitments,
            envelopes,
        };
        let replaced = self
            .sessions()
            .insert(tx_id.to_string(), SessionState { public: public.clone(), keys })
            .is_some();
        if replaced {
            warn!(tx_id, "Replaced existing threshold session");
        }
        info!(
            tx_id,
            wallet_id = %wallet.id,
            threshold = self.config.threshold,
            total = self.config.total_shares,
            "Threshold session opened"
        );
        Ok(ThresholdOutcome::Pending(public))
    }

    /// Unseal share `index` of a session and check it against its commitment.
    fn open_share(state: &SessionState, index: usize) -> Result<shares::Share> {
        let (sealed, key) = match (state.public.envelopes.get(index), state.keys.get(index)) {
            (Some(sealed), Some(key)) => (sealed, key),
            _ => {
                return Err(WalletCoreError::invalid_input(format!(
                    "share index {} out of range (0..{})",
                    index, state.public.total_shares
                )))
            }
        };

        let secret = envelope::open(sealed, key)?;
        let share = shares::Share::from_secret(index, &secret)?;
        let committed = state.public.commitments.get(index).map(String::as_str).unwrap_or_default();
        if !shares::ct_eq_str(committed, &share.commitment()) {
            return Err(WalletCoreError::SigningFailed(format!("share {} fails its commitment", index)));
        }
        Ok(share)
    }

    /// Produce the partial signature of one share.
    pub fn sign_with_share(&self, tx_id: &str, share_index: usize, request: &TransactionRequest) -> Result<PartialSignature> {
        let sessions = self.sessions();
        let state = sessions
            .get(tx_id)
            .ok_or_else(|| WalletCoreError::invalid_input(format!("no threshold session for {}", tx_id)))?;

        if shares::request_digest(tx_id, request)? != state.public.digest {
            return Err(WalletCoreError::SigningFailed("request does not match session".into()));
        }
        Self::open_share(state, share_index)?.sign(tx_id, &state.public.digest)
    }

    /// A partial counts only if its share would have produced it.
    fn check_partial(state: &SessionState, partial: &PartialSignature) -> Result<()> {
        let rejected = |what: &str| {
            WalletCoreError::SigningFailed(format!("partial for share {} has {}", partial.share_index, what))
        };
        if partial.tx_id != state.public.tx_id || !shares::ct_eq_str(&partial.digest, &state.public.digest) {
            return Err(rejected("a foreign digest"));
        }
        let share = Self::open_share(state, partial.share_index)?;
        if !shares::ct_eq_str(&partial.commitment, &share.commitment()) {
            return Err(rejected("the wrong commitment"));
        }
        let expected = share.sign(&state.public.tx_id, &state.public.digest)?;
        if !shares::ct_eq_str(&partial.signature, &expected.signature) {
            return Err(rejected("an invalid signature"));
        }
        Ok(())
    }

    /// Combine partials of one open session. Closes the session on success.
    pub fn combine_signatures(&self, partials: Vec<PartialSignature>) -> Result<SignedTransaction> {
        let Some(tx_id) = partials.first().map(|p| p.tx_id.clone()) else {
            return Err(WalletCoreError::InsufficientThreshold {
                required: self.config.threshold.max(1),
                provided: 0,
            });
        };

        let mut sessions = self.sessions();
        let state = sessions
            .get(&tx_id)
            .ok_or_else(|| WalletCoreError::invalid_input(format!("no threshold session for {}", tx_id)))?;
        for partial in &partials {
            Self::check_partial(state, partial)?;
        }
        let signed = shares::combine(partials, state.public.threshold.max(1))?;

        sessions.remove(&tx_id);
        debug!(tx_id = %tx_id, "Threshold session closed");
        Ok(signed)
    }

    pub fn verify_signature(&self, signed: &SignedTransaction, request: &TransactionRequest) -> Result<bool> {
        shares::verify(signed, request)
    }

    pub fn get_status(&self) -> VetKeysStatus {
        VetKeysStatus {
            mode: "mock".into(),
            threshold: self.config.threshold,
            total_shares: self.config.total_shares,
            algorithm: self.config.algorithm,
            active_sessions: self.sessions().len(),
            canister_configured: self.ledger.is_some(),
        }
    }

    pub async fn is_canister_connected(&self) -> bool {
        match &self.ledger {
            Some(ledger) => match ledger.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Ledger ping failed");
                    false
                }
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyDerivation;
    use crate::ledger::InMemoryLedger;
    use crate::storage::WalletStorage;
    use crate::types::{Chain, CreationMethod};
    use crate::wallet::{CreateWalletOptions, WalletManager};

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn adapter(threshold: usize) -> VetKeysAdapter {
        let dispatcher = Arc::new(ChainDispatcher::with_providers(Vec::new()));
        VetKeysAdapter::new(
            dispatcher,
            VetKeysConfig {
                threshold,
                total_shares: 3,
                kdf_iterations: 1_000,
                ..VetKeysConfig::default()
            },
        )
    }

    fn wallet(dir: &tempfile::TempDir, chain: Chain, method: CreationMethod, material: &str) -> WalletData {
        let storage = WalletStorage::open(dir.path()).unwrap();
        let manager = WalletManager::new(storage, KeyDerivation::default());
        let options = CreateWalletOptions::new("agent-1", chain, method, material);
        manager.create_wallet(options).unwrap()
    }

    #[test]
    fn test_password_round_trip_and_wrong_password() {
        let adapter = adapter(1);
        let sealed = adapter.encrypt_secret_with_password(b"seed words", "hunter2", None).unwrap();
        assert!(sealed.salt.is_some());
        assert_eq!(adapter.decrypt_secret_with_password(&sealed, "hunter2").unwrap().as_slice(), b"seed words");
        assert!(matches!(
            adapter.decrypt_secret_with_password(&sealed, "wrong"),
            Err(WalletCoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_password_envelope_outlives_config_change() {
        let sealed = adapter(1).encrypt_secret_with_password(b"seed words", "hunter2", None).unwrap();
        assert_eq!(sealed.iterations, Some(1_000));
        let json = serde_json::to_string(&sealed).unwrap();
        let restored: EncryptedSecret = serde_json::from_str(&json).unwrap();

        let retuned = VetKeysAdapter::new(
            Arc::new(ChainDispatcher::with_providers(Vec::new())),
            VetKeysConfig {
                kdf_iterations: 2_000,
                ..VetKeysConfig::default()
            },
        );
        assert_eq!(retuned.decrypt_secret_with_password(&restored, "hunter2").unwrap().as_slice(), b"seed words");

        // Envelopes written before rounds were recorded use the config.
        let mut legacy = restored;
        legacy.iterations = None;
        assert!(retuned.decrypt_secret_with_password(&legacy, "hunter2").is_err());
        assert_eq!(adapter(1).decrypt_secret_with_password(&legacy, "hunter2").unwrap().as_slice(), b"seed words");
    }

    #[test]
    fn test_encrypt_secret_uses_fresh_keys() {
        let adapter = adapter(1);
        let (a, key_a) = adapter.encrypt_secret(b"same", Some("s")).unwrap();
        let (b, _) = adapter.encrypt_secret(b"same", Some("s")).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
        assert_eq!(adapter.decrypt_secret(&a, &key_a).unwrap().as_slice(), b"same");
        assert!(adapter.decrypt_secret(&b, &key_a).is_err());
    }

    #[tokio::test]
    async fn test_threshold_flow() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(2);
        let wallet = wallet(&dir, Chain::Solana, CreationMethod::Mnemonic, PHRASE);
        let request = TransactionRequest::new(Chain::Solana, "dest", "1000");

        let session = match adapter.initiate_threshold_signature("tx-1", &wallet, &request).await.unwrap() {
            ThresholdOutcome::Pending(session) => session,
            other => panic!("expected pending session, got {:?}", other),
        };
        assert_eq!(session.envelopes.len(), 3);
        assert_eq!(session.commitments.len(), 3);
        assert_eq!(adapter.get_status().active_sessions, 1);

        let p0 = adapter.sign_with_share("tx-1", 0, &request).unwrap();
        let err = adapter.combine_signatures(vec![p0.clone()]).unwrap_err();
        assert!(matches!(err, WalletCoreError::InsufficientThreshold { required: 2, provided: 1 }));

        let p2 = adapter.sign_with_share("tx-1", 2, &request).unwrap();
        let signed = adapter.combine_signatures(vec![p0, p2]).unwrap();
        assert!(adapter.verify_signature(&signed, &request).unwrap());
        assert_eq!(adapter.get_status().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_combine_rejects_forged_partials() {
        let forged = |index: usize| PartialSignature {
            tx_id: "tx-1".into(),
            share_index: index,
            digest: "00".into(),
            signature: "00".into(),
            commitment: "00".into(),
        };

        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(2);
        // No session was ever opened.
        let err = adapter.combine_signatures(vec![forged(0), forged(1)]).unwrap_err();
        assert!(matches!(err, WalletCoreError::InvalidInput { .. }));

        let wallet = wallet(&dir, Chain::Solana, CreationMethod::Mnemonic, PHRASE);
        let request = TransactionRequest::new(Chain::Solana, "dest", "1000");
        adapter.initiate_threshold_signature("tx-1", &wallet, &request).await.unwrap();
        let p0 = adapter.sign_with_share("tx-1", 0, &request).unwrap();
        let p1 = adapter.sign_with_share("tx-1", 1, &request).unwrap();

        let mut bad_signature = p1.clone();
        bad_signature.signature = p0.signature.clone();
        let mut bad_commitment = p1.clone();
        bad_commitment.commitment = p0.commitment.clone();
        let mut bad_digest = p1.clone();
        bad_digest.digest = shares::request_digest("tx-1", &TransactionRequest::new(Chain::Solana, "dest", "1")).unwrap();
        let mut out_of_range = p1.clone();
        out_of_range.share_index = 9;

        for partial in [bad_signature, bad_commitment, bad_digest, out_of_range] {
            assert!(adapter.combine_signatures(vec![p0.clone(), partial]).is_err());
        }
        // Rejections leave the session open for the honest partials.
        assert_eq!(adapter.get_status().active_sessions, 1);
        let signed = adapter.combine_signatures(vec![p1, p0]).unwrap();
        assert!(adapter.verify_signature(&signed, &request).unwrap());
    }

    #[tokio::test]
    async fn test_share_rejects_changed_request() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(2);
        let wallet = wallet(&dir, Chain::Solana, CreationMethod::Mnemonic, PHRASE);
        let request = TransactionRequest::new(Chain::Solana, "dest", "1000");
        adapter.initiate_threshold_signature("tx-1", &wallet, &request).await.unwrap();

        let tampered = TransactionRequest::new(Chain::Solana, "dest", "9999");
        assert!(matches!(
            adapter.sign_with_share("tx-1", 0, &tampered),
            Err(WalletCoreError::SigningFailed(_))
        ));
        assert!(adapter.sign_with_share("tx-1", 7, &request).is_err());
        assert!(adapter.sign_with_share("tx-2", 0, &request).is_err());
    }

    #[tokio::test]
    async fn test_private_key_wallet_cannot_share() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(2);
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let wallet = wallet(&dir, Chain::CkEth, CreationMethod::PrivateKey, key);
        let request = TransactionRequest::new(Chain::CkEth, "0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "1");
        let err = adapter.initiate_threshold_signature("tx-1", &wallet, &request).await.unwrap_err();
        assert!(matches!(err, WalletCoreError::SigningFailed(_)));
    }

    #[tokio::test]
    async fn test_status_and_ledger_ping() {
        let adapter = adapter(1);
        assert_eq!(adapter.get_status().mode, "mock");
        assert!(!adapter.is_canister_connected().await);

        let ledger = Arc::new(InMemoryLedger::new());
        let adapter = adapter.with_ledger(ledger.clone());
        assert!(adapter.is_canister_connected().await);
        ledger.set_offline(true);
        assert!(!adapter.is_canister_connected().await);
    }
}
