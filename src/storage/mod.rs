//! File-backed wallet persistence, one CBOR record per wallet.
//!
//! Layout: `<base>/<agent_id>/<wallet_id>.cbor`. Agents never share a
//! directory, and ids are validated as single path components before they
//! touch the filesystem.

pub mod sealing;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::StorageConfig;
use crate::error::{Result, WalletCoreError};
use crate::types::{Chain, CreationMethod, WalletData};

pub use sealing::{SecretSealer, StoredSecret};

const RECORD_EXTENSION: &str = "cbor";
const RECORD_VERSION: u8 = 1;
const ARCHIVE_VERSION: u8 = 1;
const MAX_ID_LEN: usize = 128;

/// On-disk form of `WalletData`. Secrets are wrapped in `StoredSecret`.
#[derive(Serialize, Deserialize)]
struct WalletRecord {
    version: u8,
    id: String,
    agent_id: String,
    chain: Chain,
    address: String,
    derivation_path: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    creation_method: CreationMethod,
    metadata: Option<BTreeMap<String, String>>,
    private_key: Option<StoredSecret>,
    mnemonic: Option<StoredSecret>,
}

/// Portable backup of one agent's records.
///
/// Records are kept as the exact bytes written to disk, so sealed secrets
/// stay sealed inside the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletArchive {
    pub version: u8,
    pub agent_id: String,
    pub exported_at: DateTime<Utc>,
    /// Salt of the exporting store when its records are sealed.
    pub salt: Option<Vec<u8>>,
    /// wallet id -> raw CBOR record
    pub records: BTreeMap<String, Vec<u8>>,
}

impl WalletArchive {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).map_err(|e| WalletCoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(bytes).map_err(|e| WalletCoreError::Serialization(e.to_string()))
    }
}

/// Reject anything that is not a plain, single path component.
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.');
    if valid {
        Ok(())
    } else {
        Err(WalletCoreError::invalid_input(format!("invalid {} {:?}", kind, id)))
    }
}

pub struct WalletStorage {
    base_dir: PathBuf,
    sealer: Option<SecretSealer>,
    salt: Option<[u8; sealing::SALT_LEN]>,
}

impl WalletStorage {
    /// Open (and create) the store described by `config`.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.base_dir)?;

        let (sealer, salt) = match config.passphrase.as_deref() {
            Some(passphrase) => {
                let salt = sealing::load_or_create_salt(&config.base_dir)?;
                let sealer = SecretSealer::from_passphrase(passphrase, &salt, config.kdf_iterations);
                (Some(sealer), Some(salt))
            }
            None => (None, None),
        };

        debug!(base_dir = %config.base_dir.display(), sealed = sealer.is_some(), "wallet storage opened");
        Ok(Self {
            base_dir: config.base_dir.clone(),
            sealer,
            salt,
        })
    }

    /// Unsealed store rooted at `base_dir`.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(&StorageConfig {
            base_dir: base_dir.into(),
            passphrase: None,
            ..Default::default()
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn is_sealed(&self) -> bool {
        self.sealer.is_some()
    }

    fn agent_dir(&self, agent_id: &str) -> Result<PathBuf> {
        validate_id("agent id", agent_id)?;
        Ok(self.base_dir.join(agent_id))
    }

    fn record_path(&self, agent_id: &str, wallet_id: &str) -> Result<PathBuf> {
        validate_id("wallet id", wallet_id)?;
        Ok(self
            .agent_dir(agent_id)?
            .join(format!("{}.{}", wallet_id, RECORD_EXTENSION)))
    }

    fn secret_context(agent_id: &str, wallet_id: &str, field: &str) -> String {
        format!("{}/{}/{}", agent_id, wallet_id, field)
    }

    fn store_secret(&self, wallet: &WalletData, field: &str, value: Option<&str>) -> Result<Option<StoredSecret>> {
        let Some(value) = value else {
            return Ok(None);
        };
        let secret = match &self.sealer {
            Some(sealer) => sealer.seal(value, &Self::secret_context(&wallet.agent_id, &wallet.id, field))?,
            None => StoredSecret::Plain {
                value: value.to_string(),
            },
        };
        Ok(Some(secret))
    }

    fn restore_secret(
        &self,
        record: &WalletRecord,
        field: &str,
        secret: Option<&StoredSecret>,
    ) -> Result<Option<String>> {
        let Some(secret) = secret else {
            return Ok(None);
        };
        let value: Zeroizing<String> = match (&self.sealer, secret) {
            (_, StoredSecret::Plain { value }) => Zeroizing::new(value.clone()),
            (Some(sealer), sealed) => {
                sealer.open(sealed, &Self::secret_context(&record.agent_id, &record.id, field))?
            }
            (None, StoredSecret::Sealed { .. }) => {
                return Err(WalletCoreError::Decryption(format!(
                    "wallet {}/{} is sealed but no storage passphrase is configured",
                    record.agent_id, record.id
                )))
            }
        };
        Ok(Some(value.to_string()))
    }

    fn encode(&self, wallet: &WalletData) -> Result<Vec<u8>> {
        let record = WalletRecord {
            version: RECORD_VERSION,
            id: wallet.id.clone(),
            agent_id: wallet.agent_id.clone(),
            chain: wallet.chain,
            address: wallet.address.clone(),
            derivation_path: wallet.derivation_path.clone(),
            created_at: wallet.created_at,
            updated_at: wallet.updated_at,
            creation_method: wallet.creation_method,
            metadata: wallet.metadata.clone(),
            private_key: self.store_secret(wallet, "private_key", wallet.private_key.as_deref())?,
            mnemonic: self.store_secret(wallet, "mnemonic", wallet.mnemonic.as_deref())?,
        };
        serde_cbor::to_vec(&record).map_err(|e| WalletCoreError::Serialization(e.to_string()))
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<WalletData> {
        let record: WalletRecord =
            serde_cbor::from_slice(bytes).map_err(|e| WalletCoreError::CorruptedWalletRecord {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        if record.version != RECORD_VERSION {
            return Err(WalletCoreError::CorruptedWalletRecord {
                path: path.display().to_string(),
                reason: format!("unknown record version {}", record.version),
            });
        }

        let private_key = self.restore_secret(&record, "private_key", record.private_key.as_ref())?;
        let mnemonic = self.restore_secret(&record, "mnemonic", record.mnemonic.as_ref())?;

        Ok(WalletData {
            id: record.id,
            agent_id: record.agent_id,
            chain: record.chain,
            address: record.address,
            private_key,
            mnemonic,
            derivation_path: record.derivation_path,
            created_at: record.created_at,
            updated_at: record.updated_at,
            creation_method: record.creation_method,
            metadata: record.metadata,
        })
    }

    /// Write a wallet record, replacing any previous version.
    pub fn save(&self, wallet: &WalletData) -> Result<()> {
        wallet.check_secret_invariant()?;
        let path = self.record_path(&wallet.agent_id, &wallet.id)?;
        let bytes = self.encode(wallet)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written record.
        let tmp = path.with_extension("cbor.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;

        debug!(agent_id = %wallet.agent_id, wallet_id = %wallet.id, "wallet record saved");
        Ok(())
    }

    /// `Ok(None)` when no record exists.
    pub fn load(&self, agent_id: &str, wallet_id: &str) -> Result<Option<WalletData>> {
        let path = self.record_path(agent_id, wallet_id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.decode(&path, &bytes).map(Some)
    }

    /// Returns whether a record was removed.
    pub fn delete(&self, agent_id: &str, wallet_id: &str) -> Result<bool> {
        let path = self.record_path(agent_id, wallet_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, agent_id: &str, wallet_id: &str) -> Result<bool> {
        Ok(self.record_path(agent_id, wallet_id)?.is_file())
    }

    fn wallet_ids(&self, agent_id: &str) -> Result<Vec<String>> {
        let dir = self.agent_dir(agent_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every readable wallet of `agent_id`, oldest first.
    ///
    /// Undecodable records are logged and skipped so one bad file does not
    /// hide the rest of the agent's wallets.
    pub fn list_wallets(&self, agent_id: &str) -> Result<Vec<WalletData>> {
        let mut wallets = Vec::new();
        for id in self.wallet_ids(agent_id)? {
            match self.load(agent_id, &id) {
                Ok(Some(wallet)) => wallets.push(wallet),
                Ok(None) => {}
                Err(e @ WalletCoreError::CorruptedWalletRecord { .. }) => {
                    warn!(agent_id, wallet_id = %id, error = %e, "skipping unreadable wallet record");
                }
                Err(e) => return Err(e),
            }
        }
        wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(wallets)
    }

    /// Agents with a directory under the base path.
    pub fn list_agents(&self) -> Result<Vec<String>> {
        let mut agents = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_id("agent id", name).is_ok() {
                    agents.push(name.to_string());
                }
            }
        }
        agents.sort();
        Ok(agents)
    }

    /// Remove every record of `agent_id` and its directory.
    pub fn delete_agent(&self, agent_id: &str) -> Result<usize> {
        let ids = self.wallet_ids(agent_id)?;
        for id in &ids {
            self.delete(agent_id, id)?;
        }
        let dir = self.agent_dir(agent_id)?;
        if dir.is_dir() {
            // Only succeeds once the directory is empty; stray files are left alone.
            if let Err(e) = fs::remove_dir(&dir) {
                warn!(agent_id, error = %e, "agent directory not removed");
            }
        }
        Ok(ids.len())
    }

    /// Snapshot every record of `agent_id`.
    pub fn export_agent(&self, agent_id: &str) -> Result<WalletArchive> {
        let mut records = BTreeMap::new();
        for id in self.wallet_ids(agent_id)? {
            let path = self.record_path(agent_id, &id)?;
            records.insert(id, fs::read(&path)?);
        }
        Ok(WalletArchive {
            version: ARCHIVE_VERSION,
            agent_id: agent_id.to_string(),
            exported_at: Utc::now(),
            salt: self.salt.map(|s| s.to_vec()),
            records,
        })
    }

    /// Restore an archive. Existing records are kept unless `overwrite`.
    ///
    /// Returns the number of records written.
    pub fn import_agent(&self, archive: &WalletArchive, overwrite: bool) -> Result<usize> {
        if archive.version != ARCHIVE_VERSION {
            return Err(WalletCoreError::invalid_input(format!(
                "unsupported archive version {}",
                archive.version
            )));
        }
        if let (Some(archive_salt), Some(salt)) = (&archive.salt, &self.salt) {
            if archive_salt.as_slice() != salt.as_slice() {
                return Err(WalletCoreError::invalid_input(
                    "archive was sealed by a different store and cannot be opened here",
                ));
            }
        }

        let mut restored = 0;
        for (wallet_id, bytes) in &archive.records {
            let path = self.record_path(&archive.agent_id, wallet_id)?;
            // Decoding proves the record is intact and readable by this store.
            let wallet = self.decode(&path, bytes)?;
            if wallet.agent_id != archive.agent_id || &wallet.id != wallet_id {
                return Err(WalletCoreError::CorruptedWalletRecord {
                    path: path.display().to_string(),
                    reason: "archive entry does not match its record".into(),
                });
            }
            if path.exists() && !overwrite {
                debug!(agent_id = %archive.agent_id, wallet_id = %wallet_id, "import skipped existing record");
                continue;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)?;
            restored += 1;
        }
        Ok(restored)
    }
}
