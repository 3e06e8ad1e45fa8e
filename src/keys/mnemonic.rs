//! BIP-39 mnemonic generation, validation and seed derivation.

use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{DerivationFailure, Result, WalletCoreError};

/// Word count used by `WalletManager::generate_wallet` (128 bits of entropy).
pub const DEFAULT_WORD_COUNT: usize = 12;

/// Generate a fresh mnemonic from OS CSPRNG entropy.
///
/// Accepts 12, 15, 18, 21 or 24 words (128 to 256 bits of entropy).
pub fn generate_mnemonic(word_count: usize) -> Result<Zeroizing<String>> {
    let entropy_len = match word_count {
        12 => 16,
        15 => 20,
        18 => 24,
        21 => 28,
        24 => 32,
        other => {
            return Err(WalletCoreError::invalid_input(format!(
                "unsupported mnemonic length: {} words",
                other
            )))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_len]);
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|e| {
        WalletCoreError::derivation(DerivationFailure::InvalidMnemonic, e.to_string())
    })?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Parse and validate a phrase against the English word list and checksum.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    Mnemonic::parse(phrase.trim()).map_err(|e| {
        let reason = match e {
            bip39::Error::InvalidChecksum => DerivationFailure::BadChecksum,
            _ => DerivationFailure::InvalidMnemonic,
        };
        WalletCoreError::derivation(reason, format!("Invalid mnemonic: {}", e))
    })
}

/// Whether `phrase` is a valid mnemonic.
pub fn validate_mnemonic(phrase: &str) -> bool {
    parse_mnemonic(phrase).is_ok()
}

/// BIP-39 seed (PBKDF2-HMAC-SHA512, 2048 rounds) for a validated phrase.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<Zeroizing<[u8; 64]>> {
    let mnemonic = parse_mnemonic(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_default_length() {
        let phrase = generate_mnemonic(DEFAULT_WORD_COUNT).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(validate_mnemonic(&phrase));
    }

    #[test]
    fn test_generate_24_words() {
        let phrase = generate_mnemonic(24).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
    }

    #[test]
    fn test_generated_phrases_differ() {
        let a = generate_mnemonic(12).unwrap();
        let b = generate_mnemonic(12).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_rejects_bad_word_count() {
        assert!(generate_mnemonic(13).is_err());
    }

    #[test]
    fn test_bad_checksum_reason() {
        // Valid words, wrong final checksum word.
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        match parse_mnemonic(phrase) {
            Err(WalletCoreError::KeyDerivation { reason, .. }) => {
                assert_eq!(reason, DerivationFailure::BadChecksum)
            }
            other => panic!("expected checksum failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_word_reason() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon notaword";
        match parse_mnemonic(phrase) {
            Err(WalletCoreError::KeyDerivation { reason, .. }) => {
                assert_eq!(reason, DerivationFailure::InvalidMnemonic)
            }
            other => panic!("expected invalid mnemonic, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_known_seed_vector() {
        // BIP-39 reference vector with passphrase "TREZOR".
        let seed = mnemonic_to_seed(TEST_MNEMONIC, "TREZOR").unwrap();
        assert_eq!(
            hex::encode(&seed[..8]),
            "c55257c360c07c72"
        );
    }
}
