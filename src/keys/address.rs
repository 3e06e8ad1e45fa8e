//! Address encoders and syntactic validators for every supported chain.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use blake2::{Blake2b512, Digest as _};
use crc::{Crc, CRC_32_ISO_HDLC};
use sha2::{Digest, Sha224};
use sha3::Keccak256;

use crate::types::Chain;

/// SS58 network prefix of the Polkadot relay chain.
pub const POLKADOT_SS58_PREFIX: u8 = 0;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
const SS58_CONTEXT: &[u8] = b"SS58PRE";
const ICP_ACCOUNT_DOMAIN: &[u8] = b"\x0Aaccount-id";

/// Syntactic address check for `chain`. Does not touch the network.
pub fn validate_address(chain: Chain, address: &str) -> bool {
    match chain {
        Chain::CkEth => validate_eth_address(address),
        Chain::Polkadot => validate_ss58_address(address),
        Chain::Solana => validate_solana_address(address),
        Chain::Icp => validate_icp_principal(address) || validate_icp_account_id(address),
        Chain::Arweave => validate_arweave_address(address),
    }
}

// ---------------------------------------------------------------------------
// ckETH
// ---------------------------------------------------------------------------

/// Render 20 address bytes with the EIP-55 mixed-case checksum.
pub fn eip55_checksum(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `0x` + 40 hex digits. Mixed-case input must carry a valid checksum.
pub fn validate_eth_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }

    let all_lower = body.bytes().all(|b| !b.is_ascii_uppercase());
    let all_upper = body.bytes().all(|b| !b.is_ascii_lowercase());
    if all_lower || all_upper {
        return true;
    }

    match hex::decode(body) {
        Ok(bytes) => eip55_checksum(&bytes) == address,
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// ICP
// ---------------------------------------------------------------------------

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for c in text.bytes() {
        let value = BASE32_ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Some(out)
}

/// Textual principal: base32(crc32 || bytes), grouped by 5 with dashes.
pub fn principal_to_text(principal: &[u8]) -> String {
    let mut payload = CRC32.checksum(principal).to_be_bytes().to_vec();
    payload.extend_from_slice(principal);

    let encoded = base32_encode(&payload);
    encoded
        .as_bytes()
        .chunks(5)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Decode a textual principal, verifying its checksum and canonical grouping.
pub fn principal_from_text(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| *c != '-').collect();
    let payload = base32_decode(&compact)?;
    if payload.len() < 4 || payload.len() > 4 + 29 {
        return None;
    }
    let (crc, principal) = payload.split_at(4);
    if crc != CRC32.checksum(principal).to_be_bytes() {
        return None;
    }
    if principal_to_text(principal) != text {
        return None;
    }
    Some(principal.to_vec())
}

pub fn validate_icp_principal(text: &str) -> bool {
    principal_from_text(text).is_some()
}

/// Ledger account identifier for a principal's default subaccount.
pub fn icp_account_identifier(principal: &[u8]) -> String {
    let mut hasher = Sha224::new();
    hasher.update(ICP_ACCOUNT_DOMAIN);
    hasher.update(principal);
    hasher.update([0u8; 32]);
    let hash = hasher.finalize();

    let mut account = CRC32.checksum(&hash).to_be_bytes().to_vec();
    account.extend_from_slice(&hash);
    hex::encode(account)
}

/// 64 hex digits: crc32 followed by a 28-byte hash.
pub fn validate_icp_account_id(text: &str) -> bool {
    if text.len() != 64 {
        return false;
    }
    match hex::decode(text) {
        Ok(bytes) => bytes[..4] == CRC32.checksum(&bytes[4..]).to_be_bytes(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Polkadot
// ---------------------------------------------------------------------------

fn ss58_checksum(payload: &[u8]) -> [u8; 2] {
    let hash = Blake2b512::new()
        .chain_update(SS58_CONTEXT)
        .chain_update(payload)
        .finalize();
    [hash[0], hash[1]]
}

/// SS58 address for a 32-byte public key under a single-byte prefix.
pub fn ss58_encode(prefix: u8, public_key: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + public_key.len() + 2);
    payload.push(prefix);
    payload.extend_from_slice(public_key);
    let checksum = ss58_checksum(&payload);
    payload.extend_from_slice(&checksum);
    bs58::encode(payload).into_string()
}

/// Any SS58 address with a 32-byte account id and valid checksum.
pub fn validate_ss58_address(address: &str) -> bool {
    let Ok(bytes) = bs58::decode(address).into_vec() else {
        return false;
    };
    let prefix_len = match bytes.first() {
        Some(b) if *b < 64 => 1,
        Some(b) if *b < 128 => 2,
        _ => return false,
    };
    if bytes.len() != prefix_len + 32 + 2 {
        return false;
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 2);
    ss58_checksum(payload) == checksum
}

// ---------------------------------------------------------------------------
// Solana & Arweave
// ---------------------------------------------------------------------------

pub fn validate_solana_address(address: &str) -> bool {
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Arweave address: base64url(sha256(modulus)).
pub fn arweave_address(modulus: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(modulus))
}

pub fn validate_arweave_address(address: &str) -> bool {
    address.len() == 43
        && address
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && matches!(URL_SAFE_NO_PAD.decode(address), Ok(bytes) if bytes.len() == 32)
}
