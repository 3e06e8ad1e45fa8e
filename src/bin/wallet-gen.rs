//! Wallet Generator CLI.
//!
//! Creates (or imports) a wallet for an agent and prints its public summary.
//!
//! Usage:
//!   cargo run --bin wallet-gen -- --agent agent-1 --chain icp [--mnemonic "word1 word2 ..."] [--dir path]

use std::env;
use std::error::Error;

use agent_wallet::logging::init_logging;
use agent_wallet::{Chain, CoreConfig, WalletManager};
use tracing::info;

fn usage() -> ! {
    eprintln!("Usage: wallet-gen --agent <id> --chain <cketh|polkadot|solana|icp|arweave> [--mnemonic \"...\"] [--dir <path>]");
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args: Vec<String> = env::args().collect();

    let mut agent_id = String::new();
    let mut chain = String::new();
    let mut mnemonic: Option<String> = None;
    let mut dir: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--agent", Some(v)) => agent_id = v,
            ("--chain", Some(v)) => chain = v,
            ("--mnemonic", Some(v)) => mnemonic = Some(v),
            ("--dir", Some(v)) => dir = Some(v),
            ("--help", _) | ("-h", _) => usage(),
            (other, _) => {
                eprintln!("Unknown or incomplete argument: {}", other);
                usage();
            }
        }
        i += 2;
    }

    if agent_id.is_empty() || chain.is_empty() {
        usage();
    }
    let chain: Chain = chain.parse()?;

    let mut config = CoreConfig::from_env()?;
    if let Some(dir) = dir {
        config.storage.base_dir = dir.into();
    }
    info!(dir = %config.storage.base_dir.display(), "Opening wallet store");
    let manager = WalletManager::from_config(&config)?;

    let wallet = match mnemonic.as_deref() {
        Some(phrase) => manager.import_wallet_from_mnemonic(&agent_id, chain, phrase, None)?,
        None => manager.generate_wallet(&agent_id, chain)?,
    };

    println!("{}", serde_json::to_string_pretty(&wallet.public_view())?);
    Ok(())
}
