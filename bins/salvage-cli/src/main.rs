//! salvage — command-line recovery for Armory-format deterministic wallets.
//!
//! The engine runs on a worker thread; this thread owns the progress
//! display and the passphrase prompt, connected through the channel-backed
//! progress sink. Exit code is 0 on success, the absolute recovery error
//! code otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use salvage_core::SecureBytes;
use salvage_recover::{
    spawn_recovery, ProgressChannel, ProgressEvent, RecoveryMode, RecoveryOptions, RecoveryOutput,
};
use salvage_wallet::Network;

/// Fail-safe recovery for Armory-format deterministic wallets.
#[derive(Parser)]
#[command(name = "salvage")]
#[command(version, about = "Reads a damaged wallet and writes a clean one, plus an audit log.")]
struct Cli {
    /// Path to the wallet file to recover.
    wallet: PathBuf,

    /// Recovery mode: stripped, bare, full, meta, check (or 1-5).
    #[arg(short, long, default_value = "bare")]
    mode: String,

    /// Wallet network: mainnet or testnet.
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Read the passphrase from this file instead of prompting.
    #[arg(long)]
    passphrase_file: Option<PathBuf>,

    /// Never prompt for a passphrase; locked wallets fail instead.
    #[arg(long)]
    non_interactive: bool,

    /// Suppress progress output.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mode: RecoveryMode = cli
        .mode
        .parse()
        .with_context(|| format!("bad --mode value {:?}", cli.mode))?;
    let network = match cli.network.to_ascii_lowercase().as_str() {
        "mainnet" => Network::Mainnet,
        "testnet" => Network::Testnet,
        other => bail!("bad --network value {other:?}"),
    };

    let passphrase = match &cli.passphrase_file {
        Some(path) => {
            let raw = std::fs::read(path)
                .with_context(|| format!("reading passphrase file {}", path.display()))?;
            let trimmed = raw
                .strip_suffix(b"\n")
                .map(|s| s.strip_suffix(b"\r").unwrap_or(s))
                .unwrap_or(&raw);
            Some(SecureBytes::from_slice(trimmed))
        }
        None => None,
    };

    let mut options = RecoveryOptions::new(&cli.wallet, mode);
    options.passphrase = passphrase;
    options.network = network;

    let channel = ProgressChannel::new();
    let worker = spawn_recovery(options, channel.clone());
    channel.mark_ready();

    while let Some(event) = channel.next_event() {
        match event {
            ProgressEvent::Update(text) => {
                if !cli.quiet {
                    eprint!("\r{text}\x1b[K");
                }
            }
            ProgressEvent::AskPassphrase => {
                if cli.non_interactive {
                    channel.provide_passphrase(None);
                    continue;
                }
                if !cli.quiet {
                    eprintln!();
                }
                match rpassword::prompt_password("Wallet passphrase: ") {
                    Ok(pass) => {
                        channel.provide_passphrase(Some(SecureBytes::new(pass.into_bytes())))
                    }
                    Err(_) => channel.provide_passphrase(None),
                }
            }
            ProgressEvent::Finished => break,
        }
    }
    if !cli.quiet {
        eprintln!();
    }

    let result = worker.join().expect("recovery worker panicked");
    match result {
        Ok(RecoveryOutput::Recovered {
            wallet_path,
            log_path,
        }) => {
            if let Some(wallet) = wallet_path {
                println!("Recovered wallet saved at: {}", wallet.display());
            }
            println!("Recovery log saved at: {}", log_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(RecoveryOutput::Comments(map)) => {
            println!("{}", serde_json::to_string_pretty(&map.to_json())?);
            Ok(ExitCode::SUCCESS)
        }
        Ok(RecoveryOutput::Cancelled) => {
            eprintln!("Recovery cancelled");
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("{failure}");
            if let Some(log) = &failure.log_path {
                eprintln!("Recovery log saved at: {}", log.display());
            }
            Ok(ExitCode::from(failure.code().unsigned_abs() as u8))
        }
    }
}
