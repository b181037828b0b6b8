//! Wallet fixtures and precise corruption utilities.
//!
//! Fixtures are real wallets written through the salvage-wallet API, so
//! every test exercises the same bytes a production wallet would contain.
//! Corruption helpers patch single bytes or ranges at known record/field
//! offsets.

use std::fs;
use std::path::Path;

use salvage_core::crypto;
use salvage_core::{ChainCode, SecureBytes};
use salvage_recover::{RecoveryMode, RecoveryOptions};
use salvage_wallet::{
    KdfParams, Network, NewWalletParams, Wallet, WalletUpdate, HEADER_SIZE, KEYDATA_RECORD_SIZE,
};

pub const TEST_NETWORK: Network = Network::Testnet;

/// Entry-payload offsets of the checksum-protected fields.
pub const HASH160_OFF: usize = 0;
pub const CHAINCODE_OFF: usize = 36;
pub const CHAINCODE_CHK_OFF: usize = 68;
pub const IV_OFF: usize = 88;
pub const PRIV_OFF: usize = 108;
pub const PUB_OFF: usize = 144;
pub const PUB_CHK_OFF: usize = 209;

pub fn root_priv() -> SecureBytes {
    SecureBytes::from_slice(&[0x3b; 32])
}

pub fn chaincode() -> ChainCode {
    ChainCode::from_bytes([0x58; 32])
}

/// Cheap Argon2 parameters so locked-wallet tests stay fast.
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        memory: 8,
        num_iter: 1,
        salt: [0x9c; 32],
    }
}

/// Build a wallet with `children` chained addresses past the root record.
/// The file then holds `children + 1` chained entries (indices `0..=children`).
pub fn build_wallet(path: &Path, children: usize, passphrase: Option<&[u8]>) -> Wallet {
    let mut wallet = Wallet::create_new(NewWalletParams {
        path: path.to_path_buf(),
        network: TEST_NETWORK,
        passphrase: passphrase.map(SecureBytes::from_slice),
        root_priv: Some(root_priv()),
        root_pub: None,
        chaincode: chaincode(),
        label_name: "fixture".into(),
        label_descr: "integration fixture wallet".into(),
        kdf: passphrase.map(|_| fast_kdf()),
    })
    .expect("fixture wallet");
    for _ in 0..children {
        wallet.compute_next_address().expect("chain extension");
    }
    wallet
}

/// Watch-only variant of [`build_wallet`].
pub fn build_watch_only(path: &Path, children: usize) -> Wallet {
    let root_pub = crypto::compute_public_key(root_priv().as_slice()).expect("root pub");
    let mut wallet = Wallet::create_new(NewWalletParams {
        path: path.to_path_buf(),
        network: TEST_NETWORK,
        passphrase: None,
        root_priv: None,
        root_pub: Some(root_pub),
        chaincode: chaincode(),
        label_name: "fixture".into(),
        label_descr: "watch-only fixture wallet".into(),
        kdf: None,
    })
    .expect("fixture wallet");
    for _ in 0..children {
        wallet.compute_next_address().expect("chain extension");
    }
    wallet
}

/// Append `count` imported private keys, returning their key material.
pub fn add_imports(wallet: &mut Wallet, count: usize) -> Vec<SecureBytes> {
    (0..count)
        .map(|i| {
            let priv_key = SecureBytes::from_slice(&[0xa1 + i as u8; 32]);
            wallet.import_private_key(&priv_key).expect("import");
            priv_key
        })
        .collect()
}

pub fn add_comments(wallet: &mut Wallet, addr_hash: salvage_core::Hash160) {
    wallet
        .safe_update(vec![
            WalletUpdate::AddAddrComment {
                hash160: addr_hash,
                comment: b"grocery money".to_vec(),
            },
            WalletUpdate::AddAddrComment {
                hash160: addr_hash,
                comment: b"rent".to_vec(),
            },
            WalletUpdate::AddTxComment {
                txid: [0x6d; 32],
                comment: b"refund arrived".to_vec(),
            },
        ])
        .expect("comments");
}

/// Absolute file offset of chained record `k` (the root record is `k = 0`).
pub fn record_offset(k: usize) -> usize {
    HEADER_SIZE + k * KEYDATA_RECORD_SIZE
}

/// Absolute offset of byte `field_off` inside record `k`'s entry payload.
pub fn field_offset(k: usize, field_off: usize) -> usize {
    record_offset(k) + 1 + 20 + field_off
}

pub fn xor_byte(path: &Path, offset: usize, mask: u8) {
    let mut bytes = fs::read(path).expect("read wallet");
    bytes[offset] ^= mask;
    fs::write(path, bytes).expect("write wallet");
}

pub fn zero_range(path: &Path, offset: usize, len: usize) {
    let mut bytes = fs::read(path).expect("read wallet");
    for b in &mut bytes[offset..offset + len] {
        *b = 0;
    }
    fs::write(path, bytes).expect("write wallet");
}

pub fn fill_range(path: &Path, offset: usize, len: usize, value: u8) {
    let mut bytes = fs::read(path).expect("read wallet");
    for b in &mut bytes[offset..offset + len] {
        *b = value;
    }
    fs::write(path, bytes).expect("write wallet");
}

/// Remove chained record `k` from the file entirely.
pub fn delete_record(path: &Path, k: usize) {
    let mut bytes = fs::read(path).expect("read wallet");
    let start = record_offset(k);
    bytes.drain(start..start + KEYDATA_RECORD_SIZE);
    fs::write(path, bytes).expect("write wallet");
}

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).expect("metadata").len()
}

/// Options preconfigured for the fixture network and cheap KDF.
pub fn recovery_options(path: &Path, mode: RecoveryMode) -> RecoveryOptions {
    let mut options = RecoveryOptions::new(path, mode);
    options.network = TEST_NETWORK;
    options.dest_kdf = Some(KdfParams {
        memory: 8,
        num_iter: 1,
        salt: [0x7d; 32],
    });
    options
}
