//! # salvage-wallet — Armory-format deterministic wallet files.
//!
//! The on-disk format, strict codecs and wallet lifecycle used by the
//! recovery engine: header and address-entry serialization, Argon2id
//! passphrase stretching, AES-256-CFB private-key encryption, wallet
//! creation and append-only updates.
//!
//! # Modules
//!
//! - [`format`] — file constants, network magic, record type tags
//! - [`entry`] — the 237-byte address entry and its lock/unlock lifecycle
//! - [`header`] — wallet header codec
//! - [`kdf`] — KDF parameter block and key derivation
//! - [`crypter`] — AES-256-CFB and the header key-check value
//! - [`wallet`] — open/create, record stream, appends

pub mod crypter;
pub mod entry;
pub mod error;
pub mod format;
pub mod header;
pub mod kdf;
pub mod wallet;

pub use entry::{AddressEntry, EntryFlags};
pub use error::WalletError;
pub use format::{EntryType, Network, ENTRY_SIZE, HEADER_SIZE, KEYDATA_RECORD_SIZE};
pub use header::WalletHeader;
pub use kdf::KdfParams;
pub use wallet::{unpack_next_entry, NewWalletParams, Wallet, WalletUpdate};
