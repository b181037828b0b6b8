//! Wallet error types.

use salvage_core::{CryptoError, ReadError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Filesystem failure; the message carries the underlying cause.
    #[error("I/O: {0}")]
    Io(String),

    /// The file id does not identify an Armory-format wallet.
    #[error("not a wallet file: {0}")]
    NotAWallet(String),

    #[error("corrupted header: {0}")]
    CorruptedHeader(String),

    /// A record tag outside the known set.
    #[error("unknown entry type tag {0:#04x}")]
    UnknownEntryType(u8),

    /// OPEVAL records are recognized but carry no parseable body.
    #[error("opeval entries are not supported")]
    NotImplemented,

    /// Strict decoding found a checksum mismatch; the tolerant decoder in
    /// the recovery crate is the place to handle these.
    #[error("checksum mismatch in {0}")]
    BadChecksum(&'static str),

    /// Private-key material inconsistent with the entry's public key, or
    /// missing where required.
    #[error("key data: {0}")]
    KeyData(String),

    #[error("KDF failure: {0}")]
    Kdf(String),

    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error("wallet has no KDF parameters")]
    NoKdfParams,

    #[error("invalid passphrase")]
    InvalidPassphrase,

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl WalletError {
    pub(crate) fn io(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
