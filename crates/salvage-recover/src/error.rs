//! Recovery error types.
//!
//! Header-stage failures are fatal and carry the legacy numeric codes that
//! callers and the audit log report. Entry-level decode failures are never
//! fatal; the stream is resynchronized and the run continues.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal failure classes. The `Display` strings are the exact audit-log
/// wordings.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    #[error("Invalid path, or file is not a valid Armory wallet")]
    NotAWallet,
    #[error("file I/O failure. Do you have proper credentials?")]
    Io,
    #[error("This wallet file is for another network/blockchain")]
    WrongNetwork,
    #[error("invalid or missing passphrase for encrypted wallet")]
    BadPassphrase,
    #[error("no kdf parameters available")]
    NoKdfParams,
    #[error("failed to unlock root key")]
    RootUnlockFailed,
}

impl FatalError {
    pub fn code(&self) -> i32 {
        match self {
            FatalError::NotAWallet => -1,
            FatalError::Io => -2,
            FatalError::WrongNetwork => -3,
            FatalError::BadPassphrase => -4,
            FatalError::NoKdfParams => -10,
            FatalError::RootUnlockFailed => -12,
        }
    }
}

/// Failure of one address-entry decode attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The unreadable-field mask covers hash160, private key, IV, public
    /// key and chaincode at once; nothing left to trust.
    #[error("entry rejected, unreadable field mask {mask:#04x}")]
    InvalidEntry { mask: u8 },
    #[error("entry truncated")]
    Truncated,
}

/// Terminal result of a failed recovery run.
#[derive(Error, Debug)]
#[error("recovery failed with code {}: {error}", error.code())]
pub struct RecoveryFailure {
    pub error: FatalError,
    /// Where the audit log landed, when one could be written at all.
    pub log_path: Option<PathBuf>,
}

impl RecoveryFailure {
    pub fn code(&self) -> i32 {
        self.error.code()
    }
}
