//! # salvage-core
//! Byte-level parsing, digests, checksums and secp256k1 primitives shared by
//! the salvage wallet-recovery crates.

pub mod crypto;
pub mod error;
pub mod hashes;
pub mod reader;
pub mod secure;
pub mod types;

pub use error::{CryptoError, ReadError};
pub use reader::BinaryReader;
pub use secure::SecureBytes;
pub use types::{ChainCode, Hash160};
