//! Error types for salvage-core.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("read of {wanted} bytes at position {position} exceeds buffer of {size}")]
    OutOfRange {
        position: usize,
        wanted: usize,
        size: usize,
    },
    #[error("position {position} is past the end of a {size}-byte buffer")]
    BadSeek { position: usize, size: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")]
    InvalidPublicKey,
    #[error("invalid private key bytes")]
    InvalidPrivateKey,
    #[error("chain scalar out of range for the curve order")]
    InvalidChainScalar,
    #[error("point arithmetic failed")]
    PointArithmetic,
}
