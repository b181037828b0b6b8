//! Passphrase stretching for wallet encryption.
//!
//! The header stores the KDF parameters (memory cost, iterations, salt) in a
//! zero-padded, checksum-protected block so a damaged wallet can still tell
//! whether its parameters are readable. Key derivation is Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use salvage_core::hashes::checksum4;
use salvage_core::reader::BinaryReader;
use salvage_core::SecureBytes;

use crate::error::WalletError;
use crate::format::KDF_BLOCK_SIZE;

/// Derived symmetric key length.
pub const KDF_KEY_LEN: usize = 32;

/// Serialized parameter payload: memory u64 || iterations u32 || salt 32.
const PARAMS_LEN: usize = 8 + 4 + 32;

/// Default memory cost in KiB.
const DEFAULT_MEMORY_KIB: u64 = 8192;

/// Default iteration count.
const DEFAULT_ITERATIONS: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory: u64,
    pub num_iter: u32,
    pub salt: [u8; 32],
}

impl KdfParams {
    /// Fresh parameters with a random salt and default costs.
    pub fn generate() -> Self {
        Self::with_cost(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS)
    }

    pub fn with_cost(memory: u64, num_iter: u32) -> Self {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self {
            memory,
            num_iter,
            salt,
        }
    }

    /// Stretch a passphrase into the wallet's symmetric key.
    pub fn derive_key(&self, passphrase: &SecureBytes) -> Result<SecureBytes, WalletError> {
        let params = Params::new(
            u32::try_from(self.memory).map_err(|_| WalletError::Kdf("memory cost".into()))?,
            self.num_iter,
            1,
            Some(KDF_KEY_LEN),
        )
        .map_err(|e| WalletError::Kdf(e.to_string()))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = vec![0u8; KDF_KEY_LEN];
        argon
            .hash_password_into(passphrase.as_slice(), &self.salt, &mut out)
            .map_err(|e| WalletError::Kdf(e.to_string()))?;
        Ok(SecureBytes::new(out))
    }

    /// Zero-padded header block: params || checksum || padding.
    pub fn serialize(&self) -> [u8; KDF_BLOCK_SIZE] {
        let mut payload = [0u8; PARAMS_LEN];
        payload[..8].copy_from_slice(&self.memory.to_le_bytes());
        payload[8..12].copy_from_slice(&self.num_iter.to_le_bytes());
        payload[12..44].copy_from_slice(&self.salt);

        let mut block = [0u8; KDF_BLOCK_SIZE];
        block[..PARAMS_LEN].copy_from_slice(&payload);
        block[PARAMS_LEN..PARAMS_LEN + 4].copy_from_slice(&checksum4(&payload));
        block
    }

    /// Parse a header block. An all-zero block means no KDF parameters.
    pub fn deserialize(block: &[u8]) -> Result<Option<Self>, WalletError> {
        if block.len() != KDF_BLOCK_SIZE {
            return Err(WalletError::CorruptedHeader("kdf block size".into()));
        }
        if block.iter().all(|b| *b == 0) {
            return Ok(None);
        }

        let payload = &block[..PARAMS_LEN];
        let stored: [u8; 4] = block[PARAMS_LEN..PARAMS_LEN + 4]
            .try_into()
            .expect("slice width");
        if checksum4(payload) != stored {
            return Err(WalletError::BadChecksum("kdf parameters"));
        }

        let mut reader = BinaryReader::new(payload);
        let memory = reader.get_u64_le()?;
        let num_iter = reader.get_u32_le()?;
        let salt: [u8; 32] = reader.get_array()?;
        Ok(Some(Self {
            memory,
            num_iter,
            salt,
        }))
    }
}
