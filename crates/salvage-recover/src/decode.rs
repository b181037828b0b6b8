//! Tolerant address-entry decoder.
//!
//! Unlike the strict codec in `salvage-wallet`, every checksum-protected
//! sub-field here is verified (and possibly single-bit-repaired)
//! independently, so damage in one field never contaminates its neighbours.
//! Each unreadable field or flag contradiction sets one bit of the returned
//! mask; an entry is only rejected outright when all five data-carrying
//! fields are unreadable at once.

use salvage_core::crypto;
use salvage_core::hashes::verify_checksum;
use salvage_core::reader::BinaryReader;
use salvage_core::{ChainCode, Hash160, SecureBytes};
use salvage_wallet::entry::{AddressEntry, EntryFlags};

use crate::error::DecodeError;

/// hash160 field unreadable.
pub const MASK_HASH160: u8 = 1;
/// `has_priv` declared but the private-key field is unreadable.
pub const MASK_PRIV_UNREADABLE: u8 = 1 << 1;
/// `has_priv` clear but a well-formed 32-byte private key is present.
pub const MASK_PRIV_FLAG: u8 = 1 << 2;
/// `use_encryption` declared but the IV is unreadable.
pub const MASK_IV_UNREADABLE: u8 = 1 << 3;
/// `use_encryption` clear but a 16-byte IV is present.
pub const MASK_IV_FLAG: u8 = 1 << 4;
/// `has_pub` declared but the public-key field is unreadable.
pub const MASK_PUB_UNREADABLE: u8 = 1 << 5;
/// `has_pub` clear but a 65-byte public key is present.
pub const MASK_PUB_FLAG: u8 = 1 << 6;
/// Chaincode field unreadable.
pub const MASK_CHAINCODE: u8 = 1 << 7;

/// hash160 + private key + IV + public key + chaincode all unreadable.
pub const MASK_FATAL: u8 = 0xab;

/// Decode one 237-byte entry payload, repairing what the checksums allow.
///
/// Returns the entry together with the error mask; callers log non-zero
/// masks. Flag contradictions (mask bits 2, 4 and 6) flip the declared flag
/// to the observed truth. When the public key is unreadable but a plaintext
/// private key survived, the public key is recomputed from it.
pub fn decode_address_with_recovery(body: &[u8]) -> Result<(AddressEntry, u8), DecodeError> {
    let mut r = BinaryReader::new(body);
    let mut mask = 0u8;

    let outcome = (|| -> Result<(AddressEntry, u8), salvage_core::ReadError> {
        let hash_bytes: [u8; 20] = r.get_array()?;
        let hash_chk: [u8; 4] = r.get_array()?;
        let addr_version = r.get_u32_le()?;
        let mut flags = EntryFlags::from_bits(r.get_u64_le()?);

        let hash160 = match verify_checksum(&hash_bytes, &hash_chk) {
            Some(bytes) => Hash160::from_slice(&bytes).unwrap_or(Hash160::ZERO),
            None => {
                mask |= MASK_HASH160;
                Hash160::ZERO
            }
        };

        let cc_bytes: [u8; 32] = r.get_array()?;
        let cc_chk: [u8; 4] = r.get_array()?;
        let chain_index = r.get_i64_le()?;
        let unlock_depth = r.get_i64_le()?;
        let chaincode = match verify_checksum(&cc_bytes, &cc_chk) {
            Some(bytes) if bytes.iter().any(|b| *b != 0) => {
                ChainCode::from_slice(&bytes).unwrap_or(ChainCode::ZERO)
            }
            Some(_) => ChainCode::ZERO,
            None => {
                mask |= MASK_CHAINCODE;
                ChainCode::ZERO
            }
        };

        let iv_bytes: [u8; 16] = r.get_array()?;
        let iv_chk: [u8; 4] = r.get_array()?;
        let iv: Option<[u8; 16]> = match verify_checksum(&iv_bytes, &iv_chk) {
            Some(bytes) if bytes.iter().any(|b| *b != 0) => {
                Some(bytes.as_slice().try_into().expect("width"))
            }
            _ => None,
        };
        let iv_readable = iv.is_some();

        let priv_bytes: [u8; 32] = r.get_array()?;
        let priv_chk: [u8; 4] = r.get_array()?;
        let priv_key: SecureBytes = match verify_checksum(&priv_bytes, &priv_chk) {
            Some(bytes) if bytes.iter().any(|b| *b != 0) => SecureBytes::new(bytes),
            _ => SecureBytes::empty(),
        };

        let pub_bytes: [u8; 65] = r.get_array()?;
        let pub_chk: [u8; 4] = r.get_array()?;
        let mut pub_key: Option<[u8; 65]> = match verify_checksum(&pub_bytes, &pub_chk) {
            Some(bytes) if bytes.iter().any(|b| *b != 0) => {
                Some(bytes.as_slice().try_into().expect("width"))
            }
            _ => None,
        };

        let time_range = (r.get_u64_le()?, r.get_u64_le()?);
        let block_range = (r.get_u32_le()?, r.get_u32_le()?);

        // Reconcile flags against what actually survived.
        if flags.has_priv {
            if priv_key.is_empty() {
                mask |= MASK_PRIV_UNREADABLE;
                flags.has_priv = false;
            }
        } else if priv_key.len() == 32 {
            mask |= MASK_PRIV_FLAG;
            flags.has_priv = true;
        }

        if flags.use_encryption {
            if !iv_readable {
                mask |= MASK_IV_UNREADABLE;
            }
        } else if iv_readable {
            mask |= MASK_IV_FLAG;
            flags.use_encryption = true;
        }

        if flags.has_pub {
            if pub_key.is_none() {
                mask |= MASK_PUB_UNREADABLE;
                if !flags.use_encryption && priv_key.len() == 32 {
                    if let Ok(recomputed) = crypto::compute_public_key(priv_key.as_slice()) {
                        pub_key = Some(recomputed);
                    }
                }
            }
        } else if pub_key.is_some() {
            mask |= MASK_PUB_FLAG;
            flags.has_pub = true;
        }

        let mut entry = AddressEntry {
            hash160,
            addr_version,
            flags,
            chaincode,
            chain_index,
            unlock_depth,
            pub_key,
            time_range,
            block_range,
            is_locked: flags.use_encryption,
            ..Default::default()
        };
        if flags.use_encryption {
            if flags.create_priv_on_next_unlock {
                entry.unlock_iv = iv;
                entry.unlock_priv = priv_key;
            } else {
                entry.iv = iv;
                entry.priv_encrypted = priv_key;
            }
        } else {
            entry.iv = iv;
            entry.priv_plain = priv_key;
        }
        Ok((entry, mask))
    })();

    match outcome {
        Ok((entry, mask)) => {
            if mask & MASK_FATAL == MASK_FATAL {
                return Err(DecodeError::InvalidEntry { mask });
            }
            Ok((entry, mask))
        }
        Err(_) => Err(DecodeError::Truncated),
    }
}

/// Human-readable names of the failed fields, for the raw-error trail.
pub fn describe_mask(mask: u8) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if mask & MASK_HASH160 != 0 {
        fields.push("hash160");
    }
    if mask & MASK_PRIV_UNREADABLE != 0 {
        fields.push("private key");
    }
    if mask & MASK_PRIV_FLAG != 0 {
        fields.push("hasPrivKey flag");
    }
    if mask & MASK_IV_UNREADABLE != 0 {
        fields.push("encryption IV");
    }
    if mask & MASK_IV_FLAG != 0 {
        fields.push("useEncryption flag");
    }
    if mask & MASK_PUB_UNREADABLE != 0 {
        fields.push("public key");
    }
    if mask & MASK_PUB_FLAG != 0 {
        fields.push("hasPubKey flag");
    }
    if mask & MASK_CHAINCODE != 0 {
        fields.push("chaincode");
    }
    fields
}
