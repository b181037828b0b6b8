//! Digests and the 4-byte field checksum scheme.
//!
//! Every checksum-protected field in the wallet format stores the first four
//! bytes of `SHA-256(SHA-256(field))` next to the field itself.
//! [`verify_checksum`] additionally attempts a single-bit repair on mismatch,
//! on the data first, then on the checksum itself (a corrupt checksum over
//! intact data is accepted as intact).

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::Hash160;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 of SHA-256.
pub fn hash160(data: &[u8]) -> Hash160 {
    let inner = sha256(data);
    Hash160(Ripemd160::digest(inner).into())
}

/// First four bytes of [`hash256`].
pub fn checksum4(data: &[u8]) -> [u8; 4] {
    let digest = hash256(data);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Verify `data` against its stored checksum.
///
/// Returns the data unchanged on a match. On mismatch, tries flipping every
/// single bit of the data and returns the repaired copy if one matches; then
/// tries flipping every bit of the checksum, and returns the data unchanged
/// if the checksum itself was the corrupted side. `None` means the field is
/// unrecoverable.
pub fn verify_checksum(data: &[u8], chksum: &[u8; 4]) -> Option<Vec<u8>> {
    let computed = checksum4(data);
    if &computed == chksum {
        return Some(data.to_vec());
    }

    let mut fixed = data.to_vec();
    for i in 0..fixed.len() {
        for bit in 0..8 {
            fixed[i] ^= 1 << bit;
            if &checksum4(&fixed) == chksum {
                return Some(fixed);
            }
            fixed[i] ^= 1 << bit;
        }
    }

    for i in 0..4 {
        for bit in 0..8 {
            let mut chk = *chksum;
            chk[i] ^= 1 << bit;
            if computed == chk {
                return Some(data.to_vec());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash256_differs_from_sha256() {
        assert_ne!(hash256(b"salvage"), sha256(b"salvage"));
        assert_eq!(hash256(b"salvage"), sha256(&sha256(b"salvage")));
    }

    #[test]
    fn hash160_known_width() {
        let h = hash160(b"some public key bytes");
        assert_eq!(h.as_bytes().len(), 20);
        assert!(!h.is_zero());
    }

    #[test]
    fn checksum_matches_clean_data() {
        let data = [0x42u8; 32];
        let chk = checksum4(&data);
        assert_eq!(verify_checksum(&data, &chk), Some(data.to_vec()));
    }

    #[test]
    fn checksum_repairs_single_bit_in_data() {
        let data = [0x42u8; 32];
        let chk = checksum4(&data);
        let mut bad = data;
        bad[7] ^= 0x10;
        assert_eq!(verify_checksum(&bad, &chk), Some(data.to_vec()));
    }

    #[test]
    fn checksum_accepts_single_bit_in_checksum() {
        let data = [0x42u8; 32];
        let mut chk = checksum4(&data);
        chk[2] ^= 0x04;
        assert_eq!(verify_checksum(&data, &chk), Some(data.to_vec()));
    }

    #[test]
    fn checksum_rejects_heavy_damage() {
        let data = [0x42u8; 32];
        let chk = checksum4(&data);
        let mut bad = data;
        bad[0] ^= 0xff;
        bad[1] ^= 0xff;
        assert_eq!(verify_checksum(&bad, &chk), None);
    }

    #[test]
    fn checksum_of_zeroes_is_valid() {
        // Absent fixed-width fields are stored as zero bytes with a checksum
        // over the zeroes; those must verify clean.
        let zeroes = [0u8; 16];
        let chk = checksum4(&zeroes);
        assert_eq!(verify_checksum(&zeroes, &chk), Some(zeroes.to_vec()));
    }
}
