//! The 237-byte address entry, the central record of the wallet body.
//!
//! Layout (all integers little-endian, `chk` = 4-byte field checksum):
//!
//! ```text
//! hash160(20) chk(4) addr_version(4) flags(8)
//! chaincode(32) chk(4) chain_index(8) unlock_depth(8)
//! iv(16) chk(4) priv(32) chk(4) pub(65) chk(4)
//! time_range(16) blk_range(8)
//! ```
//!
//! Absent fixed-width fields are written as zero bytes with the checksum
//! computed over the zeroes, so a well-formed entry always re-serializes
//! bit-exactly. The `priv` slot holds plaintext or ciphertext depending on
//! the `use_encryption` flag; for `create_priv_on_next_unlock` entries it
//! holds the ancestor's ciphertext to derive from instead.

use salvage_core::crypto;
use salvage_core::hashes::{self, checksum4};
use salvage_core::reader::BinaryReader;
use salvage_core::{ChainCode, Hash160, SecureBytes};

use crate::crypter;
use crate::error::WalletError;
use crate::format::ENTRY_SIZE;

const FLAG_HAS_PRIV: u64 = 1;
const FLAG_HAS_PUB: u64 = 1 << 1;
const FLAG_USE_ENCRYPTION: u64 = 1 << 2;
const FLAG_CREATE_PRIV_NEXT_UNLOCK: u64 = 1 << 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryFlags {
    pub has_priv: bool,
    pub has_pub: bool,
    pub use_encryption: bool,
    pub create_priv_on_next_unlock: bool,
}

impl EntryFlags {
    pub fn from_bits(bits: u64) -> Self {
        Self {
            has_priv: bits & FLAG_HAS_PRIV != 0,
            has_pub: bits & FLAG_HAS_PUB != 0,
            use_encryption: bits & FLAG_USE_ENCRYPTION != 0,
            create_priv_on_next_unlock: bits & FLAG_CREATE_PRIV_NEXT_UNLOCK != 0,
        }
    }

    pub fn to_bits(self) -> u64 {
        let mut bits = 0;
        if self.has_priv {
            bits |= FLAG_HAS_PRIV;
        }
        if self.has_pub {
            bits |= FLAG_HAS_PUB;
        }
        if self.use_encryption {
            bits |= FLAG_USE_ENCRYPTION;
        }
        if self.create_priv_on_next_unlock {
            bits |= FLAG_CREATE_PRIV_NEXT_UNLOCK;
        }
        bits
    }
}

/// One key of the wallet, chained (`chain_index >= 0`) or imported (`< 0`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressEntry {
    /// The hash160 stored inside the payload. May disagree with the real
    /// hash of the public key; the validator treats that as a finding.
    pub hash160: Hash160,
    pub addr_version: u32,
    pub flags: EntryFlags,
    /// Zero when the field was absent or unrecoverable.
    pub chaincode: ChainCode,
    pub chain_index: i64,
    /// Chain distance to the ancestor whose key material seeds a deferred
    /// private-key derivation.
    pub unlock_depth: i64,
    pub iv: Option<[u8; 16]>,
    /// Empty when absent.
    pub priv_plain: SecureBytes,
    /// Empty when absent.
    pub priv_encrypted: SecureBytes,
    pub pub_key: Option<[u8; 65]>,
    pub time_range: (u64, u64),
    pub block_range: (u32, u32),

    /// Runtime state, not serialized on its own: encrypted entries start out
    /// locked until [`unlock`](AddressEntry::unlock) succeeds.
    pub is_locked: bool,
    /// Ancestor IV for a deferred derivation (occupies the iv slot on disk
    /// when `create_priv_on_next_unlock` is set).
    pub unlock_iv: Option<[u8; 16]>,
    /// Ancestor ciphertext for a deferred derivation.
    pub unlock_priv: SecureBytes,
}

impl AddressEntry {
    pub fn from_private_key(
        chain_index: i64,
        priv_key: &SecureBytes,
        chaincode: ChainCode,
    ) -> Result<Self, WalletError> {
        let pubkey = crypto::compute_public_key(priv_key.as_slice())?;
        Ok(Self {
            hash160: hashes::hash160(&pubkey),
            flags: EntryFlags {
                has_priv: true,
                has_pub: true,
                ..Default::default()
            },
            chaincode,
            chain_index,
            priv_plain: priv_key.clone(),
            pub_key: Some(pubkey),
            ..Default::default()
        })
    }

    pub fn from_public_key(chain_index: i64, pubkey: [u8; 65], chaincode: ChainCode) -> Self {
        Self {
            hash160: hashes::hash160(&pubkey),
            flags: EntryFlags {
                has_pub: true,
                ..Default::default()
            },
            chaincode,
            chain_index,
            pub_key: Some(pubkey),
            ..Default::default()
        }
    }

    pub fn is_imported(&self) -> bool {
        self.chain_index < 0
    }

    pub fn has_priv_key(&self) -> bool {
        !self.priv_plain.is_empty()
            || !self.priv_encrypted.is_empty()
            || self.flags.create_priv_on_next_unlock
    }

    pub fn has_pub_key(&self) -> bool {
        self.pub_key.is_some()
    }

    /// hash160 of the public key actually present, not the stored field.
    pub fn compute_hash160(&self) -> Option<Hash160> {
        self.pub_key.map(|p| hashes::hash160(&p))
    }

    /// Derive the next chained entry from this one. Public keys always
    /// chain; the private key chains when plaintext is available and is
    /// encrypted under `kdf_key` when one is supplied.
    pub fn derive_child(&self, kdf_key: Option<&SecureBytes>) -> Result<Self, WalletError> {
        let parent_pub = self
            .pub_key
            .ok_or_else(|| WalletError::KeyData("cannot chain without a public key".into()))?;
        let child_pub = crypto::compute_chained_public_key(&parent_pub, &self.chaincode)?;
        let mut child = Self::from_public_key(self.chain_index + 1, child_pub, self.chaincode);

        if !self.priv_plain.is_empty() {
            child.priv_plain = crypto::compute_chained_private_key(&self.priv_plain, &self.chaincode)?;
            child.flags.has_priv = true;
            if let Some(key) = kdf_key {
                let iv = crypter::random_iv();
                child.priv_encrypted = crypter::encrypt(key, &iv, &child.priv_plain)?;
                child.iv = Some(iv);
                child.flags.use_encryption = true;
            }
        }
        Ok(child)
    }

    /// Decrypt (or derive, for deferred entries) the plaintext private key.
    ///
    /// Failure to reproduce the entry's public key from the decrypted
    /// private key is a key-data error; callers classify it as a
    /// public/private mismatch rather than a fatal condition.
    pub fn unlock(&mut self, kdf_key: &SecureBytes) -> Result<(), WalletError> {
        if !self.priv_plain.is_empty() {
            self.is_locked = false;
            return Ok(());
        }

        if self.flags.create_priv_on_next_unlock {
            let iv = self
                .unlock_iv
                .ok_or_else(|| WalletError::KeyData("deferred entry without ancestor iv".into()))?;
            if self.unlock_priv.len() != crypto::PRIVKEY_LEN {
                return Err(WalletError::KeyData(
                    "deferred entry without ancestor key".into(),
                ));
            }
            let mut running = crypter::decrypt(kdf_key, &iv, &self.unlock_priv)?;
            for _ in 0..self.unlock_depth {
                running = crypto::compute_chained_private_key(&running, &self.chaincode)?;
            }
            self.finish_unlock(kdf_key, running)?;
            self.flags.create_priv_on_next_unlock = false;
            self.flags.has_priv = true;
            return Ok(());
        }

        if self.flags.use_encryption {
            let iv = self
                .iv
                .ok_or_else(|| WalletError::KeyData("encrypted entry without iv".into()))?;
            if self.priv_encrypted.len() != crypto::PRIVKEY_LEN {
                return Err(WalletError::KeyData("encrypted entry without key".into()));
            }
            let plain = crypter::decrypt(kdf_key, &iv, &self.priv_encrypted)?;
            self.finish_unlock(kdf_key, plain)?;
            return Ok(());
        }

        self.is_locked = false;
        Ok(())
    }

    fn finish_unlock(&mut self, kdf_key: &SecureBytes, plain: SecureBytes) -> Result<(), WalletError> {
        if let Some(pubkey) = self.pub_key {
            if !crypto::check_pub_priv_match(plain.as_slice(), &pubkey) {
                return Err(WalletError::KeyData(
                    "private key does not match public key".into(),
                ));
            }
        }
        if self.iv.is_none() {
            self.iv = Some(crypter::random_iv());
        }
        let iv = self.iv.expect("set above");
        self.priv_encrypted = crypter::encrypt(kdf_key, &iv, &plain)?;
        self.priv_plain = plain;
        self.is_locked = false;
        Ok(())
    }

    /// Re-encrypt under `kdf_key` and wipe the plaintext.
    pub fn lock(&mut self, kdf_key: &SecureBytes) -> Result<(), WalletError> {
        if !self.priv_plain.is_empty() {
            if self.iv.is_none() {
                self.iv = Some(crypter::random_iv());
            }
            let iv = self.iv.expect("set above");
            self.priv_encrypted = crypter::encrypt(kdf_key, &iv, &self.priv_plain)?;
            self.priv_plain.destroy();
            self.flags.use_encryption = true;
        }
        if !self.priv_encrypted.is_empty() {
            self.is_locked = true;
        }
        Ok(())
    }

    /// The iv/priv pair occupying the key-material slots on disk.
    fn stored_key_material(&self) -> ([u8; 16], [u8; 32]) {
        let (iv, privkey) = if self.flags.use_encryption {
            if self.flags.create_priv_on_next_unlock {
                (self.unlock_iv, &self.unlock_priv)
            } else {
                (self.iv, &self.priv_encrypted)
            }
        } else {
            (self.iv, &self.priv_plain)
        };
        (iv.unwrap_or([0u8; 16]), fixed::<32>(privkey.as_slice()))
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTRY_SIZE);
        push_checked(&mut out, self.hash160.as_bytes());
        out.extend_from_slice(&self.addr_version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_bits().to_le_bytes());
        push_checked(&mut out, self.chaincode.as_bytes());
        out.extend_from_slice(&self.chain_index.to_le_bytes());
        out.extend_from_slice(&self.unlock_depth.to_le_bytes());

        let (iv, privkey) = self.stored_key_material();
        push_checked(&mut out, &iv);
        push_checked(&mut out, &privkey);

        let pubkey = self.pub_key.unwrap_or([0u8; 65]);
        push_checked(&mut out, &pubkey);

        out.extend_from_slice(&self.time_range.0.to_le_bytes());
        out.extend_from_slice(&self.time_range.1.to_le_bytes());
        out.extend_from_slice(&self.block_range.0.to_le_bytes());
        out.extend_from_slice(&self.block_range.1.to_le_bytes());

        debug_assert_eq!(out.len(), ENTRY_SIZE);
        out
    }

    /// Strict decode: any checksum mismatch is an error. The tolerant,
    /// repairing decoder lives in the recovery crate.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, WalletError> {
        let mut r = BinaryReader::new(bytes);

        let hash_bytes: [u8; 20] = r.get_array()?;
        let chk: [u8; 4] = r.get_array()?;
        require(&hash_bytes, &chk, "hash160")?;

        let addr_version = r.get_u32_le()?;
        let flags = EntryFlags::from_bits(r.get_u64_le()?);

        let cc_bytes: [u8; 32] = r.get_array()?;
        let chk: [u8; 4] = r.get_array()?;
        require(&cc_bytes, &chk, "chaincode")?;

        let chain_index = r.get_i64_le()?;
        let unlock_depth = r.get_i64_le()?;

        let iv_bytes: [u8; 16] = r.get_array()?;
        let chk: [u8; 4] = r.get_array()?;
        require(&iv_bytes, &chk, "iv")?;

        let priv_bytes: [u8; 32] = r.get_array()?;
        let chk: [u8; 4] = r.get_array()?;
        require(&priv_bytes, &chk, "private key")?;

        let pub_bytes: [u8; 65] = r.get_array()?;
        let chk: [u8; 4] = r.get_array()?;
        require(&pub_bytes, &chk, "public key")?;

        let time_range = (r.get_u64_le()?, r.get_u64_le()?);
        let block_range = (r.get_u32_le()?, r.get_u32_le()?);

        let iv = non_zero(&iv_bytes).map(|_| iv_bytes);
        let privkey = match non_zero(&priv_bytes) {
            Some(_) => SecureBytes::from_slice(&priv_bytes),
            None => SecureBytes::empty(),
        };
        let pub_key = non_zero(&pub_bytes).map(|_| pub_bytes);

        let mut entry = Self {
            hash160: Hash160::from_bytes(hash_bytes),
            addr_version,
            flags,
            chaincode: ChainCode::from_bytes(cc_bytes),
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
                entry.unlock_priv = privkey;
            } else {
                entry.iv = iv;
                entry.priv_encrypted = privkey;
            }
        } else {
            entry.iv = iv;
            entry.priv_plain = privkey;
        }
        Ok(entry)
    }
}

fn require(data: &[u8], chk: &[u8; 4], field: &'static str) -> Result<(), WalletError> {
    if checksum4(data) == *chk {
        Ok(())
    } else {
        Err(WalletError::BadChecksum(field))
    }
}

/// Fixed-width zero-padding for absent or short values.
fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn non_zero(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.iter().all(|b| *b == 0) {
        None
    } else {
        Some(bytes)
    }
}

fn push_checked(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    out.extend_from_slice(&checksum4(data));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chaincode() -> ChainCode {
        ChainCode::from_bytes([0x35; 32])
    }

    fn plain_entry() -> AddressEntry {
        AddressEntry::from_private_key(0, &SecureBytes::from_slice(&[0x21; 32]), chaincode())
            .unwrap()
    }

    fn kdf_key() -> SecureBytes {
        SecureBytes::from_slice(&[0x42; 32])
    }

    #[test]
    fn flags_bits_roundtrip() {
        let flags = EntryFlags {
            has_priv: true,
            has_pub: false,
            use_encryption: true,
            create_priv_on_next_unlock: true,
        };
        assert_eq!(EntryFlags::from_bits(flags.to_bits()), flags);
        assert_eq!(EntryFlags::from_bits(0), EntryFlags::default());
    }

    #[test]
    fn serialized_width_is_fixed() {
        assert_eq!(plain_entry().serialize().len(), ENTRY_SIZE);
        let watch = AddressEntry::from_public_key(3, plain_entry().pub_key.unwrap(), chaincode());
        assert_eq!(watch.serialize().len(), ENTRY_SIZE);
    }

    #[test]
    fn plain_roundtrip() {
        let entry = plain_entry();
        let bytes = entry.serialize();
        let decoded = AddressEntry::deserialize(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.serialize(), bytes);
    }

    #[test]
    fn watch_only_roundtrip_has_no_private_key() {
        let entry = AddressEntry::from_public_key(7, plain_entry().pub_key.unwrap(), chaincode());
        let decoded = AddressEntry::deserialize(&entry.serialize()).unwrap();
        assert!(!decoded.has_priv_key());
        assert!(decoded.has_pub_key());
        assert_eq!(decoded.chain_index, 7);
    }

    #[test]
    fn encrypted_roundtrip_and_unlock() {
        let mut entry = plain_entry();
        let plain = entry.priv_plain.clone();
        entry.lock(&kdf_key()).unwrap();
        assert!(entry.is_locked);
        assert!(entry.priv_plain.is_empty());

        let bytes = entry.serialize();
        let mut decoded = AddressEntry::deserialize(&bytes).unwrap();
        assert!(decoded.is_locked);
        decoded.unlock(&kdf_key()).unwrap();
        assert_eq!(decoded.priv_plain, plain);
    }

    #[test]
    fn unlock_with_wrong_key_is_key_data_error() {
        let mut entry = plain_entry();
        entry.lock(&kdf_key()).unwrap();
        let mut decoded = AddressEntry::deserialize(&entry.serialize()).unwrap();
        let err = decoded
            .unlock(&SecureBytes::from_slice(&[0x43; 32]))
            .unwrap_err();
        assert!(matches!(err, WalletError::KeyData(_)));
    }

    #[test]
    fn strict_decode_rejects_flipped_byte() {
        let mut bytes = plain_entry().serialize();
        bytes[40] ^= 0xff; // inside the chaincode
        assert_eq!(
            AddressEntry::deserialize(&bytes),
            Err(WalletError::BadChecksum("chaincode"))
        );
    }

    #[test]
    fn derive_child_chains_pub_and_priv() {
        let parent = plain_entry();
        let child = parent.derive_child(None).unwrap();
        assert_eq!(child.chain_index, 1);
        assert_eq!(child.chaincode, parent.chaincode);
        assert_eq!(
            crypto::compute_public_key(child.priv_plain.as_slice()).unwrap(),
            child.pub_key.unwrap()
        );
        assert_eq!(
            child.pub_key.unwrap(),
            crypto::compute_chained_public_key(&parent.pub_key.unwrap(), &parent.chaincode)
                .unwrap()
        );
        assert_eq!(child.hash160, child.compute_hash160().unwrap());
    }

    #[test]
    fn derive_child_encrypts_under_kdf_key() {
        let parent = plain_entry();
        let child = parent.derive_child(Some(&kdf_key())).unwrap();
        assert!(child.flags.use_encryption);
        assert_eq!(child.priv_encrypted.len(), 32);

        let mut stored = AddressEntry::deserialize(&child.serialize()).unwrap();
        stored.unlock(&kdf_key()).unwrap();
        assert_eq!(stored.priv_plain, child.priv_plain);
    }

    #[test]
    fn deferred_unlock_derives_from_ancestor() {
        let ancestor = plain_entry();
        let expected = ancestor
            .derive_child(None)
            .unwrap()
            .derive_child(None)
            .unwrap();

        let mut locked_ancestor = ancestor.clone();
        locked_ancestor.lock(&kdf_key()).unwrap();

        let mut deferred = AddressEntry {
            flags: EntryFlags {
                has_pub: true,
                use_encryption: true,
                create_priv_on_next_unlock: true,
                ..Default::default()
            },
            chaincode: chaincode(),
            chain_index: 2,
            unlock_depth: 2,
            pub_key: expected.pub_key,
            hash160: expected.hash160,
            unlock_iv: locked_ancestor.iv,
            unlock_priv: locked_ancestor.priv_encrypted.clone(),
            is_locked: true,
            ..Default::default()
        };

        deferred.unlock(&kdf_key()).unwrap();
        assert_eq!(deferred.priv_plain, expected.priv_plain);
        assert!(!deferred.flags.create_priv_on_next_unlock);
        assert!(deferred.flags.has_priv);
    }

    #[test]
    fn deferred_roundtrips_through_disk_form() {
        let ancestor = plain_entry();
        let mut locked = ancestor.clone();
        locked.lock(&kdf_key()).unwrap();

        let entry = AddressEntry {
            flags: EntryFlags {
                has_priv: true,
                use_encryption: true,
                create_priv_on_next_unlock: true,
                ..Default::default()
            },
            chaincode: chaincode(),
            chain_index: 5,
            unlock_depth: 1,
            unlock_iv: locked.iv,
            unlock_priv: locked.priv_encrypted.clone(),
            is_locked: true,
            ..Default::default()
        };
        let decoded = AddressEntry::deserialize(&entry.serialize()).unwrap();
        assert_eq!(decoded.unlock_iv, entry.unlock_iv);
        assert_eq!(decoded.unlock_priv, entry.unlock_priv);
        assert!(decoded.flags.create_priv_on_next_unlock);
    }
}
