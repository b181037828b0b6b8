//! Wallet file header: identity, labels, KDF parameters and the root record.

use salvage_core::reader::BinaryReader;
use salvage_core::{Hash160, SecureBytes};

use crate::crypter;
use crate::entry::AddressEntry;
use crate::error::WalletError;
use crate::format::{
    EntryType, Network, CRYPTO_BLOCK_SIZE, ENTRY_SIZE, FILE_ID, HEADER_SIZE, KDF_BLOCK_SIZE,
};
use crate::kdf::KdfParams;

const FLAG_USE_ENCRYPTION: u64 = 1;
const FLAG_WATCHING_ONLY: u64 = 1 << 1;

pub const LABEL_NAME_LEN: usize = 32;
pub const LABEL_DESCR_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletHeader {
    pub version: u32,
    pub network: Network,
    pub use_encryption: bool,
    pub watching_only: bool,
    pub unique_id: [u8; 6],
    pub create_time: u64,
    pub label_name: String,
    pub label_descr: String,
    pub highest_used: i64,
    pub kdf: Option<KdfParams>,
    /// Checksum of the derived KDF key; zero for unencrypted wallets.
    pub key_check: [u8; 4],
    /// Key of the root KEYDATA record.
    pub root_hash: Hash160,
    /// The root keypair and chaincode, chain index 0.
    pub root: AddressEntry,
}

impl WalletHeader {
    pub fn unique_id_b58(&self) -> String {
        bs58::encode(&self.unique_id).into_string()
    }

    /// True iff `key` matches the stored verification value.
    pub fn verify_encryption_key(&self, key: &SecureBytes) -> bool {
        self.use_encryption && crypter::key_check(key) == self.key_check
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&FILE_ID);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.network.magic());

        let mut flags = 0u64;
        if self.use_encryption {
            flags |= FLAG_USE_ENCRYPTION;
        }
        if self.watching_only {
            flags |= FLAG_WATCHING_ONLY;
        }
        out.extend_from_slice(&flags.to_le_bytes());

        out.extend_from_slice(&self.unique_id);
        out.extend_from_slice(&self.create_time.to_le_bytes());
        out.extend_from_slice(&pad_label(&self.label_name, LABEL_NAME_LEN));
        out.extend_from_slice(&pad_label(&self.label_descr, LABEL_DESCR_LEN));
        out.extend_from_slice(&self.highest_used.to_le_bytes());

        match &self.kdf {
            Some(kdf) => out.extend_from_slice(&kdf.serialize()),
            None => out.extend_from_slice(&[0u8; KDF_BLOCK_SIZE]),
        }

        let mut crypto_block = [0u8; CRYPTO_BLOCK_SIZE];
        crypto_block[..4].copy_from_slice(&self.key_check);
        out.extend_from_slice(&crypto_block);

        out.push(EntryType::KeyData.tag());
        out.extend_from_slice(self.root_hash.as_bytes());
        out.extend_from_slice(&self.root.serialize());

        debug_assert_eq!(out.len(), HEADER_SIZE);
        out
    }

    pub fn deserialize(reader: &mut BinaryReader) -> Result<Self, WalletError> {
        let file_id: [u8; 8] = reader.get_array()?;
        if file_id != FILE_ID {
            return Err(WalletError::NotAWallet("bad file id".into()));
        }
        let version = reader.get_u32_le()?;
        let magic: [u8; 4] = reader.get_array()?;
        let network = Network::from_magic(magic)
            .ok_or_else(|| WalletError::CorruptedHeader("unknown network magic".into()))?;

        let flags = reader.get_u64_le()?;
        let unique_id: [u8; 6] = reader.get_array()?;
        let create_time = reader.get_u64_le()?;
        let label_name = read_label(reader.get_bytes(LABEL_NAME_LEN)?);
        let label_descr = read_label(reader.get_bytes(LABEL_DESCR_LEN)?);
        let highest_used = reader.get_i64_le()?;

        let kdf = KdfParams::deserialize(reader.get_bytes(KDF_BLOCK_SIZE)?)?;
        let crypto_block = reader.get_bytes(CRYPTO_BLOCK_SIZE)?;
        let key_check: [u8; 4] = crypto_block[..4].try_into().expect("slice width");

        let root_tag = reader.get_u8()?;
        if root_tag != EntryType::KeyData.tag() {
            return Err(WalletError::CorruptedHeader("root record tag".into()));
        }
        let root_hash = Hash160::from_bytes(reader.get_array()?);
        let root = AddressEntry::deserialize(reader.get_bytes(ENTRY_SIZE)?)
            .map_err(|e| WalletError::CorruptedHeader(format!("root entry: {e}")))?;

        Ok(Self {
            version,
            network,
            use_encryption: flags & FLAG_USE_ENCRYPTION != 0,
            watching_only: flags & FLAG_WATCHING_ONLY != 0,
            unique_id,
            create_time,
            label_name,
            label_descr,
            highest_used,
            kdf,
            key_check,
            root_hash,
            root,
        })
    }
}

fn pad_label(label: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let bytes = label.as_bytes();
    let n = bytes.len().min(width);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn read_label(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
