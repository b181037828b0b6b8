//! Wallet open/create and the body record stream.
//!
//! `Wallet` is the collaborator surface the recovery engine drives: open an
//! existing file and walk its records, or create a fresh wallet and append
//! recovered material to it. Appends go through [`Wallet::safe_update`] as an
//! operation list; there is no rewrite-in-place.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use salvage_core::hashes;
use salvage_core::reader::BinaryReader;
use salvage_core::{ChainCode, Hash160, SecureBytes};

use crate::crypter;
use crate::entry::AddressEntry;
use crate::error::WalletError;
use crate::format::{EntryType, Network, ENTRY_SIZE, FORMAT_VERSION};
use crate::header::WalletHeader;
use crate::kdf::KdfParams;

/// Parameters for [`Wallet::create_new`].
pub struct NewWalletParams {
    pub path: PathBuf,
    pub network: Network,
    /// Encrypt private keys when present (requires `root_priv`).
    pub passphrase: Option<SecureBytes>,
    /// Root private key; `None` creates a watch-only wallet.
    pub root_priv: Option<SecureBytes>,
    /// Root public key, required when `root_priv` is absent.
    pub root_pub: Option<[u8; 65]>,
    pub chaincode: ChainCode,
    pub label_name: String,
    pub label_descr: String,
    /// Override the generated KDF parameters (tests use cheap ones).
    pub kdf: Option<KdfParams>,
}

/// One append operation for [`Wallet::safe_update`].
pub enum WalletUpdate {
    AddKeyData {
        hash160: Hash160,
        entry: AddressEntry,
    },
    AddAddrComment {
        hash160: Hash160,
        comment: Vec<u8>,
    },
    AddTxComment {
        txid: [u8; 32],
        comment: Vec<u8>,
    },
}

pub struct Wallet {
    path: PathBuf,
    header: Option<WalletHeader>,
    /// Derived symmetric key once the wallet is unlocked; wiped on drop.
    pub kdf_key: Option<SecureBytes>,
    /// Tail of the computed chain, for `compute_next_address`.
    last_computed: Option<AddressEntry>,
}

impl Wallet {
    /// Bind to an existing wallet file. No I/O happens until
    /// [`do_consistency_check`](Wallet::do_consistency_check) /
    /// [`read_all`](Wallet::read_all).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: None,
            kdf_key: None,
            last_computed: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cheap sanity pass before reading: the path must name a regular,
    /// readable, non-empty file. Returns the file size.
    pub fn do_consistency_check(&self) -> Result<u64, WalletError> {
        let meta = fs::metadata(&self.path).map_err(WalletError::io)?;
        if !meta.is_file() {
            return Err(WalletError::Io(format!(
                "{} is not a regular file",
                self.path.display()
            )));
        }
        if meta.len() == 0 {
            return Err(WalletError::NotAWallet("empty file".into()));
        }
        Ok(meta.len())
    }

    pub fn read_all(&self) -> Result<Vec<u8>, WalletError> {
        fs::read(&self.path).map_err(WalletError::io)
    }

    /// Parse the header out of `reader`, leaving it positioned at the first
    /// body record.
    pub fn unpack_header(&mut self, reader: &mut BinaryReader) -> Result<(), WalletError> {
        let header = WalletHeader::deserialize(reader)?;
        debug!(id = %header.unique_id_b58(), network = %header.network, "parsed wallet header");
        self.header = Some(header);
        Ok(())
    }

    pub fn header(&self) -> Option<&WalletHeader> {
        self.header.as_ref()
    }

    pub fn watching_only(&self) -> bool {
        self.header.as_ref().is_some_and(|h| h.watching_only)
    }

    /// Encrypted and not yet unlocked.
    pub fn is_locked(&self) -> bool {
        self.header.as_ref().is_some_and(|h| h.use_encryption) && self.kdf_key.is_none()
    }

    pub fn kdf(&self) -> Option<&KdfParams> {
        self.header.as_ref().and_then(|h| h.kdf.as_ref())
    }

    pub fn verify_encryption_key(&self, key: &SecureBytes) -> bool {
        self.header
            .as_ref()
            .is_some_and(|h| h.verify_encryption_key(key))
    }

    pub fn unique_id_b58(&self) -> String {
        self.header
            .as_ref()
            .map(|h| h.unique_id_b58())
            .unwrap_or_default()
    }

    pub fn label_name(&self) -> &str {
        self.header.as_ref().map(|h| h.label_name.as_str()).unwrap_or("")
    }

    pub fn label_descr(&self) -> &str {
        self.header.as_ref().map(|h| h.label_descr.as_str()).unwrap_or("")
    }

    /// Create a wallet file holding a root key and chaincode, ready for
    /// chain extension. The file consists of the header plus the root's own
    /// KEYDATA record as the first body entry.
    pub fn create_new(params: NewWalletParams) -> Result<Self, WalletError> {
        let root_pub = match (&params.root_priv, params.root_pub) {
            (Some(priv_key), _) => salvage_core::crypto::compute_public_key(priv_key.as_slice())?,
            (None, Some(pubkey)) => pubkey,
            (None, None) => {
                return Err(WalletError::KeyData(
                    "root key material required to create a wallet".into(),
                ))
            }
        };
        let root_hash = hashes::hash160(&root_pub);
        let watching_only = params.root_priv.is_none();

        let mut root = match &params.root_priv {
            Some(priv_key) => AddressEntry::from_private_key(0, priv_key, params.chaincode)?,
            None => AddressEntry::from_public_key(0, root_pub, params.chaincode),
        };

        let mut kdf = None;
        let mut kdf_key = None;
        let mut key_check = [0u8; 4];
        let mut use_encryption = false;
        if let Some(pass) = &params.passphrase {
            if !watching_only {
                let params_kdf = params.kdf.clone().unwrap_or_else(KdfParams::generate);
                let key = params_kdf.derive_key(pass)?;
                key_check = crypter::key_check(&key);

                let iv = crypter::random_iv();
                root.priv_encrypted = crypter::encrypt(&key, &iv, &root.priv_plain)?;
                root.iv = Some(iv);
                root.flags.use_encryption = true;

                kdf = Some(params_kdf);
                kdf_key = Some(key);
                use_encryption = true;
            }
        }

        let mut unique_id = [0u8; 6];
        unique_id[0] = params.network.id_byte();
        unique_id[1..].copy_from_slice(&root_hash.as_bytes()[..5]);

        let header = WalletHeader {
            version: FORMAT_VERSION,
            network: params.network,
            use_encryption,
            watching_only,
            unique_id,
            create_time: unix_now(),
            label_name: params.label_name,
            label_descr: params.label_descr,
            highest_used: 0,
            kdf,
            key_check,
            root_hash,
            root: root.clone(),
        };

        let mut bytes = header.serialize();
        bytes.extend_from_slice(&keydata_record(&root));
        fs::write(&params.path, &bytes).map_err(WalletError::io)?;
        debug!(path = %params.path.display(), watch_only = watching_only, "created wallet");

        Ok(Self {
            path: params.path,
            header: Some(header),
            kdf_key,
            last_computed: Some(root),
        })
    }

    /// Index of the chain tail, when one has been computed or seeded.
    pub fn last_computed_index(&self) -> Option<i64> {
        self.last_computed.as_ref().map(|e| e.chain_index)
    }

    /// Extend the deterministic chain by one entry and append its record.
    pub fn compute_next_address(&mut self) -> Result<Hash160, WalletError> {
        let prev = self
            .last_computed
            .as_ref()
            .ok_or_else(|| WalletError::KeyData("no chain tail to extend".into()))?;
        let child = prev.derive_child(self.kdf_key.as_ref())?;
        self.append(&keydata_record(&child))?;
        let hash = child.hash160;
        if let Some(header) = self.header.as_mut() {
            header.highest_used = child.chain_index;
        }
        self.last_computed = Some(child);
        Ok(hash)
    }

    /// Append a batch of records. The batch is written with a single
    /// syscall and flushed before returning.
    pub fn safe_update(&mut self, ops: Vec<WalletUpdate>) -> Result<(), WalletError> {
        let mut bytes = Vec::new();
        for op in &ops {
            match op {
                WalletUpdate::AddKeyData { hash160, entry } => {
                    bytes.push(EntryType::KeyData.tag());
                    bytes.extend_from_slice(hash160.as_bytes());
                    bytes.extend_from_slice(&entry.serialize());
                }
                WalletUpdate::AddAddrComment { hash160, comment } => {
                    bytes.push(EntryType::AddrComment.tag());
                    bytes.extend_from_slice(hash160.as_bytes());
                    bytes.extend_from_slice(&(comment.len() as u16).to_le_bytes());
                    bytes.extend_from_slice(comment);
                }
                WalletUpdate::AddTxComment { txid, comment } => {
                    bytes.push(EntryType::TxComment.tag());
                    bytes.extend_from_slice(txid);
                    bytes.extend_from_slice(&(comment.len() as u16).to_le_bytes());
                    bytes.extend_from_slice(comment);
                }
            }
        }
        self.append(&bytes)
    }

    /// Convenience for building wallets: append an imported private key
    /// (`chain_index = -1`), encrypted when the wallet is.
    pub fn import_private_key(&mut self, priv_key: &SecureBytes) -> Result<Hash160, WalletError> {
        let mut entry = AddressEntry::from_private_key(-1, priv_key, ChainCode::ZERO)?;
        if let Some(key) = self.kdf_key.clone() {
            entry.lock(&key)?;
        }
        let hash = entry.hash160;
        self.safe_update(vec![WalletUpdate::AddKeyData { hash160: hash, entry }])?;
        Ok(hash)
    }

    fn append(&self, bytes: &[u8]) -> Result<(), WalletError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(WalletError::io)?;
        file.write_all(bytes).map_err(WalletError::io)?;
        file.flush().map_err(WalletError::io)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("path", &self.path)
            .field("unlocked", &self.kdf_key.is_some())
            .field("header", &self.header.is_some())
            .finish()
    }
}

fn keydata_record(entry: &AddressEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 20 + ENTRY_SIZE);
    out.push(EntryType::KeyData.tag());
    out.extend_from_slice(entry.hash160.as_bytes());
    out.extend_from_slice(&entry.serialize());
    out
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Read one record off the stream: `(type, key, body)`.
///
/// KEYDATA bodies come back as raw bytes; strict entry parsing is the
/// caller's move so damaged entries can be routed to the tolerant decoder.
/// OPEVAL records consume only their tag and surface as
/// [`WalletError::NotImplemented`].
pub fn unpack_next_entry(
    reader: &mut BinaryReader,
) -> Result<(EntryType, Vec<u8>, Vec<u8>), WalletError> {
    let tag = reader.get_u8()?;
    let dtype = EntryType::from_tag(tag).ok_or(WalletError::UnknownEntryType(tag))?;
    let (key, body) = match dtype {
        EntryType::KeyData => (
            reader.get_bytes(20)?.to_vec(),
            reader.get_bytes(ENTRY_SIZE)?.to_vec(),
        ),
        EntryType::AddrComment => {
            let key = reader.get_bytes(20)?.to_vec();
            let len = reader.get_u16_le()? as usize;
            (key, reader.get_bytes(len)?.to_vec())
        }
        EntryType::TxComment => {
            let key = reader.get_bytes(32)?.to_vec();
            let len = reader.get_u16_le()? as usize;
            (key, reader.get_bytes(len)?.to_vec())
        }
        EntryType::OpEval => return Err(WalletError::NotImplemented),
        EntryType::Deleted => {
            let len = reader.get_u16_le()? as usize;
            (Vec::new(), reader.get_bytes(len)?.to_vec())
        }
    };
    Ok((dtype, key, body))
}
