//! Recovery orchestrator.
//!
//! Drives one recovery run: open and header-parse the source wallet,
//! unlock it if needed, create the destination wallet, walk the body with
//! resynchronization over damaged regions, validate the chain and the
//! imported entries, populate the destination, and leave an audit log.
//!
//! Header-stage failures abort with a numeric code; body-stage damage is
//! recorded and skipped, never fatal. Secrets are destroyed on every exit
//! path, cancellation and errors included.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, warn};

use salvage_core::reader::BinaryReader;
use salvage_core::{Hash160, SecureBytes};
use salvage_wallet::entry::AddressEntry;
use salvage_wallet::wallet::unpack_next_entry;
use salvage_wallet::{
    EntryType, KdfParams, Network, NewWalletParams, Wallet, WalletError, WalletUpdate,
};

use crate::decode::{decode_address_with_recovery, describe_mask};
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::error::{FatalError, RecoveryFailure};
use crate::log::{self, LogReport};
use crate::meta::{CommentMap, CommentRecord};
use crate::progress::{ChannelSink, ProgressChannel, ProgressSink};
use crate::resync::look_for_further_entry;
use crate::validate::{
    validate_chained, validate_imported, ChainedEntry, ImportedEntry, ValidationContext,
};

/// Forward keypool restored past the highest recovered chain index.
const KEYPOOL_LOOKAHEAD: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Root key and chaincode only; the body is never read.
    Stripped,
    /// Full parse and validation; recovered wallet holds the chained keys.
    Bare,
    /// Bare plus imported keys and comments.
    Full,
    /// Extract labels and comments; no wallet, no log on success.
    Meta,
    /// Validate and log only; encrypted wallets need not be unlocked.
    Check,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown recovery mode: {0}")]
pub struct ParseModeError(String);

impl FromStr for RecoveryMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripped" | "1" => Ok(RecoveryMode::Stripped),
            "bare" | "2" => Ok(RecoveryMode::Bare),
            "full" | "3" => Ok(RecoveryMode::Full),
            "meta" | "4" => Ok(RecoveryMode::Meta),
            "check" | "5" => Ok(RecoveryMode::Check),
            other => Err(ParseModeError(other.to_owned())),
        }
    }
}

impl RecoveryMode {
    pub fn writes_wallet(self) -> bool {
        matches!(
            self,
            RecoveryMode::Stripped | RecoveryMode::Bare | RecoveryMode::Full
        )
    }

    /// Name used in the audit log.
    pub fn log_name(self) -> &'static str {
        match self {
            RecoveryMode::Stripped => "stripped",
            RecoveryMode::Bare => "bare",
            RecoveryMode::Full => "full",
            RecoveryMode::Meta => "meta",
            RecoveryMode::Check => "consistency check",
        }
    }
}

pub struct RecoveryOptions {
    pub wallet_path: PathBuf,
    pub passphrase: Option<SecureBytes>,
    pub mode: RecoveryMode,
    /// Network this engine expects; a wallet for any other is refused.
    pub network: Network,
    /// KDF parameters for the destination wallet; generated when absent.
    pub dest_kdf: Option<KdfParams>,
}

impl RecoveryOptions {
    pub fn new(wallet_path: impl Into<PathBuf>, mode: RecoveryMode) -> Self {
        Self {
            wallet_path: wallet_path.into(),
            passphrase: None,
            mode,
            network: Network::Mainnet,
            dest_kdf: None,
        }
    }
}

#[derive(Debug)]
pub enum RecoveryOutput {
    Recovered {
        /// Absent in Check mode, which writes no wallet.
        wallet_path: Option<PathBuf>,
        log_path: PathBuf,
    },
    Comments(CommentMap),
    /// Cooperative cancellation; any partial output has been deleted.
    Cancelled,
}

/// Run one recovery. This is the public entry point of the engine.
pub fn recover_wallet(
    options: RecoveryOptions,
    sink: &dyn ProgressSink,
) -> Result<RecoveryOutput, RecoveryFailure> {
    let source_path = options.wallet_path.clone();
    let mut engine = Engine::new(options, sink);
    let result = engine.process();

    let log_path = engine
        .new_wallet_path
        .clone()
        .map(|p| log_path_for(&p))
        .unwrap_or_else(|| log_path_for(&source_path));

    match result {
        Ok(EngineEnd::Comments(map)) => Ok(RecoveryOutput::Comments(map)),
        Ok(EngineEnd::Done) => {
            engine.write_log(&log_path, None);
            Ok(RecoveryOutput::Recovered {
                wallet_path: engine.new_wallet_path.clone(),
                log_path,
            })
        }
        Ok(EngineEnd::Cancelled) => {
            if let Some(partial) = &engine.new_wallet_path {
                if fs::remove_file(partial).is_err() {
                    warn!(path = %partial.display(), "could not delete partial output");
                }
            }
            Ok(RecoveryOutput::Cancelled)
        }
        Err(fatal) => {
            let wrote = engine.write_log(&log_path, Some(fatal));
            Err(RecoveryFailure {
                error: fatal,
                log_path: wrote.then_some(log_path),
            })
        }
    }
}

/// Run the engine on a worker thread wired to a [`ProgressChannel`]. The
/// worker blocks until the UI side calls
/// [`mark_ready`](ProgressChannel::mark_ready) and signals
/// [`finish`](ProgressChannel::finish) when done.
pub fn spawn_recovery(
    options: RecoveryOptions,
    channel: Arc<ProgressChannel>,
) -> JoinHandle<Result<RecoveryOutput, RecoveryFailure>> {
    std::thread::spawn(move || {
        channel.wait_ready();
        let sink = ChannelSink::new(channel.clone());
        let result = recover_wallet(options, &sink);
        channel.finish();
        result
    })
}

enum EngineEnd {
    Done,
    Comments(CommentMap),
    Cancelled,
}

struct Engine<'a> {
    opts: RecoveryOptions,
    sink: &'a dyn ProgressSink,
    diagnostics: DiagnosticLog,
    watch_only: bool,
    use_encryption: bool,
    file_size: u64,
    last_offset: usize,
    naddress: usize,
    nimports: usize,
    ncomments: usize,
    new_wallet_path: Option<PathBuf>,
    stripped_done: bool,
}

impl<'a> Engine<'a> {
    fn new(opts: RecoveryOptions, sink: &'a dyn ProgressSink) -> Self {
        Self {
            opts,
            sink,
            diagnostics: DiagnosticLog::new(),
            watch_only: false,
            use_encryption: false,
            file_size: 0,
            last_offset: 0,
            naddress: 0,
            nimports: 0,
            ncomments: 0,
            new_wallet_path: None,
            stripped_done: false,
        }
    }

    fn process(&mut self) -> Result<EngineEnd, FatalError> {
        let mode = self.opts.mode;
        let wallet_path = self.opts.wallet_path.clone();

        let name = wallet_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.sink.update(&format!("Recovering wallet: {name}")) {
            return Ok(EngineEnd::Cancelled);
        }

        if !wallet_path.exists() {
            return Err(FatalError::NotAWallet);
        }

        let mut source = Wallet::open(&wallet_path);
        self.file_size = source.do_consistency_check().map_err(|e| match e {
            WalletError::Io(_) => FatalError::Io,
            _ => FatalError::NotAWallet,
        })?;

        let data = source.read_all().map_err(|_| FatalError::Io)?;
        let mut reader = BinaryReader::new(&data);

        source
            .unpack_header(&mut reader)
            .map_err(|_| FatalError::NotAWallet)?;
        let header = source.header().expect("header just parsed").clone();
        if header.network != self.opts.network {
            return Err(FatalError::WrongNetwork);
        }

        self.watch_only = source.watching_only() || mode == RecoveryMode::Meta;
        self.use_encryption = header.use_encryption;

        // Unlock sub-state machine.
        let mut passphrase = self.opts.passphrase.take();
        let mut root = header.root.clone();

        if !self.watch_only && source.is_locked() && passphrase.is_none() {
            match self.sink.request_passphrase() {
                Some(supplied) => passphrase = Some(supplied),
                None => {
                    if mode == RecoveryMode::Check {
                        // Run purely on public material for the rest.
                        self.watch_only = true;
                    } else {
                        return Err(FatalError::BadPassphrase);
                    }
                }
            }
        }

        if !self.watch_only && source.is_locked() {
            let pass = passphrase.as_ref().ok_or(FatalError::BadPassphrase)?;
            let kdf = source.kdf().cloned().ok_or(FatalError::NoKdfParams)?;
            let mut key = kdf.derive_key(pass).map_err(|_| FatalError::BadPassphrase)?;
            if !source.verify_encryption_key(&key) {
                key.destroy();
                return Err(FatalError::BadPassphrase);
            }
            source.kdf_key = Some(key);
            root.unlock(source.kdf_key.as_ref().expect("key just stored"))
                .map_err(|_| FatalError::RootUnlockFailed)?;
        }

        let mut destination = if mode.writes_wallet() {
            let dir = wallet_path.parent().unwrap_or_else(|| Path::new("."));
            let new_path = dir.join(format!(
                "armory_{}_RECOVERED.wallet",
                source.unique_id_b58()
            ));
            if new_path.exists() {
                fs::remove_file(&new_path).map_err(|_| FatalError::Io)?;
            }
            let dest = Wallet::create_new(NewWalletParams {
                path: new_path.clone(),
                network: header.network,
                // The destination is encrypted iff the source was; a
                // passphrase supplied for a plaintext wallet is not used.
                passphrase: if self.watch_only || !header.use_encryption {
                    None
                } else {
                    passphrase.clone()
                },
                root_priv: if self.watch_only || root.priv_plain.is_empty() {
                    None
                } else {
                    Some(root.priv_plain.clone())
                },
                root_pub: root.pub_key,
                chaincode: root.chaincode,
                label_name: header.label_name.clone(),
                label_descr: header.label_descr.clone(),
                kdf: self.opts.dest_kdf.clone(),
            })
            .map_err(|_| FatalError::Io)?;
            self.new_wallet_path = Some(new_path);
            Some(dest)
        } else {
            None
        };

        // Both wallets hold their own derived key now.
        if let Some(mut pass) = passphrase.take() {
            pass.destroy();
        }

        if mode == RecoveryMode::Stripped {
            self.stripped_done = true;
            destroy_keys(&mut source, destination.as_mut());
            return Ok(EngineEnd::Done);
        }

        // Body scan with resynchronization.
        let mut chained: BTreeMap<i64, ChainedEntry> = BTreeMap::new();
        let mut imported: Vec<ImportedEntry> = Vec::new();
        let mut comments: Vec<CommentRecord> = Vec::new();

        while reader.remaining() > 0 {
            let offset = reader.position();
            if !self.sink.update(&format!(
                "Parsing file: {}/{} kB",
                offset / 1024,
                self.file_size / 1024
            )) {
                destroy_keys(&mut source, destination.as_mut());
                return Ok(EngineEnd::Cancelled);
            }

            match unpack_next_entry(&mut reader) {
                Ok((dtype, key, body)) => {
                    self.collect(
                        dtype, key, body, offset, None, &mut chained, &mut imported,
                        &mut comments,
                    );
                }
                Err(WalletError::NotImplemented) => {
                    self.diagnostics.push(Diagnostic::Misc {
                        detail: format!("Found OPEVAL data entry at offset: {offset}"),
                    });
                }
                Err(err) => {
                    debug!(offset, %err, "record decode failed, resynchronizing");
                    self.diagnostics.push(Diagnostic::RawError {
                        offset,
                        detail: format!("Raw binary error found at offset: {offset}"),
                    });
                    match look_for_further_entry(&mut reader, offset) {
                        None => {
                            self.diagnostics.push(Diagnostic::RawError {
                                offset,
                                detail: format!(
                                    "Could not find any more valid data past offset: {offset}"
                                ),
                            });
                            break;
                        }
                        Some(find) => {
                            self.diagnostics.push(Diagnostic::RawError {
                                offset: find.offset,
                                detail: format!(
                                    "Found a valid data entry at offset: {}",
                                    find.offset
                                ),
                            });
                            self.collect(
                                find.dtype,
                                find.key,
                                find.body,
                                find.offset,
                                find.recovered,
                                &mut chained,
                                &mut imported,
                                &mut comments,
                            );
                        }
                    }
                }
            }
        }
        self.last_offset = reader.position();

        if mode == RecoveryMode::Meta {
            return Ok(EngineEnd::Comments(CommentMap {
                short_label: header.label_name.clone(),
                long_label: header.label_descr.clone(),
                naddress: self.naddress,
                ncomments: self.ncomments,
                comments,
            }));
        }

        // Chain and import validation.
        let relock_key = destination.as_ref().and_then(|d| d.kdf_key.clone());
        let ctx = ValidationContext {
            watch_only: self.watch_only,
            kdf_key: source.kdf_key.as_ref(),
            relock_key: relock_key.as_ref(),
            root_pub: header.root.pub_key,
        };
        if validate_chained(&mut chained, &mut self.diagnostics, &ctx, self.sink).is_err()
            || validate_imported(&mut imported, &mut self.diagnostics, &ctx, self.sink).is_err()
        {
            destroy_keys(&mut source, destination.as_mut());
            return Ok(EngineEnd::Cancelled);
        }

        // Populate the destination wallet.
        let mut populate_cancelled = false;
        if let Some(dest) = destination.as_mut() {
            populate_cancelled = !self.populate(dest, &chained, &imported, &comments)?;
        }
        destroy_keys(&mut source, destination.as_mut());
        if populate_cancelled {
            return Ok(EngineEnd::Cancelled);
        }
        Ok(EngineEnd::Done)
    }

    /// Write the recovered material into the destination: rebuild the
    /// deterministic chain (plus a forward keypool), then, in Full mode,
    /// the imported entries and comments. Returns `false` on cancellation.
    fn populate(
        &mut self,
        dest: &mut Wallet,
        chained: &BTreeMap<i64, ChainedEntry>,
        imported: &[ImportedEntry],
        comments: &[CommentRecord],
    ) -> Result<bool, FatalError> {
        let top = chained.keys().next_back().copied().unwrap_or(0);
        let target = top + KEYPOOL_LOOKAHEAD;
        let mut current = dest.last_computed_index().unwrap_or(0);
        while current < target {
            if !self
                .sink
                .update(&format!("Building address chain: {}/{target}", current + 1))
            {
                return Ok(false);
            }
            dest.compute_next_address().map_err(|_| FatalError::Io)?;
            current += 1;
        }

        if self.opts.mode != RecoveryMode::Full {
            return Ok(true);
        }

        let total = imported.len();
        for (index, item) in imported.iter().enumerate() {
            if !self
                .sink
                .update(&format!("Saving imported addresses: {}/{total}", index + 1))
            {
                return Ok(false);
            }
            dest.safe_update(vec![WalletUpdate::AddKeyData {
                hash160: item.entry.hash160,
                entry: item.entry.clone(),
            }])
            .map_err(|_| FatalError::Io)?;
        }

        let total = comments.len();
        for (index, comment) in comments.iter().enumerate() {
            if !self
                .sink
                .update(&format!("Saving comment entries: {}/{total}", index + 1))
            {
                return Ok(false);
            }
            let op = match comment.dtype {
                EntryType::AddrComment => WalletUpdate::AddAddrComment {
                    hash160: Hash160::from_slice(&comment.key).unwrap_or(Hash160::ZERO),
                    comment: comment.text.clone(),
                },
                EntryType::TxComment => WalletUpdate::AddTxComment {
                    txid: comment.key.as_slice().try_into().unwrap_or([0u8; 32]),
                    comment: comment.text.clone(),
                },
                _ => continue,
            };
            dest.safe_update(vec![op]).map_err(|_| FatalError::Io)?;
        }
        Ok(true)
    }

    /// Route one collected record into the chained map, the imported list
    /// or the comment list, running the tolerant decoder when the strict
    /// one refuses a KEYDATA payload.
    #[allow(clippy::too_many_arguments)]
    fn collect(
        &mut self,
        dtype: EntryType,
        key: Vec<u8>,
        body: Vec<u8>,
        offset: usize,
        recovered: Option<(AddressEntry, u8)>,
        chained: &mut BTreeMap<i64, ChainedEntry>,
        imported: &mut Vec<ImportedEntry>,
        comments: &mut Vec<CommentRecord>,
    ) {
        match dtype {
            EntryType::KeyData => {
                if self.opts.mode == RecoveryMode::Meta {
                    self.naddress += 1;
                    return;
                }
                let decoded = match recovered {
                    Some((entry, mask)) => {
                        if mask != 0 {
                            self.note_mask(offset, mask);
                        }
                        Some(entry)
                    }
                    None => match AddressEntry::deserialize(&body) {
                        Ok(entry) => Some(entry),
                        Err(_) => {
                            self.diagnostics.push(Diagnostic::RawError {
                                offset,
                                detail: format!(
                                    "Found checksum errors in address entry starting at offset: {offset}"
                                ),
                            });
                            match decode_address_with_recovery(&body) {
                                Ok((entry, mask)) => {
                                    self.diagnostics.push(Diagnostic::RawError {
                                        offset,
                                        detail: "Recovered damaged entry".into(),
                                    });
                                    if mask != 0 {
                                        self.note_mask(offset, mask);
                                    }
                                    Some(entry)
                                }
                                Err(_) => {
                                    self.diagnostics.push(Diagnostic::RawError {
                                        offset,
                                        detail: "Could not recover damaged entry".into(),
                                    });
                                    None
                                }
                            }
                        }
                    },
                };
                let Some(entry) = decoded else {
                    return;
                };
                let declared_hash = Hash160::from_slice(&key).unwrap_or(Hash160::ZERO);
                if entry.chain_index >= 0 {
                    chained.insert(
                        entry.chain_index,
                        ChainedEntry {
                            declared_hash,
                            arrival: self.naddress,
                            offset,
                            raw: body,
                            entry,
                        },
                    );
                    self.naddress += 1;
                } else {
                    imported.push(ImportedEntry {
                        declared_hash,
                        offset,
                        raw: body,
                        entry,
                    });
                    self.nimports += 1;
                }
            }
            EntryType::AddrComment | EntryType::TxComment => {
                if matches!(self.opts.mode, RecoveryMode::Full | RecoveryMode::Meta) {
                    comments.push(CommentRecord {
                        dtype,
                        key,
                        text: body,
                    });
                    self.ncomments += 1;
                }
            }
            EntryType::OpEval => {
                self.diagnostics.push(Diagnostic::Misc {
                    detail: format!("Found OPEVAL data entry at offset: {offset}"),
                });
            }
            EntryType::Deleted => {}
        }
    }

    fn note_mask(&mut self, offset: usize, mask: u8) {
        self.diagnostics.push(Diagnostic::RawError {
            offset,
            detail: format!(
                "Encountered checksum errors in address entry members: {}",
                describe_mask(mask).join(", ")
            ),
        });
    }

    /// Render and append the audit log; true when the write succeeded.
    fn write_log(&self, path: &Path, error: Option<FatalError>) -> bool {
        let report = LogReport {
            log_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mode_name: self.opts.mode.log_name(),
            timestamp: chrono::Local::now().format("%c").to_string(),
            error,
            watch_only: self.watch_only,
            use_encryption: self.use_encryption,
            stripped: self.stripped_done,
            file_size: self.file_size,
            last_offset: self.last_offset,
            naddress: self.naddress,
            nimports: self.nimports,
            ncomments: self.ncomments,
            diagnostics: &self.diagnostics,
        };
        match log::append_to_file(path, &log::render(&report)) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %path.display(), %err, "could not write recovery log");
                false
            }
        }
    }
}

/// Wipe both wallets' derived keys now; `Drop` would get them eventually,
/// this keeps the destruction point explicit on every exit path.
fn destroy_keys(source: &mut Wallet, destination: Option<&mut Wallet>) {
    if let Some(key) = source.kdf_key.as_mut() {
        key.destroy();
    }
    if let Some(dest) = destination {
        if let Some(key) = dest.kdf_key.as_mut() {
            key.destroy();
        }
    }
}

fn log_path_for(wallet: &Path) -> PathBuf {
    let mut name = wallet.as_os_str().to_owned();
    name.push(".log");
    PathBuf::from(name)
}
