//! Deterministic chain validator.
//!
//! Walks the surviving chained entries in chain-index order and reconciles
//! every one against the deterministic-wallet invariant: byte-exact
//! re-serialization, curve-point validity, shared chaincode, arrival order,
//! gap detection, the public-key chain from the nearest surviving ancestor,
//! public/private pairing (when unlockable) and hash160 identity. Imported
//! entries get the unchained subset of the same checks. Every finding is a
//! diagnostic; none aborts the run.

use std::collections::BTreeMap;

use tracing::warn;

use salvage_core::{crypto, hashes, Hash160, SecureBytes};
use salvage_wallet::entry::AddressEntry;

use crate::diagnostics::{Diagnostic, DiagnosticLog, ImportedFault};
use crate::progress::{Cancelled, ProgressSink};

/// A chained entry as collected by the body scan.
#[derive(Clone, Debug)]
pub struct ChainedEntry {
    pub entry: AddressEntry,
    /// The record key the entry was filed under.
    pub declared_hash: Hash160,
    /// Arrival order among chained entries in the file.
    pub arrival: usize,
    /// Absolute file offset of the record.
    pub offset: usize,
    /// Raw payload bytes as read.
    pub raw: Vec<u8>,
}

/// An imported entry as collected by the body scan.
#[derive(Clone, Debug)]
pub struct ImportedEntry {
    pub entry: AddressEntry,
    pub declared_hash: Hash160,
    pub offset: usize,
    pub raw: Vec<u8>,
}

pub struct ValidationContext<'a> {
    pub watch_only: bool,
    /// Source-wallet key for unlocking existing entries.
    pub kdf_key: Option<&'a SecureBytes>,
    /// Destination-wallet key imported entries are re-locked under; falls
    /// back to the source key when absent.
    pub relock_key: Option<&'a SecureBytes>,
    /// Header root public key, reconciled against the chain base.
    pub root_pub: Option<[u8; 65]>,
}

/// Validate the chained map in index order. Entries are fixed up in place
/// (canonical re-parse, recomputed public keys) so the surviving material
/// can seed the destination wallet afterwards.
pub fn validate_chained(
    chained: &mut BTreeMap<i64, ChainedEntry>,
    diagnostics: &mut DiagnosticLog,
    ctx: &ValidationContext<'_>,
    sink: &dyn ProgressSink,
) -> Result<(), Cancelled> {
    let indices: Vec<i64> = chained.keys().copied().collect();
    let total = indices.len();
    let Some(&base_index) = indices.first() else {
        return Ok(());
    };

    let base = &chained[&base_index];
    let base_chaincode = base.entry.chaincode;
    let mut prev_arrival = base.arrival as i64;

    if base_index == 0 {
        if let (Some(root_pub), Some(own_pub)) = (ctx.root_pub, base.entry.pub_key) {
            if root_pub != own_pub {
                diagnostics.push(Diagnostic::Misc {
                    detail: format!(
                        "chain base at file offset {} does not match the header root key",
                        base.offset
                    ),
                });
            }
        }
    }

    for (pos, &index) in indices.iter().enumerate() {
        if !sink.update(&format!("Processing address entries: {}/{}", pos + 1, total)) {
            return Err(Cancelled);
        }

        let offset = chained[&index].offset;

        // Byte-exact re-serialization; on mismatch keep the canonical form.
        {
            let chained_entry = chained.get_mut(&index).expect("index from keys");
            let fixed = chained_entry.entry.serialize();
            if fixed != chained_entry.raw {
                diagnostics.push(Diagnostic::ByteError {
                    chain_index: index,
                    offset,
                });
                if let Ok(reparsed) = AddressEntry::deserialize(&fixed) {
                    chained_entry.entry = reparsed;
                }
            }
        }

        match chained[&index].entry.pub_key {
            Some(pubkey) => {
                if !crypto::verify_public_key(&pubkey) {
                    diagnostics.push(Diagnostic::InvalidPubKey {
                        chain_index: index,
                        offset,
                    });
                }
            }
            None => diagnostics.push(Diagnostic::MissingPubKey {
                chain_index: index,
                offset,
            }),
        }

        if chained[&index].entry.chaincode != base_chaincode {
            diagnostics.push(Diagnostic::ChaincodeCorruption {
                chain_index: index,
                offset,
            });
        }

        let arrival = chained[&index].arrival as i64;
        if pos > 0 {
            if arrival - prev_arrival != 1 {
                diagnostics.push(Diagnostic::BrokenSequence {
                    chain_index: index,
                    offset,
                });
            }

            let prev_index = indices[pos - 1];
            let gap = index - prev_index;
            if gap > 1 {
                diagnostics.push(Diagnostic::SequenceGap {
                    from: prev_index,
                    to: index,
                });
            }

            // Public-key chain from the nearest surviving ancestor.
            if let (Some(own_pub), Some(prev_pub)) = (
                chained[&index].entry.pub_key,
                chained[&prev_index].entry.pub_key,
            ) {
                let prev_chaincode = chained[&prev_index].entry.chaincode;
                let mut extended = Some(prev_pub);
                for _ in 0..gap {
                    extended = match extended {
                        Some(p) => crypto::compute_chained_public_key(&p, &prev_chaincode).ok(),
                        None => None,
                    };
                }
                if extended != Some(own_pub) {
                    diagnostics.push(Diagnostic::BrokenPublicKeyChain {
                        chain_index: index,
                        offset,
                    });
                }
            }
        }
        prev_arrival = arrival;

        if !ctx.watch_only {
            let prev_index = (pos > 0).then(|| indices[pos - 1]);
            reconcile_private_key(chained, index, prev_index, offset, diagnostics, ctx);
        }

        // Hash identity of whatever public key the entry ended up with.
        let chained_entry = &chained[&index];
        if let Some(computed) = chained_entry.entry.compute_hash160() {
            if computed != chained_entry.declared_hash {
                diagnostics.push(Diagnostic::HashMismatch {
                    chain_index: index,
                    offset,
                });
            }
        }

        // Entries unlocked here go back to rest state.
        if let Some(key) = ctx.kdf_key {
            let chained_entry = chained.get_mut(&index).expect("index from keys");
            if chained_entry.entry.flags.use_encryption && !chained_entry.entry.priv_plain.is_empty()
            {
                let _ = chained_entry.entry.lock(key);
            }
        }
    }
    Ok(())
}

/// Steps 7 of the per-entry walk: seed deferred derivations, unlock, check
/// the public/private pairing and recompute missing public keys.
fn reconcile_private_key(
    chained: &mut BTreeMap<i64, ChainedEntry>,
    index: i64,
    prev_index: Option<i64>,
    offset: usize,
    diagnostics: &mut DiagnosticLog,
    ctx: &ValidationContext<'_>,
) {
    // Seed create-priv-on-next-unlock entries from the nearest surviving
    // ancestor's IV and ciphertext.
    if chained[&index].entry.flags.create_priv_on_next_unlock {
        if let Some(prev_index) = prev_index {
            let (prev_iv, prev_encrypted) = {
                let prev = &chained[&prev_index].entry;
                (prev.iv, prev.priv_encrypted.clone())
            };
            let chained_entry = chained.get_mut(&index).expect("index from keys");
            chained_entry.entry.unlock_iv = prev_iv;
            chained_entry.entry.unlock_priv = prev_encrypted;
            chained_entry.entry.unlock_depth = index - prev_index;
        }
    } else if !chained[&index].entry.has_priv_key() && !chained[&index].entry.flags.use_encryption {
        diagnostics.push(Diagnostic::Misc {
            detail: format!("uncomputed private key in unencrypted wallet at chainIndex {index}"),
        });
        return;
    }

    let chained_entry = chained.get_mut(&index).expect("index from keys");
    if chained_entry.entry.is_locked {
        let Some(key) = ctx.kdf_key else {
            return;
        };
        if !chained_entry.entry.has_priv_key() {
            warn!(chain_index = index, "no private key material to unlock");
            return;
        }
        if chained_entry.entry.unlock(key).is_err() {
            // Unlock failure means the decrypted key cannot reproduce the
            // public key: a pairing mismatch, not a fatal condition.
            diagnostics.push(Diagnostic::UnmatchedPair {
                chain_index: index,
                offset,
            });
            return;
        }
    }

    let entry = &mut chained_entry.entry;
    if entry.priv_plain.is_empty() {
        return;
    }

    match entry.pub_key {
        Some(pubkey) => {
            if !crypto::check_pub_priv_match(entry.priv_plain.as_slice(), &pubkey) {
                diagnostics.push(Diagnostic::UnmatchedPair {
                    chain_index: index,
                    offset,
                });
            }
        }
        None => {
            // Private key survived without its public half: recompute both
            // the key and the hash it should be filed under.
            if let Ok(recomputed) = crypto::compute_public_key(entry.priv_plain.as_slice()) {
                entry.pub_key = Some(recomputed);
                entry.hash160 = hashes::hash160(&recomputed);
                entry.flags.has_pub = true;
            }
        }
    }
}

/// Validate imported entries: same checks minus any chaining assumption.
pub fn validate_imported(
    imported: &mut [ImportedEntry],
    diagnostics: &mut DiagnosticLog,
    ctx: &ValidationContext<'_>,
    sink: &dyn ProgressSink,
) -> Result<(), Cancelled> {
    let total = imported.len();
    for (index, item) in imported.iter_mut().enumerate() {
        if !sink.update(&format!(
            "Processing imported address entries: {}/{}",
            index + 1,
            total
        )) {
            return Err(Cancelled);
        }
        let offset = item.offset;

        let fixed = item.entry.serialize();
        if fixed != item.raw {
            diagnostics.push(Diagnostic::Imported {
                index,
                offset,
                fault: ImportedFault::ByteError,
            });
            if let Ok(reparsed) = AddressEntry::deserialize(&fixed) {
                item.entry = reparsed;
            }
        }

        match item.entry.pub_key {
            Some(pubkey) => {
                if !crypto::verify_public_key(&pubkey) {
                    diagnostics.push(Diagnostic::Imported {
                        index,
                        offset,
                        fault: ImportedFault::InvalidPubKey,
                    });
                }
            }
            None => diagnostics.push(Diagnostic::Imported {
                index,
                offset,
                fault: ImportedFault::MissingPubKey,
            }),
        }

        if !item.entry.has_priv_key() {
            diagnostics.push(Diagnostic::Imported {
                index,
                offset,
                fault: ImportedFault::MissingPrivKey,
            });
            continue;
        }

        let mut pair_ok = true;
        if item.entry.is_locked {
            match ctx.kdf_key {
                Some(key) => {
                    if item.entry.unlock(key).is_err() {
                        pair_ok = false;
                        diagnostics.push(Diagnostic::Imported {
                            index,
                            offset,
                            fault: ImportedFault::UnmatchedPair,
                        });
                    }
                }
                None => continue,
            }
        }

        if pair_ok && !item.entry.priv_plain.is_empty() {
            if let Some(pubkey) = item.entry.pub_key {
                if !crypto::check_pub_priv_match(item.entry.priv_plain.as_slice(), &pubkey) {
                    pair_ok = false;
                    diagnostics.push(Diagnostic::Imported {
                        index,
                        offset,
                        fault: ImportedFault::UnmatchedPair,
                    });
                }
            }
        }

        if !pair_ok && !item.entry.priv_plain.is_empty() {
            // The private key is the trusted half; recompute its public key.
            if let Ok(recomputed) = crypto::compute_public_key(item.entry.priv_plain.as_slice()) {
                item.entry.pub_key = Some(recomputed);
                item.entry.flags.has_pub = true;
            }
        }

        if let Some(computed) = item.entry.compute_hash160() {
            if computed != item.declared_hash {
                item.entry.hash160 = computed;
                diagnostics.push(Diagnostic::Imported {
                    index,
                    offset,
                    fault: ImportedFault::HashMismatch,
                });
            }
        }

        // Re-lock under the destination key so recovered ciphertext is
        // consistent with the wallet it will be written into.
        if item.entry.flags.use_encryption && !item.entry.priv_plain.is_empty() {
            if let Some(key) = ctx.relock_key.or(ctx.kdf_key) {
                let _ = item.entry.lock(key);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use salvage_core::ChainCode;

    fn chaincode() -> ChainCode {
        ChainCode::from_bytes([0x73; 32])
    }

    fn chain_of(n: usize) -> BTreeMap<i64, ChainedEntry> {
        let mut entries = BTreeMap::new();
        let mut entry =
            AddressEntry::from_private_key(0, &SecureBytes::from_slice(&[0x1f; 32]), chaincode())
                .unwrap();
        for arrival in 0..n {
            let raw = entry.serialize();
            entries.insert(
                entry.chain_index,
                ChainedEntry {
                    declared_hash: entry.hash160,
                    arrival,
                    offset: 912 + arrival * 258,
                    raw,
                    entry: entry.clone(),
                },
            );
            entry = entry.derive_child(None).unwrap();
        }
        entries
    }

    fn ctx<'a>(root_pub: Option<[u8; 65]>) -> ValidationContext<'a> {
        ValidationContext {
            watch_only: false,
            kdf_key: None,
            relock_key: None,
            root_pub,
        }
    }

    #[test]
    fn clean_chain_yields_no_diagnostics() {
        let mut chained = chain_of(8);
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();
        assert!(diagnostics.is_empty(), "got {:?}", diagnostics);
    }

    #[test]
    fn gap_is_reported_once_and_chain_still_closes() {
        let mut chained = chain_of(8);
        chained.remove(&4);
        // Re-number arrivals as the scanner would have seen them.
        for (arrival, entry) in chained.values_mut().enumerate() {
            entry.arrival = arrival;
        }
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();

        assert_eq!(diagnostics.sequence_gaps(), vec![(3, 5)]);
        assert!(diagnostics.broken_public_key_chain().is_empty());
        assert!(diagnostics.broken_sequence().is_empty());
    }

    #[test]
    fn out_of_order_arrival_is_broken_sequence() {
        let mut chained = chain_of(4);
        let arrival_of_1 = chained[&1].arrival;
        let arrival_of_2 = chained[&2].arrival;
        chained.get_mut(&1).unwrap().arrival = arrival_of_2;
        chained.get_mut(&2).unwrap().arrival = arrival_of_1;
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();
        assert!(!diagnostics.broken_sequence().is_empty());
        // The chain itself is intact regardless of file order.
        assert!(diagnostics.broken_public_key_chain().is_empty());
    }

    #[test]
    fn zeroed_chaincode_breaks_child_not_self() {
        let mut chained = chain_of(6);
        chained.get_mut(&3).unwrap().entry.chaincode = ChainCode::ZERO;
        // Scanner stores what it read; keep raw in sync so only the
        // chaincode finding fires, not a byte error.
        let fixed = chained[&3].entry.serialize();
        chained.get_mut(&3).unwrap().raw = fixed;
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();

        assert_eq!(diagnostics.chaincode_corruption(), vec![(3, 912 + 3 * 258)]);
        // Entry 3's own pub was derived with the true chaincode of entry 2;
        // entry 4 is the one whose chain step now fails.
        assert_eq!(
            diagnostics.broken_public_key_chain(),
            vec![(4, 912 + 4 * 258)]
        );
    }

    #[test]
    fn byte_error_replaces_entry_with_canonical_form() {
        let mut chained = chain_of(3);
        chained.get_mut(&1).unwrap().raw[100] ^= 0x01;
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();
        assert_eq!(diagnostics.byte_errors().len(), 1);
        assert_eq!(diagnostics.byte_errors()[0].0, 1);
    }

    #[test]
    fn missing_pub_is_recomputed_from_priv() {
        let mut chained = chain_of(3);
        {
            let damaged = chained.get_mut(&2).unwrap();
            let expected_pub = damaged.entry.pub_key.unwrap();
            damaged.entry.pub_key = None;
            damaged.entry.flags.has_pub = false;
            damaged.raw = damaged.entry.serialize();
            damaged.declared_hash = hashes::hash160(&expected_pub);
        }
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();

        assert_eq!(diagnostics.missing_pub_keys().len(), 1);
        assert!(diagnostics.hash_mismatches().is_empty());
        assert!(chained[&2].entry.pub_key.is_some());
    }

    #[test]
    fn forged_key_is_unmatched_pair() {
        let mut chained = chain_of(3);
        {
            let forged = chained.get_mut(&2).unwrap();
            forged.entry.priv_plain = SecureBytes::from_slice(&[0x2f; 32]);
            forged.raw = forged.entry.serialize();
        }
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        validate_chained(&mut chained, &mut diagnostics, &ctx(root_pub), &NullSink).unwrap();
        assert_eq!(diagnostics.unmatched_pairs(), vec![(2, 912 + 2 * 258)]);
    }

    #[test]
    fn watch_only_skips_pair_checks() {
        let mut chained = chain_of(3);
        {
            let forged = chained.get_mut(&2).unwrap();
            forged.entry.priv_plain = SecureBytes::from_slice(&[0x2f; 32]);
            forged.raw = forged.entry.serialize();
        }
        let root_pub = chained[&0].entry.pub_key;
        let mut diagnostics = DiagnosticLog::new();
        let context = ValidationContext {
            watch_only: true,
            ..ctx(root_pub)
        };
        validate_chained(&mut chained, &mut diagnostics, &context, &NullSink).unwrap();
        assert!(diagnostics.unmatched_pairs().is_empty());
    }

    #[test]
    fn imported_missing_priv_is_recorded_not_fatal() {
        let pubkey = crypto::compute_public_key(&[0x3d; 32]).unwrap();
        let entry = AddressEntry::from_public_key(-1, pubkey, ChainCode::ZERO);
        let raw = entry.serialize();
        let mut imported = vec![ImportedEntry {
            declared_hash: entry.hash160,
            offset: 5000,
            raw,
            entry,
        }];
        let mut diagnostics = DiagnosticLog::new();
        validate_imported(&mut imported, &mut diagnostics, &ctx(None), &NullSink).unwrap();
        assert_eq!(
            diagnostics.imported_faults(),
            vec![(0, 5000, ImportedFault::MissingPrivKey)]
        );
    }

    #[test]
    fn imported_hash_mismatch_is_corrected() {
        let entry =
            AddressEntry::from_private_key(-1, &SecureBytes::from_slice(&[0x3e; 32]), ChainCode::ZERO)
                .unwrap();
        let true_hash = entry.hash160;
        let raw = entry.serialize();
        let mut imported = vec![ImportedEntry {
            declared_hash: Hash160::from_bytes([0xee; 20]),
            offset: 6000,
            raw,
            entry,
        }];
        let mut diagnostics = DiagnosticLog::new();
        validate_imported(&mut imported, &mut diagnostics, &ctx(None), &NullSink).unwrap();
        assert_eq!(
            diagnostics.imported_faults(),
            vec![(0, 6000, ImportedFault::HashMismatch)]
        );
        assert_eq!(imported[0].entry.hash160, true_hash);
    }

    #[test]
    fn cancellation_stops_validation() {
        struct CancelImmediately;
        impl ProgressSink for CancelImmediately {
            fn update(&self, _: &str) -> bool {
                false
            }
            fn request_passphrase(&self) -> Option<SecureBytes> {
                None
            }
        }
        let mut chained = chain_of(3);
        let mut diagnostics = DiagnosticLog::new();
        let result = validate_chained(
            &mut chained,
            &mut diagnostics,
            &ctx(None),
            &CancelImmediately,
        );
        assert_eq!(result, Err(Cancelled));
    }
}
