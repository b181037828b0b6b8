//! Structured findings of the scanner and validator.
//!
//! Diagnostics are collected in one append-only ordered sequence keyed by
//! `(chain_index, offset)` or `(imported_index, offset)`. None of them is
//! fatal; the per-kind accessors are filtered views the log builder renders
//! in collection order.

/// One finding. Offsets are absolute file positions of the record involved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Re-serialization of the decoded entry differed from the raw record.
    ByteError { chain_index: i64, offset: usize },
    /// Chained entries did not arrive in chain order.
    BrokenSequence { chain_index: i64, offset: usize },
    /// Missing chain indices between two surviving entries.
    SequenceGap { from: i64, to: i64 },
    /// Applying the chain step from the nearest surviving ancestor did not
    /// reproduce this entry's public key.
    BrokenPublicKeyChain { chain_index: i64, offset: usize },
    /// Chaincode differs from the chain base's.
    ChaincodeCorruption { chain_index: i64, offset: usize },
    /// Public key is not a valid curve point.
    InvalidPubKey { chain_index: i64, offset: usize },
    MissingPubKey { chain_index: i64, offset: usize },
    /// hash160 of the public key differs from the declared record key.
    HashMismatch { chain_index: i64, offset: usize },
    /// Private key does not produce the public key (or failed to unlock).
    UnmatchedPair { chain_index: i64, offset: usize },
    /// A finding on an imported (unchained) entry.
    Imported {
        index: usize,
        offset: usize,
        fault: ImportedFault,
    },
    /// Raw-binary trail of the resynchronizer and tolerant decoder.
    RawError { offset: usize, detail: String },
    Misc { detail: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportedFault {
    ByteError,
    InvalidPubKey,
    MissingPubKey,
    MissingPrivKey,
    UnmatchedPair,
    HashMismatch,
}

impl ImportedFault {
    pub fn describe(&self, index: usize, offset: usize) -> String {
        match self {
            ImportedFault::ByteError => {
                format!("found byte error in imported address {index} at file offset {offset}")
            }
            ImportedFault::InvalidPubKey => {
                format!("invalid pub key for imported address {index} at file offset {offset}")
            }
            ImportedFault::MissingPubKey => {
                format!("missing pub key for imported address {index} at file offset {offset}")
            }
            ImportedFault::MissingPrivKey => {
                format!("missing private key for imported address {index} at file offset {offset}")
            }
            ImportedFault::UnmatchedPair => format!(
                "pub key doesnt match private key for imported address {index} at file offset {offset}"
            ),
            ImportedFault::HashMismatch => format!(
                "hashVal doesnt match addrStr20 for imported address {index} at file offset {offset}"
            ),
        }
    }
}

/// Append-only, ordered collection of findings.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticLog {
    items: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn byte_errors(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::ByteError { chain_index, offset } => Some((*chain_index, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn broken_sequence(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::BrokenSequence { chain_index, offset } => {
                    Some((*chain_index, *offset))
                }
                _ => None,
            })
            .collect()
    }

    pub fn sequence_gaps(&self) -> Vec<(i64, i64)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SequenceGap { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn broken_public_key_chain(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::BrokenPublicKeyChain { chain_index, offset } => {
                    Some((*chain_index, *offset))
                }
                _ => None,
            })
            .collect()
    }

    pub fn chaincode_corruption(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::ChaincodeCorruption { chain_index, offset } => {
                    Some((*chain_index, *offset))
                }
                _ => None,
            })
            .collect()
    }

    pub fn invalid_pub_keys(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::InvalidPubKey { chain_index, offset } => Some((*chain_index, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn missing_pub_keys(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::MissingPubKey { chain_index, offset } => Some((*chain_index, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn hash_mismatches(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::HashMismatch { chain_index, offset } => Some((*chain_index, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn unmatched_pairs(&self) -> Vec<(i64, usize)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::UnmatchedPair { chain_index, offset } => Some((*chain_index, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn imported_faults(&self) -> Vec<(usize, usize, ImportedFault)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::Imported {
                    index,
                    offset,
                    fault,
                } => Some((*index, *offset, *fault)),
                _ => None,
            })
            .collect()
    }

    pub fn raw_errors(&self) -> Vec<(usize, &str)> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::RawError { offset, detail } => Some((*offset, detail.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn misc(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Diagnostic::Misc { detail } => Some(detail.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_filter_by_variant_in_order() {
        let mut log = DiagnosticLog::new();
        log.push(Diagnostic::SequenceGap { from: 6, to: 8 });
        log.push(Diagnostic::ByteError {
            chain_index: 2,
            offset: 100,
        });
        log.push(Diagnostic::SequenceGap { from: 10, to: 13 });
        log.push(Diagnostic::Imported {
            index: 0,
            offset: 400,
            fault: ImportedFault::MissingPrivKey,
        });

        assert_eq!(log.sequence_gaps(), vec![(6, 8), (10, 13)]);
        assert_eq!(log.byte_errors(), vec![(2, 100)]);
        assert_eq!(log.imported_faults().len(), 1);
        assert_eq!(log.len(), 4);
        assert!(log.unmatched_pairs().is_empty());
    }

    #[test]
    fn imported_fault_wording() {
        let line = ImportedFault::UnmatchedPair.describe(3, 912);
        assert!(line.contains("imported address 3"));
        assert!(line.contains("offset 912"));
    }
}
