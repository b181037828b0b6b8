//! Audit-log builder.
//!
//! Renders the diagnostic collections into the human-readable report that
//! is appended to `<output_wallet>.log` (or `<input_wallet>.log` when no
//! output was produced). A fatal error renders a single `ERROR:` line and
//! suppresses the per-kind sections. Output is deterministic apart from the
//! timestamp line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::diagnostics::DiagnosticLog;
use crate::error::FatalError;

/// Everything the renderer needs about a finished (or failed) run.
pub struct LogReport<'a> {
    /// Basename of the log file itself.
    pub log_name: String,
    /// One of `stripped`, `bare`, `full`, `meta`, `consistency check`.
    pub mode_name: &'static str,
    pub timestamp: String,
    pub error: Option<FatalError>,
    pub watch_only: bool,
    pub use_encryption: bool,
    /// Stripped mode stops after the header; sections are skipped.
    pub stripped: bool,
    pub file_size: u64,
    pub last_offset: usize,
    pub naddress: usize,
    pub nimports: usize,
    pub ncomments: usize,
    pub diagnostics: &'a DiagnosticLog,
}

pub fn render(report: &LogReport<'_>) -> String {
    let mut out = String::new();
    let diag = report.diagnostics;

    out.push_str(&format!(
        "Recovering wallet {} on {}\n",
        report.log_name, report.timestamp
    ));
    out.push_str(&format!("Using {} recovery mode\n", report.mode_name));

    if let Some(error) = report.error {
        out.push_str(&format!("   ERROR: {error}\n"));
        out.push_str(&format!(
            "Recovery failed: error code {}\n\n\n",
            error.code()
        ));
        return out;
    }

    if report.watch_only {
        out.push_str("Wallet is Watch Only\n");
    } else if report.use_encryption {
        out.push_str("Wallet contains private keys and uses encryption\n");
    } else {
        out.push_str("Wallet contains private keys and doesn't use encryption\n");
    }

    if report.stripped {
        out.push_str("   Recovered root key and chaincode, stripped recovery done.\n");
        out.push_str("Recovery done\n\n\n");
        return out;
    }

    out.push_str(&format!(
        "The wallet file is {} bytes, of which {} bytes were readable\n",
        report.file_size, report.last_offset
    ));
    out.push_str(&format!(
        "{} chain addresses, {} imported keys and {} comments were found\n",
        report.naddress, report.nimports, report.ncomments
    ));

    out.push_str(&format!(
        "Found {} chained address entries\n",
        report.naddress
    ));

    let byte_errors = diag.byte_errors();
    if byte_errors.is_empty() {
        out.push_str("No byte errors were found in the wallet file\n");
    } else {
        out.push_str(&format!(
            "{} byte errors were found in the wallet file:\n",
            byte_errors.len()
        ));
        for (index, offset) in &byte_errors {
            out.push_str(&format!("   chainIndex {index} at file offset {offset}\n"));
        }
    }

    let broken_sequence = diag.broken_sequence();
    if broken_sequence.is_empty() {
        out.push_str("All chained addresses were arranged sequentially in the wallet file\n");
    } else {
        out.push_str(&format!(
            "The following {} addresses were not arranged sequentially in the wallet file:\n",
            broken_sequence.len()
        ));
        for (index, offset) in &broken_sequence {
            out.push_str(&format!("   chainIndex {index} at file offset {offset}\n"));
        }
    }

    let gaps = diag.sequence_gaps();
    if gaps.is_empty() {
        out.push_str("There are no gaps in the address chain\n");
    } else {
        out.push_str(&format!("Found {} gaps in the address chain:\n", gaps.len()));
        for (from, to) in &gaps {
            out.push_str(&format!("   from chainIndex {from} to {to}\n"));
        }
    }

    let broken_chain = diag.broken_public_key_chain();
    if broken_chain.is_empty() {
        out.push_str("No invalid chained public address was found\n");
    } else {
        out.push_str(&format!(
            "Found {} invalid chained public addresses:\n",
            broken_chain.len()
        ));
        for (index, offset) in &broken_chain {
            out.push_str(&format!("   at chainIndex {index}, file offset {offset}\n"));
        }
    }

    let chaincode = diag.chaincode_corruption();
    if chaincode.is_empty() {
        out.push_str("No chaincode corruption was found\n");
    } else {
        out.push_str(&format!(
            "Found {} instances of chaincode corruption:\n",
            chaincode.len()
        ));
        for (index, offset) in &chaincode {
            out.push_str(&format!("   at chainIndex {index}, file offset {offset}\n"));
        }
    }

    let invalid_pub = diag.invalid_pub_keys();
    if invalid_pub.is_empty() {
        out.push_str("All chained public keys are valid EC points\n");
    } else {
        out.push_str(&format!(
            "{} chained public keys are invalid EC points:\n",
            invalid_pub.len()
        ));
        for (index, offset) in &invalid_pub {
            out.push_str(&format!("   at chainIndex {index}, file offset {offset}\n"));
        }
    }

    let missing_pub = diag.missing_pub_keys();
    if missing_pub.is_empty() {
        out.push_str("No chained public key is missing\n");
    } else {
        out.push_str(&format!(
            "{} chained public keys are missing:\n",
            missing_pub.len()
        ));
        for (index, offset) in &missing_pub {
            out.push_str(&format!("   at chainIndex {index}, file offset {offset}\n"));
        }
    }

    let hash_mismatches = diag.hash_mismatches();
    if hash_mismatches.is_empty() {
        out.push_str("All entries were saved under their matching hashVal\n");
    } else {
        out.push_str(&format!(
            "{} address entries were saved under an erroneous hashVal:\n",
            hash_mismatches.len()
        ));
        for (index, offset) in &hash_mismatches {
            out.push_str(&format!("   at chainIndex {index}, file offset {offset}\n"));
        }
    }

    if !report.watch_only {
        let unmatched = diag.unmatched_pairs();
        if unmatched.is_empty() {
            out.push_str("All chained public keys match their respective private keys\n");
        } else {
            out.push_str(&format!(
                "{} public keys do not match their respective private key:\n",
                unmatched.len()
            ));
            for (index, offset) in &unmatched {
                out.push_str(&format!("   at chainIndex {index}, file offset {offset}\n"));
            }
        }
    }

    let misc = diag.misc();
    if !misc.is_empty() {
        out.push_str(&format!("{} miscellaneous errors were found:\n", misc.len()));
        for detail in &misc {
            out.push_str(&format!("   {detail}\n"));
        }
    }

    out.push_str(&format!(
        "Found {} imported address entries\n",
        report.nimports
    ));
    if report.nimports > 0 {
        let faults = diag.imported_faults();
        if faults.is_empty() {
            out.push_str("No errors were found within the imported address entries\n");
        } else {
            out.push_str(&format!(
                "{} errors were found within the imported address entries:\n",
                faults.len()
            ));
            for (index, offset, fault) in &faults {
                out.push_str(&format!("   {}\n", fault.describe(*index, *offset)));
            }
        }
    }

    let raw_errors = diag.raw_errors();
    if !raw_errors.is_empty() {
        out.push_str(&format!(
            "{} raw binary errors were encountered:\n",
            raw_errors.len()
        ));
        for (_, detail) in &raw_errors {
            out.push_str(&format!("   {detail}\n"));
        }
    }

    out.push_str("Recovery done\n\n\n");
    out
}

/// Append the rendered report to the log file, creating it if needed.
pub fn append_to_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(content.as_bytes())?;
    file.flush()
}
