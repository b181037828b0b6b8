//! # salvage-recover — fail-safe wallet recovery engine.
//!
//! Given a possibly damaged Armory-format wallet and an optional
//! passphrase, parse the record stream, diagnose corruption, repair or
//! reconstruct what the checksums and the deterministic-chain invariant
//! allow, and emit a clean wallet plus a human-readable audit log.
//!
//! # Modules
//!
//! - [`decode`] — tolerant address-entry decoder with per-field repair
//! - [`resync`] — forward search for the next plausible record
//! - [`validate`] — deterministic chain validator
//! - [`recover`] — the orchestrator and its five modes
//! - [`diagnostics`] — structured findings
//! - [`log`] — audit-log rendering
//! - [`progress`] — progress/cancellation/passphrase capability
//! - [`meta`] — Meta-mode comment map
//! - [`error`] — fatal codes and decode errors

pub mod decode;
pub mod diagnostics;
pub mod error;
pub mod log;
pub mod meta;
pub mod progress;
pub mod recover;
pub mod resync;
pub mod validate;

pub use decode::decode_address_with_recovery;
pub use diagnostics::{Diagnostic, DiagnosticLog, ImportedFault};
pub use error::{DecodeError, FatalError, RecoveryFailure};
pub use meta::{CommentMap, CommentRecord};
pub use progress::{ChannelSink, NullSink, ProgressChannel, ProgressEvent, ProgressSink};
pub use recover::{
    recover_wallet, spawn_recovery, RecoveryMode, RecoveryOptions, RecoveryOutput,
};
pub use resync::look_for_further_entry;
