//! Root of the `logbook-core` library.
//!
//! Coordinates the checkpoint lifecycle on top of the ledger store:
//! `check` prepares a draft under a lock, `commit` validates it, appends it
//! to the ledger and commits, `clean` abandons an operation.

// Library code never prints; the CLI owns all user-visible output.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod draft;
pub mod error;
pub mod lifecycle;
pub mod sentinel;

pub use config::{ConfigError, LogbookConfig};
pub use error::{ErrorCategory, LifecycleError};
pub use lifecycle::{
    CheckOutcome, CleanOutcome, CommitOptions, CommitOutcome, DraftReport, LedgerSummary,
    Lifecycle, LifecycleState, StatusReport,
};
pub use sentinel::{LockMetadata, Presence, Sentinels};

/// Version written into lock files and new ledger headers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
