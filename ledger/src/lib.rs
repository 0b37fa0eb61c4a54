//! Checkpoint ledger.
//!
//! A ledger is a single YAML multi-document file: one identity header
//! followed by checkpoint records in append order. This crate owns the
//! document codec, the on-disk store and record validation.
//!
//! ## Invariants
//!
//! - The header is always the first document and is never rewritten.
//! - Records are only ever appended; the single exception is backfilling
//!   the commit id of the last record once its commit exists.
//! - Every write that replaces the file goes through temp-file + fsync +
//!   rename, guarded by a size/mtime check before and after.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod codec;
pub mod schema;
pub mod store;
pub mod validate;

pub use codec::CodecError;
pub use schema::{
    Change, ChangeType, CheckpointRecord, FileChange, IdentityHeader, NextStep, Priority,
    SCHEMA_VERSION,
};
pub use store::{InitOutcome, LedgerContents, LedgerError, LedgerStore};
pub use validate::{FieldError, LintKind, LintWarning, ValidationErrors, lint, validate};
